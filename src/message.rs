// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OCPP 1.6-J frame decoding.
//!
//! A frame is a JSON array `[type, id, ...]`. The parser only ever looks at
//! the first two positions, and never inspects `action` or payload fields;
//! those are the Notifier's business.

use serde_json::Value;

/// OCPP message type, the first element of the wire array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Request (array arity 4: `[2, id, action, payload]`).
    Call,
    /// Success reply (array arity 3: `[3, id, payload]`).
    CallResult,
    /// Failure reply (array arity 5: `[4, id, errorCode, errorDescription, errorDetails]`).
    CallError,
}

impl MessageType {
    fn from_i64(n: i64) -> Option<Self> {
        match n {
            2 => Some(Self::Call),
            3 => Some(Self::CallResult),
            4 => Some(Self::CallError),
            _ => None,
        }
    }
}

/// A decoded OCPP frame. The proxy routes `raw` verbatim and never rewrites it.
#[derive(Debug, Clone)]
pub struct OcppMessage {
    pub msg_type: MessageType,
    pub id: String,
    pub raw: String,
}

/// Decode one text frame. Returns `None` on any shape other than a JSON array
/// of length >= 2 whose first element is an integer in {2,3,4} and whose
/// second element is a string.
pub fn parse(raw: &str) -> Option<OcppMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let arr = value.as_array()?;
    if arr.len() < 2 {
        return None;
    }
    let msg_type = arr[0].as_i64().and_then(MessageType::from_i64)?;
    let id = arr[1].as_str()?.to_owned();
    Some(OcppMessage { msg_type, id, raw: raw.to_owned() })
}

/// Best-effort extraction of the `action` field (position 2) from a CALL frame.
/// Used only by the Notifier; returns `None` for anything that doesn't parse
/// as a 4-element CALL array with a string action.
pub fn call_action(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let arr = value.as_array()?;
    if arr.len() < 4 {
        return None;
    }
    arr[2].as_str().map(str::to_owned)
}

/// Best-effort extraction of the payload (position 3) from a CALL frame.
pub fn call_payload(raw: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let arr = value.as_array()?;
    arr.get(3).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call() {
        let msg = parse(r#"[2,"m1","Heartbeat",{}]"#).expect("should parse");
        assert_eq!(msg.msg_type, MessageType::Call);
        assert_eq!(msg.id, "m1");
    }

    #[test]
    fn parses_call_result() {
        let msg = parse(r#"[3,"m1",{"currentTime":"T"}]"#).expect("should parse");
        assert_eq!(msg.msg_type, MessageType::CallResult);
        assert_eq!(msg.id, "m1");
    }

    #[test]
    fn parses_call_error() {
        let msg = parse(r#"[4,"m1","InternalError","desc",{}]"#).expect("should parse");
        assert_eq!(msg.msg_type, MessageType::CallError);
    }

    #[test]
    fn rejects_non_json() {
        assert!(parse("not json").is_none());
    }

    #[test]
    fn rejects_non_array() {
        assert!(parse(r#"{"type":2}"#).is_none());
    }

    #[test]
    fn rejects_short_array() {
        assert!(parse(r#"[2]"#).is_none());
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(parse(r#"[9,"m1"]"#).is_none());
    }

    #[test]
    fn rejects_non_string_id() {
        assert!(parse(r#"[2,42,"Heartbeat",{}]"#).is_none());
    }

    #[test]
    fn rejects_non_integer_type() {
        assert!(parse(r#"["2","m1"]"#).is_none());
    }

    #[test]
    fn round_trips_type_and_id_for_accepted_shapes() {
        let cases = [
            (r#"[2,"a","Heartbeat",{}]"#, MessageType::Call, "a"),
            (r#"[3,"b",{}]"#, MessageType::CallResult, "b"),
            (r#"[4,"c","InternalError","d",{}]"#, MessageType::CallError, "c"),
        ];
        for (raw, expected_type, expected_id) in cases {
            let msg = parse(raw).expect("should parse");
            assert_eq!(msg.msg_type, expected_type);
            assert_eq!(msg.id, expected_id);
            assert_eq!(msg.raw, raw);
        }
    }

    #[test]
    fn extracts_call_action_and_payload() {
        let raw = r#"[2,"m1","StatusNotification",{"connectorId":1,"status":"Available"}]"#;
        assert_eq!(call_action(raw).as_deref(), Some("StatusNotification"));
        let payload = call_payload(raw).expect("payload");
        assert_eq!(payload["connectorId"], 1);
    }

    #[test]
    fn call_action_none_for_non_call() {
        assert_eq!(call_action(r#"[3,"m1",{}]"#), None);
    }
}
