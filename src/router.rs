// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-client correlation tables and the routing decisions built on top of
//! them. This is the asymmetric fan-out/at-most-one-reply core of the proxy.

use std::collections::{HashMap, HashSet};

use crate::message::{parse, MessageType, OcppMessage};

/// What to do with a frame the client just sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRouteDecision {
    /// Send to every currently-connected upstream.
    Broadcast,
    /// Send to exactly one upstream, by name.
    Direct(String),
    /// Do not forward; caller should log a warning.
    Drop,
}

/// The correlation engine for one Session. Lives and dies with the Session.
#[derive(Debug, Default)]
pub struct Router {
    /// IDs the client has sent as CALLs whose replies haven't been forwarded
    /// yet. Retained for the life of the session (see DESIGN.md) so late or
    /// duplicate secondary replies keep getting filtered out.
    client_calls: HashSet<String>,
    /// message_id -> upstream name, for CALLs an upstream addressed to the
    /// client. Removed on the first matching client reply.
    server_calls: HashMap<String, String>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a raw frame. Parse failures are the caller's concern to log.
    pub fn parse(&self, raw: &str) -> Option<OcppMessage> {
        parse(raw)
    }

    /// Record that the client has an in-flight CALL with this id.
    pub fn register_client_call(&mut self, id: &str) {
        self.client_calls.insert(id.to_owned());
    }

    /// An upstream sent a CALL to the client: remember who to route the
    /// client's reply back to. Colliding ids across upstreams overwrite the
    /// earlier entry (see spec Open Questions / DESIGN.md).
    pub fn observe_from_upstream(&mut self, msg: &OcppMessage, upstream_name: &str) {
        if msg.msg_type == MessageType::Call {
            self.server_calls.insert(msg.id.clone(), upstream_name.to_owned());
        }
    }

    /// Routing decision for a frame arriving from the client.
    pub fn route_from_client(&mut self, msg: &OcppMessage) -> ClientRouteDecision {
        match msg.msg_type {
            MessageType::Call => {
                self.register_client_call(&msg.id);
                ClientRouteDecision::Broadcast
            }
            MessageType::CallResult | MessageType::CallError => match self.server_calls.remove(&msg.id) {
                Some(name) => ClientRouteDecision::Direct(name),
                None => {
                    tracing::warn!(id = %msg.id, "client reply to unknown upstream CALL, dropping");
                    ClientRouteDecision::Drop
                }
            },
        }
    }

    /// Should a CALLRESULT/CALLERROR received on `from_name` be forwarded to
    /// the client? `primary_name` is the name of the upstream at ordinal
    /// position 0 of the session, not a name-based concept.
    pub fn should_forward_upstream_reply(&self, id: &str, from_name: &str, primary_name: &str) -> bool {
        if !self.client_calls.contains(id) {
            // Not a client-initiated exchange the proxy is fanning out; pass through.
            return true;
        }
        from_name == primary_name
    }

    /// True iff `id` is still awaiting its (single) forwarded reply.
    pub fn is_pending_client_call(&self, id: &str) -> bool {
        self.client_calls.contains(id)
    }

    /// True iff an upstream CALL with this id is still awaiting the client's
    /// reply.
    pub fn is_pending_server_call(&self, id: &str) -> bool {
        self.server_calls.contains_key(id)
    }

    /// Empty both tables. Called once, at session teardown.
    pub fn clear(&mut self) {
        self.client_calls.clear();
        self.server_calls.clear();
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
