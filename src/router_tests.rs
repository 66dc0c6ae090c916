// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::message::parse as parse_msg;

fn call(id: &str) -> OcppMessage {
    parse_msg(&format!(r#"[2,"{id}","Heartbeat",{{}}]"#)).expect("parse")
}

fn call_result(id: &str) -> OcppMessage {
    parse_msg(&format!(r#"[3,"{id}",{{}}]"#)).expect("parse")
}

#[test]
fn client_call_broadcasts_and_registers() {
    let mut router = Router::new();
    let msg = call("m1");
    let decision = router.route_from_client(&msg);
    assert_eq!(decision, ClientRouteDecision::Broadcast);
    assert!(router.is_pending_client_call("m1"));
}

#[test]
fn client_reply_to_known_server_call_is_direct_and_one_shot() {
    let mut router = Router::new();
    let server_call = call("s9");
    router.observe_from_upstream(&server_call, "SEC");
    assert!(router.is_pending_server_call("s9"));

    let reply = call_result("s9");
    let decision = router.route_from_client(&reply);
    assert_eq!(decision, ClientRouteDecision::Direct("SEC".to_owned()));
    assert!(!router.is_pending_server_call("s9"), "entry must be removed after first match");
}

#[test]
fn client_reply_to_unknown_id_is_dropped() {
    let mut router = Router::new();
    let reply = call_result("ghost");
    assert_eq!(router.route_from_client(&reply), ClientRouteDecision::Drop);
}

#[test]
fn colliding_server_call_ids_overwrite_earlier_entry() {
    let mut router = Router::new();
    router.observe_from_upstream(&call("dup"), "PRI");
    router.observe_from_upstream(&call("dup"), "SEC");
    let reply = call_result("dup");
    assert_eq!(router.route_from_client(&reply), ClientRouteDecision::Direct("SEC".to_owned()));
}

#[test]
fn primary_reply_to_client_call_forwards_and_retains_id() {
    let mut router = Router::new();
    router.register_client_call("m1");
    assert!(router.should_forward_upstream_reply("m1", "PRI", "PRI"));
    // Retained so later secondary replies are still filtered.
    assert!(router.is_pending_client_call("m1"));
}

#[test]
fn secondary_reply_to_client_call_is_dropped() {
    let mut router = Router::new();
    router.register_client_call("m1");
    assert!(!router.should_forward_upstream_reply("m1", "SEC", "PRI"));
}

#[test]
fn reply_to_id_not_in_client_calls_is_forwarded() {
    let router = Router::new();
    // e.g. a reply to an upstream-initiated exchange unrelated to fan-out.
    assert!(router.should_forward_upstream_reply("s9", "SEC", "PRI"));
}

#[test]
fn clear_empties_both_tables() {
    let mut router = Router::new();
    router.register_client_call("m1");
    router.observe_from_upstream(&call("s9"), "SEC");
    router.clear();
    assert!(!router.is_pending_client_call("m1"));
    assert!(!router.is_pending_server_call("s9"));
}

#[test]
fn parse_delegates_to_message_parser() {
    let router = Router::new();
    assert!(router.parse(r#"[2,"m1","Heartbeat",{}]"#).is_some());
    assert!(router.parse("garbage").is_none());
}

#[test]
fn scenario_fan_out_primary_reply_wins() {
    let mut router = Router::new();
    // Client sends Heartbeat m1; both upstreams connected -> broadcast.
    let decision = router.route_from_client(&call("m1"));
    assert_eq!(decision, ClientRouteDecision::Broadcast);

    // PRI replies first.
    assert!(router.should_forward_upstream_reply("m1", "PRI", "PRI"));
    // SEC's reply to the same id must be dropped, and m1 stays pending.
    assert!(!router.should_forward_upstream_reply("m1", "SEC", "PRI"));
    assert!(router.is_pending_client_call("m1"));
}
