// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Listener (§4.E): accepts client WebSocket upgrades, validates the
//! path, negotiates the subprotocol, enforces one live session per
//! client_id, and hands off to a Session.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use regex::Regex;
use tokio::sync::mpsc;

use crate::session::Session;
use crate::state::AppState;
use crate::upstream::UpstreamLink;

fn client_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Fixed literal, not user input; a failed compile here is a build-time bug.
        #[allow(clippy::expect_used)]
        Regex::new(r"^[A-Za-z0-9_-]+$").expect("client-id pattern is a fixed literal")
    })
}

/// `GET /{client_id}` — WebSocket upgrade for a charge point session.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    if !client_id_pattern().is_match(&client_id) {
        tracing::warn!(client_id = %client_id, "rejecting invalid path");
        return ws
            .on_upgrade(|socket| reject_with_close(socket, 1008, "Invalid path, expected /<clientId>"))
            .into_response();
    }

    let offered = offered_protocols(&headers);
    let protocol = match negotiate_protocol(&offered) {
        Some(p) => p,
        None => {
            tracing::warn!(client_id = %client_id, ?offered, "no acceptable subprotocol offered");
            return (StatusCode::BAD_REQUEST, "no acceptable subprotocol").into_response();
        }
    };

    let client_ip = client_ip(&headers, peer);
    let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).map(str::to_owned);
    let user_agent = headers.get("user-agent").and_then(|v| v.to_str().ok()).map(str::to_owned);

    let (events_tx, events_rx) = mpsc::channel(64);
    let mut upstreams = Vec::with_capacity(2);
    upstreams.push(UpstreamLink::new(
        "PRI".to_owned(),
        0,
        state.config.primary_url.clone(),
        protocol.clone(),
        client_id.clone(),
        client_ip.clone(),
        auth.clone(),
        user_agent.clone(),
        events_tx.clone(),
    ));
    if let Some(secondary_url) = state.config.secondary_url.clone() {
        upstreams.push(UpstreamLink::new(
            "SEC".to_owned(),
            1,
            secondary_url,
            protocol.clone(),
            client_id.clone(),
            client_ip,
            auth,
            user_agent,
            events_tx,
        ));
    }

    let handle = state.registry.new_handle(client_id.clone());
    if let Some(prior) = state.registry.insert(handle.clone()).await {
        tracing::info!(client_id = %client_id, "superseding existing session for this client_id");
        prior.supersede.cancel();
    }

    let registry = Arc::clone(&state.registry);
    let notifier = Arc::clone(&state.notifier);
    let session = Session::new(client_id, upstreams, events_rx, handle, registry, notifier);

    ws.protocols([protocol]).on_upgrade(move |socket| session.run(socket)).into_response()
}

/// Catch-all for any request that doesn't match `/{client_id}` at all — no
/// segments (`/`), more than one (`/a/b`), or anything else matchit's
/// single-segment route rejects outright. Applies the same upgrade-then-1008
/// rejection as `ws_handler`'s invalid-client-id branch so the path
/// round-trip table (§8) holds uniformly.
pub async fn fallback_handler(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(|socket| reject_with_close(socket, 1008, "Invalid path, expected /<clientId>")).into_response()
}

async fn reject_with_close(mut socket: axum::extract::ws::WebSocket, code: u16, reason: &str) {
    use axum::extract::ws::{CloseFrame, Message};
    use futures_util::SinkExt;
    let frame = CloseFrame { code, reason: reason.to_owned().into() };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

fn offered_protocols(headers: &HeaderMap) -> Vec<String> {
    headers
        .get("sec-websocket-protocol")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').map(|s| s.trim().to_owned()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

/// First offered subprotocol starting with `ocpp`; `ocpp1.6` if none were
/// offered; `None` if some were offered but none qualify (reject upgrade).
fn negotiate_protocol(offered: &[String]) -> Option<String> {
    if offered.is_empty() {
        return Some("ocpp1.6".to_owned());
    }
    offered.iter().find(|p| p.starts_with("ocpp")).cloned()
}

fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| peer.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_client_ids() {
        assert!(client_id_pattern().is_match("STATION01"));
        assert!(client_id_pattern().is_match("abc_1-2"));
    }

    #[test]
    fn rejects_invalid_client_ids() {
        assert!(!client_id_pattern().is_match(""));
        assert!(!client_id_pattern().is_match("a/b"));
        assert!(!client_id_pattern().is_match("a%20b"));
        assert!(!client_id_pattern().is_match(".."));
    }

    #[test]
    fn negotiates_default_when_nothing_offered() {
        assert_eq!(negotiate_protocol(&[]).as_deref(), Some("ocpp1.6"));
    }

    #[test]
    fn negotiates_first_ocpp_prefixed_offer() {
        let offered = vec!["mqtt".to_owned(), "ocpp2.0".to_owned(), "ocpp1.6".to_owned()];
        assert_eq!(negotiate_protocol(&offered).as_deref(), Some("ocpp2.0"));
    }

    #[test]
    fn rejects_when_none_of_the_offers_qualify() {
        let offered = vec!["mqtt".to_owned(), "soap".to_owned()];
        assert_eq!(negotiate_protocol(&offered), None);
    }

    #[test]
    fn client_ip_prefers_first_forwarded_for_element() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.5, 10.0.0.1".parse().expect("header value"));
        let peer: SocketAddr = "127.0.0.1:9000".parse().expect("addr");
        assert_eq!(client_ip(&headers, peer), "203.0.113.5");
    }

    #[test]
    fn client_ip_falls_back_to_peer_addr() {
        let headers = HeaderMap::new();
        let peer: SocketAddr = "198.51.100.7:9000".parse().expect("addr");
        assert_eq!(client_ip(&headers, peer), "198.51.100.7");
    }
}
