// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-client session: owns one client socket, its upstream links, a Router,
//! and a pre-connect buffer. One `Session::run` call is one `tokio::spawn`ed
//! task driven by a single `tokio::select!` loop — the per-session actor
//! the concurrency model calls for (§5).

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::notify::Notifier;
use crate::registry::{Registry, SessionHandle};
use crate::router::{ClientRouteDecision, Router};
use crate::upstream::{LinkEvent, UpstreamLink};

/// An unbounded buffer would let a stuck upstream grow session memory
/// without limit; the spec leaves this as an implementer's choice (§9). We
/// drop oldest-first past this many frames and log it.
const MAX_PRE_CONNECT_BUFFER: usize = 1024;

pub struct Session {
    client_id: String,
    upstreams: Vec<UpstreamLink>,
    events_rx: mpsc::Receiver<(usize, LinkEvent)>,
    router: Router,
    pre_connect_buffer: Vec<String>,
    buffer_drained: bool,
    handle: SessionHandle,
    registry: Arc<Registry>,
    notifier: Arc<dyn Notifier>,
}

impl Session {
    /// `upstreams` must have been constructed with `events_tx` clones of the
    /// sender half paired with `events_rx` here — the Listener wires this up
    /// so every link's events land on the one channel this Session drains.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client_id: String,
        upstreams: Vec<UpstreamLink>,
        events_rx: mpsc::Receiver<(usize, LinkEvent)>,
        handle: SessionHandle,
        registry: Arc<Registry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            client_id,
            upstreams,
            events_rx,
            router: Router::new(),
            pre_connect_buffer: Vec::new(),
            buffer_drained: false,
            handle,
            registry,
            notifier,
        }
    }

    fn primary_name(&self) -> Option<&str> {
        self.upstreams.first().map(|u| u.name.as_str())
    }

    fn link_by_name(&self, name: &str) -> Option<&UpstreamLink> {
        self.upstreams.iter().find(|u| u.name == name)
    }

    fn any_connected(&self) -> bool {
        self.upstreams.iter().any(|u| u.connected())
    }

    /// Quiescence rule (§4.D, invariant 7): buffer is drainable once every
    /// link is connected or has exhausted its reconnect budget.
    fn all_links_settled(&self) -> bool {
        self.upstreams.iter().all(|u| is_settled(u.connected(), u.exhausted()))
    }

    /// True once every link is both not-connected and has exhausted its
    /// reconnect budget — the session-survival check (§4.D). A link that is
    /// merely between reconnect attempts still has budget left and keeps the
    /// session alive; back-off (§4.B) exists precisely so a transient blip
    /// doesn't tear the session down.
    fn all_links_terminal(&self) -> bool {
        self.upstreams.iter().all(|u| is_terminal(u.connected(), u.exhausted()))
    }

    fn push_buffer(&mut self, raw: String) {
        if self.pre_connect_buffer.len() >= MAX_PRE_CONNECT_BUFFER {
            self.pre_connect_buffer.remove(0);
            tracing::warn!(client_id = %self.client_id, "pre-connect buffer full, dropping oldest frame");
        }
        self.pre_connect_buffer.push(raw);
    }

    /// Drive the session to completion. Consumes `self`; returns once the
    /// session has been fully torn down (client closed, all upstreams gone,
    /// or superseded).
    pub async fn run(mut self, client_socket: WebSocket) {
        self.notifier.connected_to_proxy(&self.client_id);

        let (mut client_write, mut client_read) = client_socket.split();

        for link in &self.upstreams {
            link.connect().await;
        }

        loop {
            tokio::select! {
                biased;

                _ = self.handle.supersede.cancelled() => {
                    tracing::info!(client_id = %self.client_id, "session superseded, tearing down");
                    close_client(&mut client_write, 1001, "Replaced by a new connection").await;
                    break;
                }

                incoming = client_read.next() => {
                    match incoming {
                        Some(Ok(WsMessage::Text(text))) => {
                            self.handle_client_frame(text.to_string(), &mut client_write).await;
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            tracing::debug!(client_id = %self.client_id, "client closed connection");
                            break;
                        }
                        Some(Ok(_)) => {
                            // Binary/ping/pong frames carry no OCPP semantics; ignore.
                        }
                        Some(Err(e)) => {
                            tracing::debug!(client_id = %self.client_id, err = %e, "client socket error");
                            break;
                        }
                    }
                }

                event = self.events_rx.recv() => {
                    let Some((position, event)) = event else {
                        // All links dropped their sender ends; treat as terminal.
                        break;
                    };
                    if self.handle_link_event(position, event, &mut client_write).await {
                        break;
                    }
                }
            }
        }

        self.teardown(&mut client_write).await;
    }

    async fn handle_client_frame(&mut self, raw: String, client_write: &mut ClientSink) {
        if !self.any_connected() {
            self.push_buffer(raw);
            return;
        }
        self.route_client_frame(raw, client_write).await;
    }

    /// Apply the normal client-frame routing path: parse, notify on CALLs,
    /// route, and forward to the selected upstream(s).
    async fn route_client_frame(&mut self, raw: String, client_write: &mut ClientSink) {
        let Some(msg) = self.router.parse(&raw) else {
            tracing::warn!(client_id = %self.client_id, "dropping unparseable client frame");
            return;
        };

        if msg.msg_type == crate::message::MessageType::Call {
            self.notifier.call_from_client(&self.client_id, &raw);
        }

        match self.router.route_from_client(&msg) {
            ClientRouteDecision::Broadcast => {
                for link in &self.upstreams {
                    if link.connected() {
                        link.send(&raw);
                    }
                }
            }
            ClientRouteDecision::Direct(name) => {
                if let Some(link) = self.link_by_name(&name) {
                    link.send(&raw);
                } else {
                    tracing::warn!(client_id = %self.client_id, name = %name, "routing target upstream no longer exists");
                }
            }
            ClientRouteDecision::Drop => {}
        }
        let _ = client_write; // reserved: client frames never trigger a client write directly
    }

    /// Returns `true` if the session should terminate after this event.
    async fn handle_link_event(&mut self, position: usize, event: LinkEvent, client_write: &mut ClientSink) -> bool {
        let Some(name) = self.upstreams.get(position).map(|u| u.name.clone()) else {
            return false;
        };

        match event {
            LinkEvent::Connected => {
                self.notifier.connected_to_upstream(&self.client_id, &name);
                self.drain_pre_connect_buffer(position, client_write).await;
                false
            }
            LinkEvent::Disconnected => {
                self.notifier.disconnected_from_upstream(&self.client_id, &name);
                self.maybe_close_on_terminal(client_write).await
            }
            LinkEvent::GaveUp => {
                tracing::warn!(client_id = %self.client_id, name = %name, "upstream link exhausted reconnect attempts");
                self.maybe_close_on_terminal(client_write).await
            }
            LinkEvent::Message(raw) => {
                self.handle_upstream_message(&name, raw, client_write).await;
                false
            }
        }
    }

    async fn maybe_close_on_terminal(&mut self, client_write: &mut ClientSink) -> bool {
        if self.all_links_terminal() {
            close_client(client_write, 1001, "All upstream servers unavailable").await;
            true
        } else {
            false
        }
    }

    async fn handle_upstream_message(&mut self, name: &str, raw: String, client_write: &mut ClientSink) {
        let Some(msg) = self.router.parse(&raw) else {
            tracing::warn!(client_id = %self.client_id, name = %name, "dropping unparseable upstream frame");
            return;
        };

        let forward = match msg.msg_type {
            crate::message::MessageType::Call => {
                self.router.observe_from_upstream(&msg, name);
                true
            }
            crate::message::MessageType::CallResult | crate::message::MessageType::CallError => {
                let Some(primary) = self.primary_name() else {
                    return;
                };
                self.router.should_forward_upstream_reply(&msg.id, name, primary)
            }
        };

        if forward {
            if let Err(e) = client_write.send(WsMessage::Text(raw.into())).await {
                tracing::debug!(client_id = %self.client_id, err = %e, "client write failed");
            }
        }
    }

    /// Drain the pre-connect buffer once a link reaches Open (§4.D). The
    /// primary re-feeds through the normal path (registers CALLs, broadcasts
    /// to every currently-connected link); a secondary only gets its own
    /// direct delivery.
    async fn drain_pre_connect_buffer(&mut self, connected_position: usize, client_write: &mut ClientSink) {
        if self.pre_connect_buffer.is_empty() || self.buffer_drained {
            return;
        }

        let is_primary = connected_position == 0;
        if is_primary {
            // Cloned, not taken: if a secondary hasn't connected yet, it
            // still needs its own direct delivery below once it does. The
            // buffer is only actually emptied once every link is settled.
            let frames = self.pre_connect_buffer.clone();
            for raw in frames {
                self.route_client_frame(raw, client_write).await;
            }
        } else if let Some(link) = self.upstreams.get(connected_position) {
            for raw in &self.pre_connect_buffer {
                link.send(raw);
            }
        }

        if self.all_links_settled() {
            self.pre_connect_buffer.clear();
            self.buffer_drained = true;
        }
    }

    async fn teardown(mut self, client_write: &mut ClientSink) {
        for link in &self.upstreams {
            link.close();
        }
        self.router.clear();
        self.registry.remove_if_current(&self.handle).await;
        self.notifier.disconnected_from_proxy(&self.client_id);
        let _ = client_write.close().await;
    }
}

type ClientSink = SplitSink<WebSocket, WsMessage>;

async fn close_client(client_write: &mut ClientSink, code: u16, reason: &str) {
    let frame = CloseFrame { code, reason: reason.to_owned().into() };
    let _ = client_write.send(WsMessage::Close(Some(frame))).await;
}

fn is_settled(connected: bool, exhausted: bool) -> bool {
    connected || exhausted
}

fn is_terminal(connected: bool, exhausted: bool) -> bool {
    !connected && exhausted
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
