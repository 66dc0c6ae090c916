// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One WebSocket connection to one upstream OCPP server.
//!
//! Idle -> Connecting -> Open -> Closing -> Idle, with an orthogonal
//! Retrying state entered from Open after an unsolicited close. Reconnects
//! follow a capped exponential back-off; `close()` forbids all future
//! reconnects regardless of what else happens to the link afterward.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Number of consecutive reconnect attempts before giving up. Attempt 11 is
/// never scheduled.
const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Events a link reports to its owning Session, tagged with the link's
/// ordinal position by the caller (see `UpstreamLink::position`).
#[derive(Debug, Clone)]
pub enum LinkEvent {
    Connected,
    Disconnected,
    Message(String),
    GaveUp,
}

/// Shared, atomically-updated state a Session can poll without awaiting.
struct LinkState {
    connected: AtomicBool,
    ever_connected: AtomicBool,
    closed: AtomicBool,
    gave_up: AtomicBool,
    reconnect_attempts: AtomicU32,
}

impl LinkState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            ever_connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            gave_up: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
        }
    }
}

/// Handle to one upstream WebSocket link. Cheap to clone-by-reference (wrap
/// in `Arc` at the call site); all mutation happens inside the background
/// task spawned by `connect()`.
pub struct UpstreamLink {
    pub name: String,
    pub position: usize,
    base_url: String,
    protocol: String,
    client_id: String,
    client_ip: String,
    auth: Option<String>,
    user_agent: Option<String>,
    state: Arc<LinkState>,
    outbound_tx: mpsc::UnboundedSender<String>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    cancel: CancellationToken,
    events_tx: mpsc::Sender<(usize, LinkEvent)>,
}

impl UpstreamLink {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        position: usize,
        base_url: String,
        protocol: String,
        client_id: String,
        client_ip: String,
        auth: Option<String>,
        user_agent: Option<String>,
        events_tx: mpsc::Sender<(usize, LinkEvent)>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            name,
            position,
            base_url,
            protocol,
            client_id,
            client_ip,
            auth,
            user_agent,
            state: Arc::new(LinkState::new()),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            cancel: CancellationToken::new(),
            events_tx,
        }
    }

    /// Idle -> Connecting. A no-op if already connecting/open, or if the
    /// link has been `close()`d.
    pub async fn connect(&self) {
        if self.state.closed.load(Ordering::Acquire) {
            return;
        }
        let mut guard = self.outbound_rx.lock().await;
        let Some(outbound_rx) = guard.take() else {
            return; // already started
        };
        drop(guard);

        tokio::spawn(run_link(
            self.name.clone(),
            self.position,
            format!("{}{}", self.base_url, self.client_id),
            self.protocol.clone(),
            self.client_ip.clone(),
            self.auth.clone(),
            self.user_agent.clone(),
            Arc::clone(&self.state),
            self.cancel.clone(),
            outbound_rx,
            self.events_tx.clone(),
        ));
    }

    /// Send a raw frame on this link. Returns `false` (and logs) if the
    /// link is not currently open; never retries and never panics.
    pub fn send(&self, raw: &str) -> bool {
        if !self.state.connected.load(Ordering::Acquire) {
            tracing::debug!(name = %self.name, "send on non-open upstream link, dropping frame");
            return false;
        }
        match self.outbound_tx.send(raw.to_owned()) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(name = %self.name, "upstream link outbound channel closed, dropping frame");
                false
            }
        }
    }

    /// Forbid all future reconnects and tear down any live socket. Safe to
    /// call more than once.
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::Release);
        self.cancel.cancel();
    }

    pub fn connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    pub fn ever_connected(&self) -> bool {
        self.state.ever_connected.load(Ordering::Acquire)
    }

    pub fn closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// True once `on_gave_up` has fired for this link.
    pub fn exhausted(&self) -> bool {
        self.state.gave_up.load(Ordering::Acquire)
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.state.reconnect_attempts.load(Ordering::Acquire)
    }
}

/// Delay before reconnect attempt `n` (1-indexed): `min(5000*2^(n-1), 60000)` ms.
fn backoff_delay_ms(attempt: u32) -> u64 {
    let shift = attempt.saturating_sub(1).min(20);
    let multiplier: u64 = 1u64 << shift;
    5000u64.saturating_mul(multiplier).min(60_000)
}

fn build_request(
    url: &str,
    protocol: &str,
    client_ip: &str,
    auth: Option<&str>,
    user_agent: Option<&str>,
) -> anyhow::Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
    let mut request = url
        .into_client_request()
        .map_err(|e| anyhow::anyhow!("invalid upstream url {url}: {e}"))?;
    let headers = request.headers_mut();
    headers.insert("sec-websocket-protocol", HeaderValue::from_str(protocol)?);
    if !client_ip.is_empty() {
        headers.insert("x-forwarded-for", HeaderValue::from_str(client_ip)?);
        headers.insert("x-real-ip", HeaderValue::from_str(client_ip)?);
    }
    if let Some(a) = auth {
        headers.insert("authorization", HeaderValue::from_str(a)?);
    }
    if let Some(ua) = user_agent {
        headers.insert("user-agent", HeaderValue::from_str(ua)?);
    }
    Ok(request)
}

#[allow(clippy::too_many_arguments)]
async fn run_link(
    name: String,
    position: usize,
    url: String,
    protocol: String,
    client_ip: String,
    auth: Option<String>,
    user_agent: Option<String>,
    state: Arc<LinkState>,
    cancel: CancellationToken,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    events_tx: mpsc::Sender<(usize, LinkEvent)>,
) {
    let mut attempt: u32 = 0;

    loop {
        if state.closed.load(Ordering::Acquire) || cancel.is_cancelled() {
            return;
        }

        let request = match build_request(&url, &protocol, &client_ip, auth.as_deref(), user_agent.as_deref()) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(name = %name, err = %e, "cannot build upstream request, giving up");
                state.gave_up.store(true, Ordering::Release);
                let _ = events_tx.send((position, LinkEvent::GaveUp)).await;
                return;
            }
        };

        match tokio_tungstenite::connect_async(request).await {
            Ok((stream, _response)) => {
                attempt = 0;
                state.reconnect_attempts.store(0, Ordering::Release);
                state.connected.store(true, Ordering::Release);
                state.ever_connected.store(true, Ordering::Release);
                tracing::info!(name = %name, "upstream link connected");
                if events_tx.send((position, LinkEvent::Connected)).await.is_err() {
                    return;
                }

                let (mut write, mut read) = stream.split();

                'open: loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            state.connected.store(false, Ordering::Release);
                            let _ = write.close().await;
                            return;
                        }
                        incoming = read.next() => {
                            match incoming {
                                Some(Ok(Message::Text(text))) => {
                                    if events_tx.send((position, LinkEvent::Message(text.to_string()))).await.is_err() {
                                        return;
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None => break 'open,
                                Some(Err(e)) => {
                                    tracing::debug!(name = %name, err = %e, "upstream read error");
                                    break 'open;
                                }
                                _ => {}
                            }
                        }
                        outgoing = outbound_rx.recv() => {
                            match outgoing {
                                Some(text) => {
                                    if let Err(e) = write.send(Message::Text(text.into())).await {
                                        tracing::debug!(name = %name, err = %e, "upstream write failed");
                                        break 'open;
                                    }
                                }
                                None => return,
                            }
                        }
                    }
                }

                state.connected.store(false, Ordering::Release);
                if !state.closed.load(Ordering::Acquire) {
                    tracing::info!(name = %name, "upstream link disconnected");
                    if events_tx.send((position, LinkEvent::Disconnected)).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::debug!(name = %name, err = %e, "upstream connect failed");
            }
        }

        if state.closed.load(Ordering::Acquire) || cancel.is_cancelled() {
            return;
        }

        attempt += 1;
        if attempt > MAX_RECONNECT_ATTEMPTS {
            tracing::warn!(name = %name, "upstream link exhausted reconnect attempts");
            state.gave_up.store(true, Ordering::Release);
            let _ = events_tx.send((position, LinkEvent::GaveUp)).await;
            return;
        }
        state.reconnect_attempts.store(attempt, Ordering::Release);
        let delay = Duration::from_millis(backoff_delay_ms(attempt));
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
#[path = "link_tests.rs"]
mod tests;
