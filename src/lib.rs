// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OCPP 1.6-J WebSocket proxy: multiplexes one charge-point session onto a
//! mandatory primary and optional secondary upstream central system.

pub mod config;
pub mod message;
pub mod notify;
pub mod registry;
pub mod router;
pub mod session;
pub mod state;
pub mod transport;
pub mod upstream;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::ProxyConfig;
use crate::notify::{LoggingNotifier, Notifier};
use crate::state::AppState;

/// Run the proxy until SIGINT/SIGTERM, then drain every live session and
/// return.
pub async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.proxy.host, config.proxy.port);
    let notifier: Arc<dyn Notifier> = Arc::new(LoggingNotifier::new(config.notify()));
    let state = Arc::new(AppState::new(config, notifier));
    let registry = Arc::clone(&state.registry);

    let router = transport::build_router(Arc::clone(&state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "ocpp-proxy listening");

    let registry_for_shutdown = Arc::clone(&registry);
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            tracing::info!("shutdown signal received, closing sessions");
            drain_registry(&registry_for_shutdown).await;
        })
        .await?;

    Ok(())
}

/// Close every live session (superseding each via its registry handle) and
/// wait for the registry to empty, so the in-flight client connections that
/// `axum::serve`'s graceful shutdown is waiting on actually finish.
async fn drain_registry(registry: &Arc<registry::Registry>) {
    let sessions = registry.snapshot().await;
    if sessions.is_empty() {
        return;
    }
    tracing::info!(count = sessions.len(), "shutting down, closing live sessions");
    for handle in sessions {
        handle.supersede.cancel();
    }
    // Sessions remove themselves from the registry as they observe
    // cancellation; poll briefly rather than joining task handles we don't
    // keep around (the Listener hands session tasks off to axum's internal
    // spawn, per-session ownership per the design notes).
    for _ in 0..50 {
        if registry.len().await == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let sigterm = signal(SignalKind::terminate());
    match sigterm {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(err = %e, "failed to install SIGTERM handler, watching SIGINT only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
