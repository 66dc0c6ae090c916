// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-facing WebSocket transport: the Listener (§4.E).

pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with the single client WebSocket route. Any path
/// that doesn't match `/{client_id}` at all (`/`, `/a/b`, deeper paths, ...)
/// falls to `ws::fallback_handler`, which applies the same invalid-path
/// rejection as `ws_handler` so the path round-trip table (§8) holds for
/// those too.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/{client_id}", get(ws::ws_handler))
        .fallback(ws::fallback_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
