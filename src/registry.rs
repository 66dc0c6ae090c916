// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide client_id -> session map. Admits concurrent inserts/removals
//! (guarded by an `RwLock`); enforces "at most one live Session per
//! client_id" together with the Listener.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// What a registry entry exposes to callers other than the Session that owns it.
#[derive(Clone)]
pub struct SessionHandle {
    pub client_id: String,
    /// Monotonic identity for this particular session instance, so a
    /// just-superseded session's own teardown doesn't remove the session
    /// that replaced it.
    generation: u64,
    /// Cancelled only to signal supersession by a new connection with the
    /// same client_id. Distinct from any Upstream Link's own cancellation.
    pub supersede: CancellationToken,
}

/// Shared session registry.
#[derive(Default)]
pub struct Registry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    next_generation: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh handle for a not-yet-registered session.
    pub fn new_handle(&self, client_id: String) -> SessionHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        SessionHandle { client_id, generation, supersede: CancellationToken::new() }
    }

    /// Insert a handle, returning the previous occupant (if any) so the
    /// caller can supersede it. Does not itself tear the old one down.
    pub async fn insert(&self, handle: SessionHandle) -> Option<SessionHandle> {
        self.sessions.write().await.insert(handle.client_id.clone(), handle)
    }

    /// Remove a session, but only if `handle` is still the one registered
    /// under its client_id (guards against a just-superseded session racing
    /// its own teardown after a new connection already replaced it).
    pub async fn remove_if_current(&self, handle: &SessionHandle) {
        let mut guard = self.sessions.write().await;
        if guard.get(&handle.client_id).map(|h| h.generation) == Some(handle.generation) {
            guard.remove(&handle.client_id);
        }
    }

    /// Snapshot all handles (used for SIGINT/SIGTERM shutdown).
    pub async fn snapshot(&self) -> Vec<SessionHandle> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
