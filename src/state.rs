// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide shared state handed to every axum handler.

use std::sync::Arc;

use crate::config::ProxyConfig;
use crate::notify::Notifier;
use crate::registry::Registry;

pub struct AppState {
    pub registry: Arc<Registry>,
    pub config: ProxyConfig,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(config: ProxyConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self { registry: Arc::new(Registry::new()), config, notifier }
    }
}
