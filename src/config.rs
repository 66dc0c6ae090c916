// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration contract (§6): an object read once at startup describing
//! the listen address, the mandatory primary and optional secondary
//! upstream, the log level, and notification flags. Loading/validating the
//! file on disk is an external concern; this module only defines the shape
//! and a thin `load` helper.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level CLI surface: just where to find the config file.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "ocpp-proxy", about = "OCPP 1.6-J WebSocket proxy")]
pub struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, env = "OCPP_PROXY_CONFIG", default_value = "ocpp-proxy.json")]
    pub config: std::path::PathBuf,
}

/// `proxy.host` / `proxy.port`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

/// Shape only — email delivery is out of scope; this documents the seam.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
}

/// Shape only — Pushover delivery is out of scope; this documents the seam.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushoverConfig {
    pub user_key: String,
    pub api_token: String,
}

fn default_true() -> bool {
    true
}

/// Per-event-kind alert flags plus delivery channel credentials.
///
/// `#[derive(Default)]` would give every field `bool::default() == false`,
/// which is wrong for the four connection-lifecycle flags below (they
/// default to `true` both when `notify` is omitted entirely and when an
/// individual flag is omitted from a present `notify` object) — so `Default`
/// is implemented by hand to match the `serde(default = "default_true")`
/// behavior exactly.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyConfig {
    #[serde(default = "default_true")]
    pub connected_to_proxy: bool,
    #[serde(default = "default_true")]
    pub disconnected_from_proxy: bool,
    #[serde(default = "default_true")]
    pub connected_to_upstream: bool,
    #[serde(default = "default_true")]
    pub disconnected_from_upstream: bool,
    #[serde(default)]
    pub status_notification: bool,
    #[serde(default)]
    pub start_transaction: bool,
    #[serde(default)]
    pub stop_transaction: bool,
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub pushover: Option<PushoverConfig>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            connected_to_proxy: true,
            disconnected_from_proxy: true,
            connected_to_upstream: true,
            disconnected_from_upstream: true,
            status_notification: false,
            start_transaction: false,
            stop_transaction: false,
            email: None,
            pushover: None,
        }
    }
}

/// Top-level proxy configuration, read once at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub proxy: ListenConfig,
    pub primary_url: String,
    #[serde(default)]
    pub secondary_url: Option<String>,
    #[serde(default)]
    pub log_level: Option<LogLevel>,
    #[serde(default)]
    pub notify: Option<NotifyConfig>,
}

impl ProxyConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;
        Ok(config)
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level.unwrap_or_default()
    }

    pub fn notify(&self) -> NotifyConfig {
        self.notify.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"proxy":{"host":"0.0.0.0","port":9000},"primaryUrl":"ws://pri.example/"}"#,
        )
        .expect("write");
        let config = ProxyConfig::load(&path).expect("load");
        assert_eq!(config.proxy.host, "0.0.0.0");
        assert_eq!(config.primary_url, "ws://pri.example/");
        assert!(config.secondary_url.is_none());
        assert_eq!(config.log_level(), LogLevel::Info);
    }

    #[test]
    fn loads_full_config_with_notify() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "proxy": {"host": "0.0.0.0", "port": 9000},
                "primaryUrl": "ws://pri.example/",
                "secondaryUrl": "ws://sec.example/",
                "logLevel": "debug",
                "notify": {
                    "connectedToProxy": false,
                    "statusNotification": true
                }
            }"#,
        )
        .expect("write");
        let config = ProxyConfig::load(&path).expect("load");
        assert_eq!(config.proxy.port, 9000);
        assert_eq!(config.secondary_url.as_deref(), Some("ws://sec.example/"));
        assert_eq!(config.log_level(), LogLevel::Debug);
        let notify = config.notify();
        assert!(!notify.connected_to_proxy);
        assert!(notify.status_notification);
        assert!(notify.disconnected_from_proxy, "unset flags keep their default");
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = ProxyConfig::load(Path::new("/nonexistent/path/config.json"));
        assert!(result.is_err());
    }

    #[test]
    fn unparseable_json_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").expect("write");
        assert!(ProxyConfig::load(&path).is_err());
    }

    #[test]
    fn notify_defaults_match_when_section_is_entirely_absent() {
        let notify = NotifyConfig::default();
        assert!(notify.connected_to_proxy);
        assert!(notify.disconnected_from_proxy);
        assert!(notify.connected_to_upstream);
        assert!(notify.disconnected_from_upstream);
        assert!(!notify.status_notification);
        assert!(!notify.start_transaction);
        assert!(!notify.stop_transaction);
    }
}
