//! Settings sections.
//!
//! The wake, keep-alive and init sections reuse the policy types from
//! `bizhub-core` directly so a settings file maps one-to-one onto what the
//! manager consumes.

use bizhub_core::{InitPolicy, KeepAlivePolicy, WakePolicy};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BizhubSettings {
    /// Backend location and endpoint paths.
    pub server: ServerSettings,
    /// Wake cycle backoff.
    pub wake: WakePolicy,
    /// Keep-alive ping loop.
    pub keep_alive: KeepAlivePolicy,
    /// First-load follow-up attempts.
    pub init: InitPolicy,
    /// Visitor session tracking.
    pub analytics: AnalyticsSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl BizhubSettings {
    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        let url = self.server.base_url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SettingsError::InvalidValue(format!(
                "server.baseUrl must start with http:// or https://, got {url:?}"
            )));
        }
        for (name, path) in [
            ("server.wakePath", &self.server.wake_path),
            ("server.pingPath", &self.server.ping_path),
            ("server.visitPath", &self.server.visit_path),
        ] {
            if !path.starts_with('/') {
                return Err(SettingsError::InvalidValue(format!(
                    "{name} must start with '/', got {path:?}"
                )));
            }
        }
        if !self.wake.multiplier.is_finite() || self.wake.multiplier <= 1.0 {
            return Err(SettingsError::InvalidValue(format!(
                "wake.multiplier must be > 1.0, got {}",
                self.wake.multiplier
            )));
        }
        if self.wake.max_timeout_ms < self.wake.initial_timeout_ms {
            return Err(SettingsError::InvalidValue(format!(
                "wake.maxTimeoutMs ({}) must not be below wake.initialTimeoutMs ({})",
                self.wake.max_timeout_ms, self.wake.initial_timeout_ms
            )));
        }
        if self.wake.max_delay_ms < self.wake.initial_delay_ms {
            return Err(SettingsError::InvalidValue(format!(
                "wake.maxDelayMs ({}) must not be below wake.initialDelayMs ({})",
                self.wake.max_delay_ms, self.wake.initial_delay_ms
            )));
        }
        Ok(())
    }
}

/// Backend location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// API origin, without trailing slash.
    pub base_url: String,
    /// Health/wake endpoint path.
    pub wake_path: String,
    /// Liveness endpoint path.
    pub ping_path: String,
    /// Visitor analytics endpoint path.
    pub visit_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            wake_path: "/api/wake".to_string(),
            ping_path: "/api/ping".to_string(),
            visit_path: "/api/analytics/visit".to_string(),
        }
    }
}

impl ServerSettings {
    /// Origin without trailing slashes.
    pub fn origin(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Full visitor analytics URL.
    pub fn visit_url(&self) -> String {
        format!("{}{}", self.origin(), self.visit_path)
    }
}

/// Visitor session tracking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsSettings {
    /// Whether page views are reported.
    pub enabled: bool,
    /// Idle time after which a new session starts, in ms.
    pub session_timeout_ms: u64,
    /// File backing the session store (relative to `~/.bizhub`).
    pub store_file: String,
    /// Timeout of a single tracking request in ms.
    pub request_timeout_ms: u64,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            session_timeout_ms: 30 * 60 * 1000,
            store_file: "session.json".to_string(),
            request_timeout_ms: 5_000,
        }
    }
}

/// Log output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter when `RUST_LOG` is unset.
    pub level: String,
    /// `"compact"` or `"json"`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}
