//! Network seam between the warm-up manager and the backend.
//!
//! [`ServerProbe`] issues one wake or ping request. [`HttpProbe`] is the
//! reqwest implementation; tests swap in scripted probes.

use std::time::Duration;

use async_trait::async_trait;
use bizhub_core::{PingStatus, ProbeError, WakeStatus};
use tracing::debug;

/// One-shot requests against the backend's wake and ping endpoints.
///
/// Implementations must not retry: retry policy belongs to the caller.
#[async_trait]
pub trait ServerProbe: Send + Sync {
    /// Call the wake endpoint once, giving up after `timeout`.
    async fn wake(&self, timeout: Duration) -> Result<WakeStatus, ProbeError>;

    /// Call the ping endpoint once, giving up after `timeout`.
    async fn ping(&self, timeout: Duration) -> Result<PingStatus, ProbeError>;
}

/// Backend origin and endpoint paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    /// Origin, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Wake endpoint path.
    pub wake_path: String,
    /// Ping endpoint path.
    pub ping_path: String,
}

impl Endpoints {
    /// Endpoints under `base_url` with the default `/api/wake` and `/api/ping` paths.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            wake_path: "/api/wake".to_string(),
            ping_path: "/api/ping".to_string(),
        }
    }

    /// Full wake URL.
    pub fn wake_url(&self) -> String {
        format!("{}{}", self.base_url, self.wake_path)
    }

    /// Full ping URL.
    pub fn ping_url(&self) -> String {
        format!("{}{}", self.base_url, self.ping_path)
    }
}

/// [`ServerProbe`] over HTTP.
///
/// `GET` wake, `POST` ping, no auth headers, per-request timeout.
#[derive(Clone, Debug)]
pub struct HttpProbe {
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl HttpProbe {
    /// Probe with its own client.
    pub fn new(endpoints: Endpoints) -> Self {
        Self::with_client(build_client(), endpoints)
    }

    /// Probe sharing an existing client.
    pub fn with_client(client: reqwest::Client, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }

    /// Configured endpoints.
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

/// Default HTTP client for the probe and the visitor tracker.
pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("bizhub-client/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[async_trait]
impl ServerProbe for HttpProbe {
    async fn wake(&self, timeout: Duration) -> Result<WakeStatus, ProbeError> {
        let url = self.endpoints.wake_url();
        debug!(%url, timeout_ms = millis(timeout), "sending wake request");

        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_request_error(&e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        response
            .json::<WakeStatus>()
            .await
            .map_err(|e| map_request_error(&e, timeout))
    }

    async fn ping(&self, timeout: Duration) -> Result<PingStatus, ProbeError> {
        let url = self.endpoints.ping_url();
        debug!(%url, timeout_ms = millis(timeout), "sending ping");

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_request_error(&e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        response
            .json::<PingStatus>()
            .await
            .map_err(|e| map_request_error(&e, timeout))
    }
}

fn map_request_error(err: &reqwest::Error, timeout: Duration) -> ProbeError {
    if err.is_timeout() {
        ProbeError::Timeout {
            timeout_ms: millis(timeout),
        }
    } else if err.is_decode() {
        ProbeError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
        ProbeError::Status(status.as_u16())
    } else {
        ProbeError::Network(err.to_string())
    }
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
