//! Error types for probing the backend and persisting client state.

use thiserror::Error;

/// Why a single wake or ping attempt against the backend failed.
///
/// Every variant is retryable: a sleeping backend can surface as a timeout,
/// a refused connection, a gateway error page, or a half-started process
/// answering with something other than `"awake"`.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// The request did not complete within its timeout.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The request failed before a response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a non-success HTTP status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The backend answered but did not report itself ready.
    #[error("server reported status {0:?}")]
    NotAwake(String),
}

impl ProbeError {
    /// Whether the attempt may be retried. Always true for probe failures.
    pub fn is_retryable(&self) -> bool {
        true
    }

    /// Short category label for structured logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Network(_) => "network",
            Self::Status(_) => "status",
            Self::Decode(_) => "decode",
            Self::NotAwake(_) => "not_awake",
        }
    }
}

/// Errors from the file-backed key-value store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file held invalid JSON.
    #[error("storage JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
