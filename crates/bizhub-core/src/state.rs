//! Connection state and the wake/ping wire types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the client currently knows about the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    /// Last wake or ping confirmed the backend is up.
    pub is_awake: bool,
    /// A wake cycle is running right now.
    pub wakeup_in_progress: bool,
    /// Time of the last successful wake or ping.
    pub last_wake_time: Option<DateTime<Utc>>,
    /// Consecutive wake cycles that exhausted their attempts.
    pub failed_attempts: u32,
}

impl ConnectionState {
    /// Derive the coarse phase from the raw flags.
    pub fn phase(&self, degraded_threshold: u32) -> ConnectionPhase {
        if self.wakeup_in_progress {
            ConnectionPhase::WakingUp
        } else if self.is_awake {
            ConnectionPhase::Awake
        } else if self.failed_attempts >= degraded_threshold.max(1) {
            ConnectionPhase::Degraded
        } else {
            ConnectionPhase::Idle
        }
    }
}

/// Coarse connection phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    /// Not known to be awake and nothing in flight.
    Idle,
    /// A wake cycle is running.
    WakingUp,
    /// The backend answered recently.
    Awake,
    /// Repeated wake cycles have failed.
    Degraded,
}

impl ConnectionPhase {
    /// Stable lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::WakingUp => "waking_up",
            Self::Awake => "awake",
            Self::Degraded => "degraded",
        }
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `GET /api/wake`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WakeStatus {
    /// `"awake"` once the backend is serving.
    pub status: String,
    /// Process uptime in seconds.
    #[serde(default)]
    pub uptime: f64,
}

impl WakeStatus {
    /// Status value reported by a ready backend.
    pub const AWAKE: &'static str = "awake";

    /// Whether the backend reported itself ready.
    pub fn is_awake(&self) -> bool {
        self.status == Self::AWAKE
    }
}

/// Body of `POST /api/ping`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingStatus {
    /// `"pong"` from a live backend.
    pub status: String,
}

impl PingStatus {
    /// Status value of a live backend.
    pub const PONG: &'static str = "pong";

    /// Whether the ping was answered as expected.
    pub fn is_pong(&self) -> bool {
        self.status == Self::PONG
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
