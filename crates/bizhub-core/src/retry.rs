//! Backoff policies and delay calculation.
//!
//! Provides the parameters and math for waking a cold backend. The async
//! execution lives in `bizhub-client`; this module stays sync-only:
//!
//! - [`WakePolicy`]: attempt count, growing timeouts and delays for a wake cycle
//! - [`KeepAlivePolicy`]: ping interval and ping timeout
//! - [`InitPolicy`]: follow-up attempts after a failed first-load wake
//! - [`calculate_backoff_delay`]: capped exponential growth

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Default number of attempts in one wake cycle.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default timeout of the first wake attempt in milliseconds.
pub const DEFAULT_INITIAL_TIMEOUT_MS: u64 = 10_000;
/// Default delay after the first failed attempt in milliseconds.
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 2_000;
/// Default growth factor applied per attempt.
pub const DEFAULT_MULTIPLIER: f64 = 1.5;
/// Default cap on a single attempt's timeout in milliseconds.
pub const DEFAULT_MAX_TIMEOUT_MS: u64 = 60_000;
/// Default cap on the delay between attempts in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default number of consecutive failed cycles before the connection is degraded.
pub const DEFAULT_DEGRADED_THRESHOLD: u32 = 3;
/// Default keep-alive interval (14 minutes, under a 15 minute idle sleep).
pub const DEFAULT_KEEP_ALIVE_INTERVAL_MS: u64 = 14 * 60 * 1000;
/// Default ping timeout in milliseconds.
pub const DEFAULT_PING_TIMEOUT_MS: u64 = 5_000;
/// Default spacing of first-load follow-up attempts in milliseconds.
pub const DEFAULT_INIT_RETRY_INTERVAL_MS: u64 = 5_000;
/// Default total time spent on first-load follow-up attempts in milliseconds.
pub const DEFAULT_INIT_RETRY_BUDGET_MS: u64 = 60_000;

// ─────────────────────────────────────────────────────────────────────────────
// Wake policy
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters of one wake cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WakePolicy {
    /// Total attempts per cycle, including the first (at least 1).
    pub max_attempts: u32,
    /// Timeout of the first attempt in ms.
    pub initial_timeout_ms: u64,
    /// Delay after the first failure in ms.
    pub initial_delay_ms: u64,
    /// Growth factor for both timeout and delay (at least 1.0).
    pub multiplier: f64,
    /// Cap on a single attempt's timeout in ms.
    pub max_timeout_ms: u64,
    /// Cap on the delay between attempts in ms.
    pub max_delay_ms: u64,
    /// Failed cycles after which the connection counts as degraded.
    pub degraded_threshold: u32,
}

impl Default for WakePolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_timeout_ms: DEFAULT_INITIAL_TIMEOUT_MS,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            multiplier: DEFAULT_MULTIPLIER,
            max_timeout_ms: DEFAULT_MAX_TIMEOUT_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            degraded_threshold: DEFAULT_DEGRADED_THRESHOLD,
        }
    }
}

impl WakePolicy {
    /// Number of attempts in a cycle, never zero.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Timeout for the zero-based `attempt`.
    pub fn timeout_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(calculate_backoff_delay(
            attempt,
            self.initial_timeout_ms,
            self.max_timeout_ms,
            self.multiplier,
        ))
    }

    /// Delay to wait after the zero-based `attempt` failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(calculate_backoff_delay(
            attempt,
            self.initial_delay_ms,
            self.max_delay_ms,
            self.multiplier,
        ))
    }

    /// Threshold used for [`ConnectionPhase::Degraded`], never zero.
    ///
    /// [`ConnectionPhase::Degraded`]: crate::state::ConnectionPhase::Degraded
    pub fn degraded_threshold(&self) -> u32 {
        self.degraded_threshold.max(1)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Keep-alive policy
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters of the periodic keep-alive ping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeepAlivePolicy {
    /// Time between pings in ms.
    pub interval_ms: u64,
    /// Timeout of a single ping in ms.
    pub ping_timeout_ms: u64,
}

impl Default for KeepAlivePolicy {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_KEEP_ALIVE_INTERVAL_MS,
            ping_timeout_ms: DEFAULT_PING_TIMEOUT_MS,
        }
    }
}

impl KeepAlivePolicy {
    /// Ping interval, at least one millisecond.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    /// Ping timeout.
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Init policy
// ─────────────────────────────────────────────────────────────────────────────

/// Follow-up attempts made by first-load initialization once the regular
/// wake cycle has failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitPolicy {
    /// Fixed spacing between follow-up attempts in ms.
    pub retry_interval_ms: u64,
    /// Total time allowed for follow-up attempts in ms.
    pub retry_budget_ms: u64,
}

impl Default for InitPolicy {
    fn default() -> Self {
        Self {
            retry_interval_ms: DEFAULT_INIT_RETRY_INTERVAL_MS,
            retry_budget_ms: DEFAULT_INIT_RETRY_BUDGET_MS,
        }
    }
}

impl InitPolicy {
    /// Spacing between follow-up attempts, at least one millisecond.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms.max(1))
    }

    /// Total follow-up budget.
    pub fn retry_budget(&self) -> Duration {
        Duration::from_millis(self.retry_budget_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Calculate a capped exponential value.
///
/// Formula: `min(max_ms, base_ms * multiplier^attempt)`, rounded to the
/// nearest millisecond. Multipliers below 1.0 are treated as 1.0.
///
/// # Arguments
///
/// * `attempt`: zero-based attempt index
/// * `base_ms`: value for attempt 0
/// * `max_ms`: upper bound
/// * `multiplier`: growth factor per attempt
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
pub fn calculate_backoff_delay(attempt: u32, base_ms: u64, max_ms: u64, multiplier: f64) -> u64 {
    let factor = multiplier.max(1.0).powi(attempt.min(1024) as i32);
    let raw = (base_ms as f64) * factor;

    if !raw.is_finite() || raw >= max_ms as f64 {
        return max_ms;
    }
    (raw.round() as u64).min(max_ms)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
