//! Connectivity warm-up manager.
//!
//! Wakes a sleeping backend before the first real request and keeps it
//! awake afterwards:
//!
//! - [`WarmupManager::wake_server`]: single-flight wake cycle with
//!   exponential backoff on both the per-attempt timeout and the delay
//! - [`WarmupManager::ping`]: one short liveness check, no retry
//! - [`WarmupManager::start_keep_alive`] / [`WarmupManager::stop_keep_alive`]:
//!   the periodic ping loop
//! - [`WarmupManager::initialize_server`]: first-load warm-up with a bounded
//!   follow-up budget
//!
//! No operation returns an error. Failures degrade to "not confirmed awake"
//! and are reported through `tracing`.

use std::sync::Arc;
use std::time::Duration;

use bizhub_core::{
    ConnectionPhase, ConnectionState, InitPolicy, KeepAlivePolicy, ProbeError, WakePolicy,
    WakeStatus,
};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::keep_alive::KeepAliveHandle;
use crate::probe::{ServerProbe, millis};

/// Policies used by a [`WarmupManager`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WarmupConfig {
    /// Wake cycle backoff.
    pub wake: WakePolicy,
    /// Keep-alive loop.
    pub keep_alive: KeepAlivePolicy,
    /// First-load follow-up attempts.
    pub init: InitPolicy,
}

/// Owns the [`ConnectionState`] for one backend.
///
/// Shared as `Arc<WarmupManager>`. The state lock is never held across an
/// `.await`.
pub struct WarmupManager {
    probe: Arc<dyn ServerProbe>,
    config: WarmupConfig,
    state: Mutex<ConnectionState>,
    keep_alive: Mutex<Option<KeepAliveHandle>>,
}

impl WarmupManager {
    /// Manager with default policies.
    pub fn new(probe: Arc<dyn ServerProbe>) -> Arc<Self> {
        Self::with_config(probe, WarmupConfig::default())
    }

    /// Manager with explicit policies.
    pub fn with_config(probe: Arc<dyn ServerProbe>, config: WarmupConfig) -> Arc<Self> {
        Arc::new(Self {
            probe,
            config,
            state: Mutex::new(ConnectionState::default()),
            keep_alive: Mutex::new(None),
        })
    }

    /// Policies in use.
    pub fn config(&self) -> &WarmupConfig {
        &self.config
    }

    /// Snapshot of the connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.lock().clone()
    }

    /// Current phase derived from the state.
    pub fn phase(&self) -> ConnectionPhase {
        self.state
            .lock()
            .phase(self.config.wake.degraded_threshold())
    }

    /// Whether the backend is currently believed awake.
    pub fn is_awake(&self) -> bool {
        self.state.lock().is_awake
    }

    // ── Wake ────────────────────────────────────────────────────────

    /// Run a wake cycle, starting keep-alive on success.
    ///
    /// If a cycle is already in flight this returns the current `is_awake`
    /// immediately without touching the network.
    pub async fn wake_server(self: &Arc<Self>) -> bool {
        let awake = self.wake_cycle().await;
        if awake {
            self.start_keep_alive();
        }
        awake
    }

    /// Single-flight wake cycle without touching keep-alive.
    pub(crate) async fn wake_cycle(&self) -> bool {
        let Some(_guard) = self.begin_wake() else {
            let awake = self.is_awake();
            debug!(awake, "wake already in progress, returning current state");
            return awake;
        };

        let policy = &self.config.wake;
        let attempts = policy.attempts();

        for attempt in 0..attempts {
            let timeout = policy.timeout_for(attempt);
            debug!(
                attempt = attempt + 1,
                max_attempts = attempts,
                timeout_ms = millis(timeout),
                "wake attempt"
            );

            match self.try_wake(timeout).await {
                Ok(status) => {
                    self.mark_awake();
                    info!(
                        attempt = attempt + 1,
                        uptime_secs = status.uptime,
                        "server is awake"
                    );
                    return true;
                }
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        category = e.category(),
                        error = %e,
                        "wake attempt failed"
                    );
                    if attempt + 1 < attempts {
                        let delay = policy.delay_after(attempt);
                        debug!(delay_ms = millis(delay), "waiting before next wake attempt");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        self.record_exhausted(attempts);
        false
    }

    async fn try_wake(&self, timeout: Duration) -> Result<WakeStatus, ProbeError> {
        let status = match tokio::time::timeout(timeout, self.probe.wake(timeout)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ProbeError::Timeout {
                    timeout_ms: millis(timeout),
                });
            }
        };
        if status.is_awake() {
            Ok(status)
        } else {
            Err(ProbeError::NotAwake(status.status))
        }
    }

    fn begin_wake(&self) -> Option<WakeGuard<'_>> {
        let mut state = self.state.lock();
        if state.wakeup_in_progress {
            return None;
        }
        state.wakeup_in_progress = true;
        Some(WakeGuard { state: &self.state })
    }

    fn mark_awake(&self) {
        let mut state = self.state.lock();
        state.is_awake = true;
        state.last_wake_time = Some(Utc::now());
        state.failed_attempts = 0;
    }

    fn record_exhausted(&self, attempts: u32) {
        let failed = {
            let mut state = self.state.lock();
            state.is_awake = false;
            state.failed_attempts = state.failed_attempts.saturating_add(1);
            state.failed_attempts
        };

        if failed >= self.config.wake.degraded_threshold() {
            error!(
                attempts,
                failed_cycles = failed,
                "server still unreachable, connection degraded"
            );
        } else {
            warn!(
                attempts,
                failed_cycles = failed,
                "server did not wake after all attempts"
            );
        }
    }

    // ── Ping ────────────────────────────────────────────────────────

    /// One liveness check with the keep-alive ping timeout.
    ///
    /// Success marks the server awake and refreshes `last_wake_time`;
    /// failure marks it not awake. Never starts a wake cycle.
    pub async fn ping(&self) -> bool {
        let timeout = self.config.keep_alive.ping_timeout();
        let result = match tokio::time::timeout(timeout, self.probe.ping(timeout)).await {
            Ok(Ok(status)) if status.is_pong() => Ok(()),
            Ok(Ok(status)) => Err(ProbeError::NotAwake(status.status)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProbeError::Timeout {
                timeout_ms: millis(timeout),
            }),
        };

        let mut state = self.state.lock();
        match result {
            Ok(()) => {
                state.is_awake = true;
                state.last_wake_time = Some(Utc::now());
                debug!("ping ok");
                true
            }
            Err(e) => {
                state.is_awake = false;
                drop(state);
                warn!(category = e.category(), error = %e, "ping failed");
                false
            }
        }
    }

    // ── Keep-alive ──────────────────────────────────────────────────

    /// Start the keep-alive loop, replacing any running one.
    pub fn start_keep_alive(self: &Arc<Self>) {
        let interval = self.config.keep_alive.interval();
        {
            let mut slot = self.keep_alive.lock();
            if let Some(previous) = slot.take() {
                previous.stop();
                debug!("stopped running keep-alive loop before restart");
            }
            *slot = Some(KeepAliveHandle::spawn(Arc::downgrade(self), interval));
        }
        info!(interval_ms = millis(interval), "keep-alive started");
    }

    /// Stop the keep-alive loop. No ping is sent after this returns.
    pub fn stop_keep_alive(&self) {
        if let Some(handle) = self.keep_alive.lock().take() {
            handle.stop();
            info!("keep-alive stopped");
        }
    }

    /// Whether a keep-alive loop is registered and running.
    pub fn is_keep_alive_active(&self) -> bool {
        self.keep_alive
            .lock()
            .as_ref()
            .is_some_and(KeepAliveHandle::is_running)
    }

    // ── First load ──────────────────────────────────────────────────

    /// First-load warm-up.
    ///
    /// Runs [`wake_server`](Self::wake_server). If that fails, makes
    /// single-shot follow-up attempts every `init.retry_interval` until
    /// `init.retry_budget` is spent. Follow-ups only start after the wake
    /// cycle has returned, so two retry loops never overlap.
    pub async fn initialize_server(self: &Arc<Self>) -> bool {
        info!("initializing server connection");
        if self.wake_server().await {
            return true;
        }

        let interval = self.config.init.retry_interval();
        let budget = self.config.init.retry_budget();
        let deadline = Instant::now() + budget;
        let mut follow_ups = 0u32;

        while deadline.saturating_duration_since(Instant::now()) >= interval {
            tokio::time::sleep(interval).await;

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            follow_ups += 1;
            let timeout = self.config.wake.timeout_for(0).min(remaining);
            if self.follow_up_attempt(timeout, follow_ups).await {
                self.start_keep_alive();
                return true;
            }
        }

        error!(
            follow_ups,
            budget_ms = millis(budget),
            "server initialization failed, continuing without confirmed backend"
        );
        false
    }

    async fn follow_up_attempt(&self, timeout: Duration, round: u32) -> bool {
        let Some(_guard) = self.begin_wake() else {
            debug!(round, "wake already in progress, skipping follow-up");
            return self.is_awake();
        };

        match self.try_wake(timeout).await {
            Ok(status) => {
                self.mark_awake();
                info!(round, uptime_secs = status.uptime, "server is awake");
                true
            }
            Err(e) => {
                debug!(round, category = e.category(), error = %e, "follow-up wake failed");
                false
            }
        }
    }
}

impl Drop for WarmupManager {
    fn drop(&mut self) {
        if let Some(handle) = self.keep_alive.get_mut().take() {
            handle.stop();
        }
    }
}

impl std::fmt::Debug for WarmupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarmupManager")
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

/// Clears `wakeup_in_progress` when a wake cycle ends, including when the
/// cycle's future is dropped mid-flight.
struct WakeGuard<'a> {
    state: &'a Mutex<ConnectionState>,
}

impl Drop for WakeGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().wakeup_in_progress = false;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Notify;
    use tracing::Level;

    use super::*;
    use crate::testing::{Gate, ScriptedProbe, awake, timed_out};

    fn fast_config() -> WarmupConfig {
        WarmupConfig {
            wake: WakePolicy {
                max_attempts: 5,
                initial_timeout_ms: 100,
                initial_delay_ms: 200,
                multiplier: 2.0,
                max_timeout_ms: 800,
                max_delay_ms: 1_000,
                degraded_threshold: 2,
            },
            keep_alive: KeepAlivePolicy {
                interval_ms: 60_000,
                ping_timeout_ms: 50,
            },
            init: InitPolicy {
                retry_interval_ms: 500,
                retry_budget_ms: 2_000,
            },
        }
    }

    // ── wake_server ─────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn wakes_on_first_attempt() {
        let probe = Arc::new(ScriptedProbe::new());
        let manager = WarmupManager::with_config(probe.clone(), fast_config());

        assert_eq!(manager.phase(), ConnectionPhase::Idle);
        assert!(manager.wake_server().await);

        let state = manager.state();
        assert!(state.is_awake);
        assert!(!state.wakeup_in_progress);
        assert!(state.last_wake_time.is_some());
        assert_eq!(probe.wake_count(), 1);
        assert_eq!(manager.phase(), ConnectionPhase::Awake);
        assert!(manager.is_keep_alive_active());
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_attempt_n_with_growing_timeouts_and_delays() {
        for n in 1..=5usize {
            let probe = Arc::new(ScriptedProbe::failing_wakes(n - 1));
            let manager = WarmupManager::with_config(probe.clone(), fast_config());

            assert!(manager.wake_server().await, "attempt {n} should succeed");

            let calls = probe.wake_calls();
            assert_eq!(calls.len(), n);

            let timeouts: Vec<_> = calls.iter().map(|c| c.timeout).collect();
            for pair in timeouts.windows(2) {
                assert!(pair[1] > pair[0] || pair[1] == Duration::from_millis(800));
            }
            let gaps: Vec<_> = calls.windows(2).map(|w| w[1].at - w[0].at).collect();
            for pair in gaps.windows(2) {
                assert!(pair[1] > pair[0] || pair[1] == Duration::from_millis(1_000));
            }
            if n >= 2 {
                assert_eq!(gaps[0], Duration::from_millis(200));
            }
            manager.stop_keep_alive();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_and_delays_stop_at_caps() {
        let probe = Arc::new(ScriptedProbe::always_down());
        let manager = WarmupManager::with_config(probe.clone(), fast_config());

        assert!(!manager.wake_server().await);

        let timeouts: Vec<_> = probe
            .wake_calls()
            .iter()
            .map(|c| c.timeout.as_millis())
            .collect();
        assert_eq!(timeouts, vec![100, 200, 400, 800, 800]);

        let calls = probe.wake_calls();
        let gaps: Vec<_> = calls
            .windows(2)
            .map(|w| (w[1].at - w[0].at).as_millis())
            .collect();
        assert_eq!(gaps, vec![200, 400, 800, 1_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn two_timeouts_then_awake() {
        let probe = Arc::new(ScriptedProbe::new().with_wake_script(vec![
            Err(timed_out(Duration::from_millis(100))),
            Err(timed_out(Duration::from_millis(200))),
            awake(12.3),
        ]));
        let manager = WarmupManager::with_config(probe.clone(), fast_config());

        assert!(manager.wake_server().await);
        assert!(manager.is_awake());
        assert_eq!(probe.wake_count(), 3);
        assert!(manager.is_keep_alive_active());
        assert_eq!(manager.state().failed_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn not_awake_status_is_retried() {
        let probe = Arc::new(ScriptedProbe::new().with_wake_script(vec![Ok(WakeStatus {
            status: "starting".into(),
            uptime: 0.1,
        })]));
        let manager = WarmupManager::with_config(probe.clone(), fast_config());

        assert!(manager.wake_server().await);
        assert_eq!(probe.wake_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_cycles_count_up_to_degraded() {
        let probe = Arc::new(ScriptedProbe::always_down());
        let manager = WarmupManager::with_config(probe.clone(), fast_config());

        assert!(!manager.wake_server().await);
        assert_eq!(probe.wake_count(), 5);
        assert_eq!(manager.state().failed_attempts, 1);
        assert_eq!(manager.phase(), ConnectionPhase::Idle);
        assert!(!manager.is_keep_alive_active());

        assert!(!manager.wake_server().await);
        assert_eq!(manager.state().failed_attempts, 2);
        assert_eq!(manager.phase(), ConnectionPhase::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failure_count() {
        let mut script: Vec<_> = (0..5)
            .map(|_| Err(ProbeError::Network("refused".into())))
            .collect();
        script.push(awake(3.0));
        let probe = Arc::new(ScriptedProbe::new().with_wake_script(script));
        let manager = WarmupManager::with_config(probe, fast_config());

        assert!(!manager.wake_server().await);
        assert_eq!(manager.state().failed_attempts, 1);
        assert!(manager.wake_server().await);
        assert_eq!(manager.state().failed_attempts, 0);
    }

    #[tokio::test]
    async fn concurrent_wake_does_not_issue_second_call() {
        let gate = Gate {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        let probe = Arc::new(ScriptedProbe::new().with_gate(gate.clone()));
        let mut config = fast_config();
        config.wake.initial_timeout_ms = 10_000;
        config.wake.max_timeout_ms = 10_000;
        let manager = WarmupManager::with_config(probe.clone(), config);

        let first = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.wake_server().await })
        };
        gate.entered.notified().await;

        assert_eq!(manager.phase(), ConnectionPhase::WakingUp);
        assert!(!manager.wake_server().await);
        assert_eq!(probe.wake_count(), 1);

        gate.release.notify_one();
        assert!(first.await.unwrap());
        assert_eq!(probe.wake_count(), 1);
        assert!(!manager.state().wakeup_in_progress);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_probe_is_cut_off_by_timeout() {
        let gate = Gate {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        let probe = Arc::new(ScriptedProbe::new().with_gate(gate));
        let manager = WarmupManager::with_config(probe.clone(), fast_config());

        // First call never returns on its own; the second attempt succeeds.
        assert!(manager.wake_server().await);
        assert_eq!(probe.wake_count(), 2);
    }

    #[test]
    fn exhausted_cycle_logs_warning() {
        let (logs, _guard) = bizhub_logging::capture_logs();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let probe = Arc::new(ScriptedProbe::always_down());
        let manager = WarmupManager::with_config(probe, fast_config());
        assert!(!rt.block_on(manager.wake_server()));

        assert!(logs.has_event(Level::WARN, "server did not wake after all attempts"));
        assert_eq!(
            logs.events()
                .iter()
                .filter(|e| e.message == "wake attempt failed")
                .count(),
            5
        );
    }

    // ── ping ────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn ping_success_marks_awake() {
        let probe = Arc::new(ScriptedProbe::new());
        let manager = WarmupManager::with_config(probe.clone(), fast_config());

        assert!(manager.ping().await);
        let state = manager.state();
        assert!(state.is_awake);
        assert!(state.last_wake_time.is_some());
        assert_eq!(probe.wake_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ping_failure_marks_not_awake_without_recovery() {
        let probe = Arc::new(ScriptedProbe::new().with_ping_script(vec![
            crate::testing::pong(),
            Err(ProbeError::Status(502)),
        ]));
        let manager = WarmupManager::with_config(probe.clone(), fast_config());

        assert!(manager.ping().await);
        assert!(!manager.ping().await);
        assert!(!manager.is_awake());
        assert_eq!(probe.ping_count(), 2);
        assert_eq!(probe.wake_count(), 0);
    }

    // ── initialize_server ───────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn initialize_succeeds_through_wake() {
        let probe = Arc::new(ScriptedProbe::failing_wakes(1));
        let manager = WarmupManager::with_config(probe.clone(), fast_config());

        assert!(manager.initialize_server().await);
        assert_eq!(probe.wake_count(), 2);
        assert!(manager.is_keep_alive_active());
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_gives_up_after_budget() {
        let probe = Arc::new(ScriptedProbe::always_down());
        let manager = WarmupManager::with_config(probe.clone(), fast_config());

        let started = Instant::now();
        assert!(!manager.initialize_server().await);
        let elapsed = started.elapsed();

        // 5 attempts in the wake cycle, then follow-ups at 500, 1000 and
        // 1500ms; the 2000ms slot lands on the deadline and is skipped.
        assert_eq!(probe.wake_count(), 5 + 3);
        // Wake cycle delays (200+400+800+1000) plus the follow-up budget.
        assert!(elapsed <= Duration::from_millis(2_400 + 2_000));
        assert!(!manager.is_awake());
        assert!(!manager.is_keep_alive_active());
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_recovers_in_follow_up() {
        let mut script: Vec<_> = (0..6)
            .map(|_| Err(ProbeError::Status(503)))
            .collect();
        script.push(awake(40.0));
        let probe = Arc::new(ScriptedProbe::new().with_wake_script(script));
        let manager = WarmupManager::with_config(probe.clone(), fast_config());

        assert!(manager.initialize_server().await);
        assert_eq!(probe.wake_count(), 7);
        assert!(manager.is_keep_alive_active());
        assert_eq!(manager.state().failed_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_skips_follow_ups() {
        let probe = Arc::new(ScriptedProbe::always_down());
        let mut config = fast_config();
        config.init.retry_budget_ms = 0;
        let manager = WarmupManager::with_config(probe.clone(), config);

        assert!(!manager.initialize_server().await);
        assert_eq!(probe.wake_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn independent_instances_share_nothing() {
        let up = WarmupManager::with_config(Arc::new(ScriptedProbe::new()), fast_config());
        let down = WarmupManager::with_config(Arc::new(ScriptedProbe::always_down()), fast_config());

        assert!(up.wake_server().await);
        assert!(!down.wake_server().await);
        assert!(up.is_awake());
        assert!(!down.is_awake());
    }
}
