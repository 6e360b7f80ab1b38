//! Scripted probe shared by the manager and keep-alive tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bizhub_core::{PingStatus, ProbeError, WakeStatus};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::probe::ServerProbe;

pub(crate) fn awake(uptime: f64) -> Result<WakeStatus, ProbeError> {
    Ok(WakeStatus {
        status: WakeStatus::AWAKE.to_string(),
        uptime,
    })
}

pub(crate) fn pong() -> Result<PingStatus, ProbeError> {
    Ok(PingStatus {
        status: PingStatus::PONG.to_string(),
    })
}

pub(crate) fn timed_out(timeout: Duration) -> ProbeError {
    ProbeError::Timeout {
        timeout_ms: crate::probe::millis(timeout),
    }
}

/// One recorded wake call.
#[derive(Clone, Copy, Debug)]
pub(crate) struct WakeCall {
    pub(crate) timeout: Duration,
    pub(crate) at: Instant,
}

/// Answers from queued scripts, falling back to a fixed answer once a
/// script runs dry.
pub(crate) struct ScriptedProbe {
    wake_script: Mutex<VecDeque<Result<WakeStatus, ProbeError>>>,
    wake_fallback: Result<WakeStatus, ProbeError>,
    ping_script: Mutex<VecDeque<Result<PingStatus, ProbeError>>>,
    ping_fallback: Result<PingStatus, ProbeError>,
    wake_calls: Mutex<Vec<WakeCall>>,
    ping_calls: Mutex<u32>,
    gate: Option<Gate>,
}

/// Holds the first wake call open until released.
#[derive(Clone)]
pub(crate) struct Gate {
    pub(crate) entered: Arc<Notify>,
    pub(crate) release: Arc<Notify>,
}

impl ScriptedProbe {
    pub(crate) fn new() -> Self {
        Self {
            wake_script: Mutex::new(VecDeque::new()),
            wake_fallback: awake(1.0),
            ping_script: Mutex::new(VecDeque::new()),
            ping_fallback: pong(),
            wake_calls: Mutex::new(Vec::new()),
            ping_calls: Mutex::new(0),
            gate: None,
        }
    }

    /// Wake fails `failures` times with timeouts, then reports awake.
    pub(crate) fn failing_wakes(failures: usize) -> Self {
        Self::new().with_wake_script(
            (0..failures).map(|_| Err(timed_out(Duration::ZERO))).collect(),
        )
    }

    /// Every wake and ping fails.
    pub(crate) fn always_down() -> Self {
        let mut probe = Self::new();
        probe.wake_fallback = Err(ProbeError::Network("connection refused".into()));
        probe.ping_fallback = Err(ProbeError::Network("connection refused".into()));
        probe
    }

    pub(crate) fn with_wake_script(self, script: Vec<Result<WakeStatus, ProbeError>>) -> Self {
        *self.wake_script.lock() = script.into();
        self
    }

    pub(crate) fn with_ping_script(self, script: Vec<Result<PingStatus, ProbeError>>) -> Self {
        *self.ping_script.lock() = script.into();
        self
    }

    pub(crate) fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn wake_calls(&self) -> Vec<WakeCall> {
        self.wake_calls.lock().clone()
    }

    pub(crate) fn wake_count(&self) -> usize {
        self.wake_calls.lock().len()
    }

    pub(crate) fn ping_count(&self) -> u32 {
        *self.ping_calls.lock()
    }
}

#[async_trait]
impl ServerProbe for ScriptedProbe {
    async fn wake(&self, timeout: Duration) -> Result<WakeStatus, ProbeError> {
        let first = {
            let mut calls = self.wake_calls.lock();
            calls.push(WakeCall {
                timeout,
                at: Instant::now(),
            });
            calls.len() == 1
        };

        if let (true, Some(gate)) = (first, &self.gate) {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let next = self.wake_script.lock().pop_front();
        next.unwrap_or_else(|| self.wake_fallback.clone())
    }

    async fn ping(&self, _timeout: Duration) -> Result<PingStatus, ProbeError> {
        *self.ping_calls.lock() += 1;
        let next = self.ping_script.lock().pop_front();
        next.unwrap_or_else(|| self.ping_fallback.clone())
    }
}
