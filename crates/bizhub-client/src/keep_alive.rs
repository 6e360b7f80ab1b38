//! Periodic keep-alive ping loop.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::manager::WarmupManager;

/// Why the keep-alive loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveExit {
    /// The loop was stopped or replaced.
    Cancelled,
    /// The owning manager was dropped.
    ManagerDropped,
}

/// A running keep-alive loop. Stopping cancels the loop before its next ping.
#[derive(Debug)]
pub(crate) struct KeepAliveHandle {
    cancel: CancellationToken,
    task: JoinHandle<KeepAliveExit>,
}

impl KeepAliveHandle {
    pub(crate) fn spawn(manager: Weak<WarmupManager>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_keep_alive(manager, interval, cancel.clone()));
        Self { cancel, task }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }

    pub(crate) fn stop(self) {
        self.cancel.cancel();
    }
}

/// Ping every `interval` until cancelled or the manager is gone.
///
/// The first ping fires one full interval after start. A failed ping runs
/// one wake cycle before the loop waits for the next tick. Cancellation
/// also interrupts an in-flight ping or recovery cycle. The manager is
/// held weakly so the loop never keeps it alive.
pub(crate) async fn run_keep_alive(
    manager: Weak<WarmupManager>,
    interval: Duration,
    cancel: CancellationToken,
) -> KeepAliveExit {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("keep-alive loop cancelled");
                return KeepAliveExit::Cancelled;
            }
            _ = ticker.tick() => {
                let Some(manager) = manager.upgrade() else {
                    debug!("manager dropped, keep-alive loop exiting");
                    return KeepAliveExit::ManagerDropped;
                };
                // Dropping the recovery future on cancel releases the wake guard
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        debug!("keep-alive loop cancelled mid-check");
                        return KeepAliveExit::Cancelled;
                    }
                    () = check_and_recover(&manager) => {}
                }
            }
        }
    }
}

async fn check_and_recover(manager: &WarmupManager) {
    if !manager.ping().await {
        info!("keep-alive ping failed, starting wake cycle");
        let _ = manager.wake_cycle().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
