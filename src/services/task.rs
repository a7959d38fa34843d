//! Periodic task service — cancellable interval loops.
//!
//! DESIGN
//! ======
//! The host exposes no change-notification hook, so mirrors and the theme
//! watcher poll. Each poller is a [`PeriodicTask`]: a tokio interval loop
//! whose handle aborts the loop when cancelled or dropped. Owners store the
//! handle next to the state it polls, so disposing the state cancels the
//! poller without a separate bookkeeping step.
//!
//! TRADE-OFFS
//! ==========
//! Missed ticks are skipped rather than replayed: a poller that fell behind
//! only needs the latest state, not a burst of catch-up checks.

use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// How an owner drives its periodic checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncSchedule {
    /// No background task; the owner's `sync` methods are called explicitly.
    #[default]
    Manual,
    /// Spawn a [`PeriodicTask`] with this period.
    Every(Duration),
}

/// Handle to a spawned interval loop. Aborts the loop on drop.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn `tick` every `period` on the current tokio runtime.
    ///
    /// The first call happens one full period after spawning. Returning
    /// [`ControlFlow::Break`] from `tick` ends the loop. Returns `None` when
    /// called outside a tokio runtime.
    pub fn spawn<F>(name: &'static str, period: Duration, mut tick: F) -> Option<Self>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(task = name, "no tokio runtime; periodic task not scheduled");
            return None;
        };

        let period = period.max(Duration::from_millis(1));
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if tick().is_break() {
                    debug!(task = name, "periodic task finished");
                    break;
                }
            }
        });

        Some(Self { name, handle })
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Abort the loop. Safe to call more than once.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
#[path = "task_test.rs"]
mod tests;
