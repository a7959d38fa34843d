//! Transient user notifications (toasts).
//!
//! Background work that fails without a caller to report to (fire-and-forget
//! saves, stale restores) surfaces here. Delivery is a broadcast: every UI
//! surface that subscribed sees each notice, and a notice sent with no
//! subscribers is simply dropped.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_NOTICE_CAPACITY: usize = 64;
const DEFAULT_NOTICE_LIFE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// One toast. `life` is how long a UI should keep it on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub summary: String,
    pub detail: String,
    pub life: Duration,
}

impl Notice {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, summary: summary.into(), detail: detail.into(), life: DEFAULT_NOTICE_LIFE }
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, summary: summary.into(), detail: detail.into(), life: DEFAULT_NOTICE_LIFE }
    }

    pub fn info(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, summary: summary.into(), detail: detail.into(), life: DEFAULT_NOTICE_LIFE }
    }
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(DEFAULT_NOTICE_CAPACITY);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    /// Publish a notice. Returns how many subscribers received it.
    pub fn notify(&self, notice: Notice) -> usize {
        self.tx.send(notice).unwrap_or(0)
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").field("subscribers", &self.tx.receiver_count()).finish()
    }
}

#[cfg(test)]
#[path = "notify_test.rs"]
mod tests;
