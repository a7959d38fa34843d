//! Theme watcher — polls the host palette and notifies on change.
//!
//! The host publishes its active color palette but no change event. The
//! watcher polls through a [`PaletteSource`] and republishes on a
//! `tokio::sync::watch` channel only when the palette actually differs, so
//! subscribers can restyle without diffing themselves.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::services::task::PeriodicTask;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    pub id: String,
    #[serde(default)]
    pub colors: BTreeMap<String, String>,
}

impl Palette {
    #[must_use]
    pub fn color(&self, key: &str) -> Option<&str> {
        self.colors.get(key).map(String::as_str)
    }
}

pub trait PaletteSource: Send + Sync {
    /// `None` while the host has no palette loaded yet.
    fn current_palette(&self) -> Option<Palette>;
}

pub struct ThemeWatcher {
    source: Arc<dyn PaletteSource>,
    tx: watch::Sender<Option<Palette>>,
    task: Mutex<Option<PeriodicTask>>,
}

impl ThemeWatcher {
    pub fn new(source: Arc<dyn PaletteSource>) -> Arc<Self> {
        let (tx, _) = watch::channel(None);
        Arc::new(Self { source, tx, task: Mutex::new(None) })
    }

    /// Build a watcher and start polling right away.
    pub fn spawn(source: Arc<dyn PaletteSource>, interval: Duration) -> Arc<Self> {
        let watcher = Self::new(source);
        watcher.start(interval);
        watcher
    }

    /// Start polling every `interval`. Replaces any running poller.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let watcher = Arc::downgrade(self);
        let task = PeriodicTask::spawn("theme-watcher", interval, move || {
            let Some(watcher) = watcher.upgrade() else {
                return ControlFlow::Break(());
            };
            watcher.poll_once();
            ControlFlow::Continue(())
        });
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = task;
    }

    pub fn stop(&self) {
        self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Read the palette once. Returns `true` if subscribers were notified.
    pub fn poll_once(&self) -> bool {
        let Some(next) = self.source.current_palette() else {
            return false;
        };
        let changed = self.tx.send_if_modified(|current| {
            if current.as_ref() == Some(&next) {
                return false;
            }
            *current = Some(next.clone());
            true
        });
        if changed {
            debug!(palette = %next.id, "palette changed");
        }
        changed
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Palette>> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn current(&self) -> Option<Palette> {
        self.tx.borrow().clone()
    }
}

#[cfg(test)]
#[path = "theme_test.rs"]
mod tests;
