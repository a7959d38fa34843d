//! Active-panel registry.
//!
//! DESIGN
//! ======
//! At most one panel may be Active (all of its mirrors read-only) at a
//! time. The registry is the only place that decision lives: it knows every
//! live panel by id and which one is Active, and it performs the whole
//! hand-over (old panel writable, then new panel read-only) under one lock.
//!
//! Lock order is always registry → panel. Panels never call into the
//! registry while holding their own state lock.
//!
//! Widget panels and node panels share one registry, so the registry only
//! sees them through [`ActiveMember`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

use crate::collector::panel::PanelId;

/// Something the registry can switch between Idle and Active.
pub(crate) trait ActiveMember: Send + Sync {
    fn apply_active(self: Arc<Self>, active: bool);
}

#[derive(Clone, Default)]
pub struct ActiveRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    panels: HashMap<PanelId, Weak<dyn ActiveMember>>,
    active: Option<PanelId>,
}

impl RegistryInner {
    fn panel(&self, id: PanelId) -> Option<Arc<dyn ActiveMember>> {
        self.panels.get(&id).and_then(Weak::upgrade)
    }

    fn prune(&mut self) {
        self.panels.retain(|_, weak| weak.strong_count() > 0);
        if let Some(active) = self.active {
            if !self.panels.contains_key(&active) {
                self.active = None;
            }
        }
    }
}

impl ActiveRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn register(&self, id: PanelId, panel: Weak<dyn ActiveMember>) {
        let mut inner = self.lock();
        inner.prune();
        inner.panels.insert(id, panel);
    }

    pub(crate) fn unregister(&self, id: PanelId) {
        let mut inner = self.lock();
        inner.panels.remove(&id);
        if inner.active == Some(id) {
            inner.active = None;
        }
    }

    /// Make `id` the Active panel, first returning the previous one to Idle.
    ///
    /// Returns `false` if `id` is not a live panel.
    pub fn activate(&self, id: PanelId) -> bool {
        let mut inner = self.lock();
        inner.prune();
        let Some(panel) = inner.panel(id) else {
            return false;
        };

        // PHASE: RELEASE PREVIOUS
        // WHY: the old panel must be fully writable before the new one is
        // granted Active status.
        if let Some(previous_id) = inner.active.filter(|prev| *prev != id) {
            if let Some(previous) = inner.panel(previous_id) {
                debug!(from = %previous_id, to = %id, "active panel hand-over");
                previous.apply_active(false);
            }
        }

        // PHASE: GRANT
        inner.active = Some(id);
        panel.apply_active(true);
        true
    }

    /// Return `id` to Idle. Returns `false` if `id` is not a live panel.
    pub fn deactivate(&self, id: PanelId) -> bool {
        let mut inner = self.lock();
        if inner.active == Some(id) {
            inner.active = None;
        }
        let Some(panel) = inner.panel(id) else {
            return false;
        };
        panel.apply_active(false);
        true
    }

    #[must_use]
    pub fn active_panel_id(&self) -> Option<PanelId> {
        let mut inner = self.lock();
        inner.prune();
        inner.active
    }

    #[must_use]
    pub fn panel_count(&self) -> usize {
        let mut inner = self.lock();
        inner.prune();
        inner.panels.len()
    }
}

impl std::fmt::Debug for ActiveRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("ActiveRegistry")
            .field("panels", &inner.panels.len())
            .field("active", &inner.active)
            .finish()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
