//! Collector panel — mirrors of host widgets kept in sync with their targets.
//!
//! DESIGN
//! ======
//! A panel owns an ordered map `"{node}:{field}"` → [`Entry`]; insertion
//! order is display order. Each entry polls its target (the host has no
//! change hook) and reconciles mirror and target with [`decide`]. Pushes go
//! through [`Host::write_field`] so the target's own callback always runs.
//!
//! LOCKING
//! =======
//! Panel state sits behind a `std::sync::Mutex` that is never held across a
//! host call or a mirror-listener call. Either may re-enter the panel; the
//! entry's [`SyncPhase`] is what turns those re-entries into no-ops.
//!
//! ERROR HANDLING
//! ==============
//! Nothing here fails loudly. A target that cannot be read or written drops
//! its entry; duplicate adds and removals of missing keys are ignored.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::collector::entry::{Entry, Reorder, SyncPhase, TargetRef, move_in};
use crate::collector::registry::{ActiveMember, ActiveRegistry};
use crate::collector::snapshot::{PanelSnapshot, SNAPSHOT_VERSION, SnapshotEntry};
use crate::collector::sync::{SyncAction, decide};
use crate::host::Host;
use crate::services::notify::Notice;
use crate::services::persistence::Persister;
use crate::services::task::{PeriodicTask, SyncSchedule};

// =============================================================================
// IDS + OPTIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PanelId(Uuid);

impl PanelId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Called with `(key, value)` whenever a mirror's shown value changes for a
/// reason other than a user edit. UI layers re-render from it.
pub type MirrorListener = Arc<dyn Fn(&str, &Value) + Send + Sync>;

#[derive(Clone, Default)]
pub struct PanelOptions {
    schedule: SyncSchedule,
    persister: Option<Persister>,
    table: Option<String>,
    listener: Option<MirrorListener>,
}

impl PanelOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_schedule(mut self, schedule: SyncSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Save a snapshot through `persister` after every structural change.
    #[must_use]
    pub fn with_persister(mut self, persister: Persister) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Side-table name for snapshots. Defaults to `collector-{panel id}`.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    pub fn with_mirror_listener(mut self, listener: MirrorListener) -> Self {
        self.listener = Some(listener);
        self
    }
}

/// Result of one synchronization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Unchanged,
    Pushed,
    Pulled,
    /// The entry was mid-sync; this check was a re-entry.
    Skipped,
    /// The target is gone; the entry was dropped.
    Removed,
    /// No entry under that key.
    Missing,
}

// =============================================================================
// PANEL
// =============================================================================

pub(crate) struct PanelInner {
    id: PanelId,
    host: Arc<dyn Host>,
    registry: ActiveRegistry,
    schedule: SyncSchedule,
    persister: Option<Persister>,
    table: String,
    listener: Option<MirrorListener>,
    state: Mutex<PanelState>,
}

#[derive(Default)]
struct PanelState {
    active: bool,
    disposed: bool,
    entries: IndexMap<String, Entry>,
}

impl PanelInner {
    fn lock(&self) -> MutexGuard<'_, PanelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cheap-to-clone handle; all clones share one panel.
#[derive(Clone)]
pub struct Panel {
    inner: Arc<PanelInner>,
}

enum Step {
    Done(SyncOutcome),
    Push(Value),
    /// The mirror now shows a new target value.
    Pulled(Value),
}

impl Panel {
    pub fn new(host: Arc<dyn Host>, registry: &ActiveRegistry, options: PanelOptions) -> Self {
        let id = PanelId::new();
        let table = options.table.unwrap_or_else(|| format!("collector-{id}"));
        let inner = Arc::new(PanelInner {
            id,
            host,
            registry: registry.clone(),
            schedule: options.schedule,
            persister: options.persister,
            table,
            listener: options.listener,
            state: Mutex::new(PanelState::default()),
        });
        let member: Weak<dyn ActiveMember> = Arc::downgrade(&inner) as Weak<_>;
        registry.register(id, member);
        debug!(panel = %id, schedule = ?inner.schedule, "panel created");
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<PanelInner>) -> Self {
        Self { inner }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn id(&self) -> PanelId {
        self.inner.id
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.inner.table
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Entry keys in display order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().entries.keys().cloned().collect()
    }

    #[must_use]
    pub fn target(&self, key: &str) -> Option<TargetRef> {
        self.inner.lock().entries.get(key).map(|e| e.target.clone())
    }

    #[must_use]
    pub fn mirror_value(&self, key: &str) -> Option<Value> {
        self.inner.lock().entries.get(key).map(|e| e.mirror.value().clone())
    }

    #[must_use]
    pub fn is_read_only(&self, key: &str) -> Option<bool> {
        self.inner.lock().entries.get(key).map(|e| e.mirror.is_read_only())
    }

    #[must_use]
    pub fn sync_phase(&self, key: &str) -> Option<SyncPhase> {
        self.inner.lock().entries.get(key).map(|e| e.phase)
    }

    /// Number of entries with a live polling task.
    #[must_use]
    pub fn scheduled_task_count(&self) -> usize {
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| e.has_live_task())
            .count()
    }

    // =========================================================================
    // ENTRY LIFECYCLE
    // =========================================================================

    /// Mirror `target` in this panel, seeded with `initial` or the target's
    /// current value. Returns `false` for a duplicate or unreadable target.
    pub fn add_entry(&self, target: TargetRef, initial: Option<Value>) -> bool {
        let added = self.insert_entry(target, initial);
        if added {
            self.persist();
        }
        added
    }

    /// Remove an entry and cancel its polling. Returns `false` if absent.
    pub fn remove_entry(&self, key: &str) -> bool {
        let removed = self.detach(key);
        if removed {
            self.persist();
        }
        removed
    }

    /// Remove every entry, in display order.
    pub fn clear_all(&self) {
        let mut removed = 0usize;
        for key in self.keys() {
            if self.detach(&key) {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(panel = %self.id(), removed, "panel cleared");
            self.persist();
        }
    }

    /// Cancel all polling, drop all entries, release Active status. The
    /// panel ignores further adds.
    pub fn dispose(&self) {
        self.inner.registry.unregister(self.id());
        let entries = {
            let mut state = self.inner.lock();
            state.disposed = true;
            state.active = false;
            std::mem::take(&mut state.entries)
        };
        debug!(panel = %self.id(), entries = entries.len(), "panel disposed");
        // Dropping the entries aborts their polling tasks.
        drop(entries);
    }

    fn insert_entry(&self, target: TargetRef, initial: Option<Value>) -> bool {
        let key = target.key();
        let current = match self.inner.host.read_field(target.node, &target.field) {
            Ok(value) => value,
            Err(e) => {
                debug!(panel = %self.id(), %key, error = %e, "target unavailable; entry not added");
                return false;
            }
        };

        let mut state = self.inner.lock();
        if state.disposed || state.entries.contains_key(&key) {
            debug!(panel = %self.id(), %key, "duplicate or disposed; entry not added");
            return false;
        }

        let mut entry = Entry::new(target, initial.unwrap_or(current), state.active);
        entry.task = self.schedule_sync(&key);
        state.entries.insert(key.clone(), entry);
        debug!(panel = %self.id(), %key, "entry added");
        true
    }

    fn schedule_sync(&self, key: &str) -> Option<PeriodicTask> {
        let SyncSchedule::Every(period) = self.inner.schedule else {
            return None;
        };
        let panel = Arc::downgrade(&self.inner);
        let key = key.to_owned();
        PeriodicTask::spawn("collector-sync", period, move || {
            let Some(inner) = panel.upgrade() else {
                return ControlFlow::Break(());
            };
            match Panel::from_inner(inner).sync_entry(&key) {
                SyncOutcome::Removed | SyncOutcome::Missing => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        })
    }

    fn detach(&self, key: &str) -> bool {
        let entry = self.inner.lock().entries.shift_remove(key);
        let Some(entry) = entry else {
            return false;
        };
        if let Some(task) = &entry.task {
            task.cancel();
        }
        debug!(panel = %self.id(), key, "entry removed");
        true
    }

    /// Move an entry to display position `to` (clamped to the end).
    /// Returns `false` if the key is absent or already there.
    pub fn move_entry(&self, key: &str, to: usize) -> bool {
        let moved = move_in(&mut self.inner.lock().entries, key, to);
        if moved {
            debug!(panel = %self.id(), key, to, "entry moved");
            self.persist();
        }
        moved
    }

    /// Menu-style move: up, down, top or bottom.
    pub fn reorder(&self, key: &str, direction: Reorder) -> bool {
        let destination = {
            let state = self.inner.lock();
            let Some(from) = state.entries.get_index_of(key) else {
                return false;
            };
            direction.destination(from, state.entries.len())
        };
        self.move_entry(key, destination)
    }

    // =========================================================================
    // MODE
    // =========================================================================

    /// Toggle Active mode. Turning on first returns whichever panel was
    /// Active to Idle.
    pub fn set_active(&self, active: bool) {
        if active {
            self.inner.registry.activate(self.id());
        } else {
            self.inner.registry.deactivate(self.id());
        }
    }

    /// Registry-side half of [`Panel::set_active`].
    pub(crate) fn apply_active(&self, active: bool) {
        {
            let mut state = self.inner.lock();
            if state.disposed {
                return;
            }
            if state.active == active {
                return;
            }
            state.active = active;
            for entry in state.entries.values_mut() {
                entry.mirror.set_read_only(active);
            }
        }
        info!(panel = %self.id(), active, "panel mode changed");
        self.persist();
    }

    // =========================================================================
    // SYNCHRONIZATION
    // =========================================================================

    /// A user edit on a mirror. Refused (target untouched) while the entry
    /// is read-only; otherwise the entry is synchronized immediately.
    ///
    /// Returns `true` if the edit stands: pushed, already equal to the
    /// target, or queued behind a push in flight. `false` if it was refused,
    /// overruled by a target change, or its target is gone.
    pub fn edit_mirror(&self, key: &str, value: Value) -> bool {
        {
            let mut state = self.inner.lock();
            let Some(entry) = state.entries.get_mut(key) else {
                return false;
            };
            if entry.phase == SyncPhase::PullingFromTarget {
                // The UI echoing a value we just showed it.
                return false;
            }
            if !entry.mirror.edit(value) {
                debug!(panel = %self.id(), key, "mirror is read-only; edit refused");
                return false;
            }
        }
        matches!(
            self.sync_entry(key),
            SyncOutcome::Pushed | SyncOutcome::Unchanged | SyncOutcome::Skipped
        )
    }

    /// Run every entry's synchronization check once.
    pub fn sync_all(&self) {
        for key in self.keys() {
            self.sync_entry(&key);
        }
    }

    /// One synchronization check for `key`.
    pub fn sync_entry(&self, key: &str) -> SyncOutcome {
        // PHASE: RESOLVE TARGET
        let target = {
            let state = self.inner.lock();
            let Some(entry) = state.entries.get(key) else {
                return SyncOutcome::Missing;
            };
            if entry.phase != SyncPhase::Idle {
                return SyncOutcome::Skipped;
            }
            entry.target.clone()
        };

        let current = match self.inner.host.read_field(target.node, &target.field) {
            Ok(value) => value,
            Err(e) => return self.drop_stale(key, &e),
        };

        // PHASE: DECIDE
        let step = {
            let mut state = self.inner.lock();
            let Some(entry) = state.entries.get_mut(key) else {
                return SyncOutcome::Missing;
            };
            if entry.phase != SyncPhase::Idle {
                return SyncOutcome::Skipped;
            }
            match decide(entry.mirror.is_read_only(), entry.mirror.value(), &entry.cached, &current) {
                SyncAction::None => Step::Done(SyncOutcome::Unchanged),
                SyncAction::Pull(value) => {
                    let shown_changed = entry.mirror.value() != &value;
                    entry.mirror.display(value.clone());
                    entry.cached = value.clone();
                    if !shown_changed {
                        Step::Done(SyncOutcome::Pulled)
                    } else {
                        if self.inner.listener.is_some() {
                            entry.phase = SyncPhase::PullingFromTarget;
                        }
                        Step::Pulled(value)
                    }
                }
                SyncAction::Push(value) => {
                    entry.phase = SyncPhase::PushingToTarget;
                    Step::Push(value)
                }
            }
        };

        match step {
            Step::Done(outcome) => outcome,
            Step::Pulled(value) => {
                if self.inner.listener.is_some() {
                    self.announce(key, &value);
                    self.finish_phase(key);
                }
                self.persist();
                SyncOutcome::Pulled
            }
            Step::Push(value) => self.push(key, &target, value),
        }
    }

    fn push(&self, key: &str, target: &TargetRef, value: Value) -> SyncOutcome {
        // PHASE: WRITE THROUGH HOST CALLBACK
        // WHY: unlocked, so a callback that re-enters the panel sees
        // `PushingToTarget` and skips instead of deadlocking or echoing.
        let host = &self.inner.host;
        let settled = host
            .write_field(target.node, &target.field, value.clone())
            .and_then(|()| host.read_field(target.node, &target.field));

        // PHASE: ADOPT SETTLED VALUE
        let normalized = {
            let mut state = self.inner.lock();
            let Some(entry) = state.entries.get_mut(key) else {
                return SyncOutcome::Missing;
            };
            entry.phase = SyncPhase::Idle;
            let settled = match settled {
                Ok(settled) => settled,
                Err(e) => {
                    drop(state);
                    return self.drop_stale(key, &e);
                }
            };
            // EDGE: a user edit that landed mid-push stays in the mirror and
            // is pushed by the next check.
            let normalized = entry.mirror.value() == &value && settled != value;
            if entry.mirror.value() == &value {
                entry.mirror.display(settled.clone());
            }
            entry.cached = settled.clone();
            normalized.then_some(settled)
        };

        debug!(panel = %self.id(), key, "mirror pushed to target");
        if let Some(settled) = normalized {
            self.announce(key, &settled);
        }
        self.persist();
        SyncOutcome::Pushed
    }

    fn announce(&self, key: &str, value: &Value) {
        if let Some(listener) = &self.inner.listener {
            listener(key, value);
        }
    }

    fn finish_phase(&self, key: &str) {
        if let Some(entry) = self.inner.lock().entries.get_mut(key) {
            entry.phase = SyncPhase::Idle;
        }
    }

    fn drop_stale(&self, key: &str, error: &crate::host::HostError) -> SyncOutcome {
        debug!(panel = %self.id(), key, %error, "target gone; dropping entry");
        if self.detach(key) {
            self.persist();
        }
        SyncOutcome::Removed
    }

    // =========================================================================
    // SNAPSHOT / RESTORE
    // =========================================================================

    #[must_use]
    pub fn snapshot(&self) -> PanelSnapshot {
        let state = self.inner.lock();
        PanelSnapshot {
            version: SNAPSHOT_VERSION,
            active: state.active,
            entries: state
                .entries
                .values()
                .map(|e| SnapshotEntry {
                    node: e.target.node,
                    field: e.target.field.clone(),
                    value: e.mirror.value().clone(),
                })
                .collect(),
        }
    }

    /// Rebuild entries from `snapshot`, dropping those whose node is gone.
    /// The Active flag is applied only after every entry exists. Returns the
    /// number of entries restored.
    pub fn restore(&self, snapshot: &PanelSnapshot) -> usize {
        let mut restored = 0usize;
        let mut gone = 0usize;
        for item in &snapshot.entries {
            if !self.inner.host.node_exists(item.node) {
                debug!(panel = %self.id(), node = %item.node, field = %item.field, "restore: node gone; dropped");
                gone += 1;
                continue;
            }
            let target = item.target();
            let key = target.key();
            // The saved value seeds both mirror and baseline. A key already
            // present (live entry, or repeated in the snapshot) keeps its state.
            if self.insert_entry(target, Some(item.value.clone())) {
                restored += 1;
            } else if !self.inner.lock().entries.contains_key(&key) {
                gone += 1;
            }
        }

        info!(panel = %self.id(), restored, saved = snapshot.entries.len(), "panel restored");
        if gone > 0 {
            if let Some(persister) = &self.inner.persister {
                persister
                    .notifier()
                    .notify(Notice::warning("Collector restored partially", format!("{gone} widget(s) no longer exist")));
            }
        }
        if snapshot.active {
            self.set_active(true);
        } else {
            self.persist();
        }
        restored
    }

    fn persist(&self) {
        let Some(persister) = &self.inner.persister else {
            return;
        };
        persister.save(self.inner.table.clone(), self.snapshot().to_document());
    }
}

impl ActiveMember for PanelInner {
    fn apply_active(self: Arc<Self>, active: bool) {
        Panel::from_inner(self).apply_active(active);
    }
}

impl fmt::Debug for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("Panel")
            .field("id", &self.inner.id)
            .field("table", &self.inner.table)
            .field("active", &state.active)
            .field("entries", &state.entries.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "panel_test.rs"]
mod tests;
