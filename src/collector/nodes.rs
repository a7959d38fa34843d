//! Node collector — whole nodes mirrored as enable toggles.
//!
//! DESIGN
//! ======
//! Each entry is one host node shown as an on/off switch. On means the node
//! runs normally; off puts it in its disabled mode, Mute or Bypass. Every
//! entry carries its own disabled mode, seeded from the panel default and
//! rewritten when the default changes. Removing an entry, or disposing the
//! panel, puts the node back to running.
//!
//! Active mode and persistence follow the widget panel: one registry decides
//! which panel is Active, an Active panel's toggles are read-only, and every
//! change saves a [`NodePanelSnapshot`].
//!
//! TRADE-OFFS
//! ==========
//! The host's node mode is written, never polled. A node whose mode is
//! changed elsewhere keeps that mode until its toggle is flipped again.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::collector::entry::{Reorder, move_in};
use crate::collector::panel::PanelId;
use crate::collector::registry::{ActiveMember, ActiveRegistry};
use crate::collector::snapshot::{NodePanelSnapshot, NodeSnapshotEntry, SNAPSHOT_VERSION};
use crate::error::ErrorCode;
use crate::host::{Host, NodeId, NodeMode};
use crate::services::notify::Notice;
use crate::services::persistence::Persister;

pub const DEFAULT_DISABLED_MODE: NodeMode = NodeMode::Bypass;

#[derive(Clone, Default)]
pub struct NodePanelOptions {
    persister: Option<Persister>,
    table: Option<String>,
    default_disabled_mode: Option<NodeMode>,
}

impl NodePanelOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_persister(mut self, persister: Persister) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Side-table name for snapshots. Defaults to `node-collector-{panel id}`.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Mode used for toggled-off nodes. Defaults to Bypass.
    #[must_use]
    pub fn with_default_disabled_mode(mut self, mode: NodeMode) -> Self {
        self.default_disabled_mode = Some(mode);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeToggle {
    enabled: bool,
    disabled_mode: NodeMode,
}

impl NodeToggle {
    fn mode(self) -> NodeMode {
        if self.enabled { NodeMode::Always } else { self.disabled_mode }
    }
}

pub(crate) struct NodePanelInner {
    id: PanelId,
    host: Arc<dyn Host>,
    registry: ActiveRegistry,
    persister: Option<Persister>,
    table: String,
    state: Mutex<NodePanelState>,
}

struct NodePanelState {
    active: bool,
    disposed: bool,
    default_disabled_mode: NodeMode,
    entries: IndexMap<NodeId, NodeToggle>,
}

impl NodePanelInner {
    fn lock(&self) -> MutexGuard<'_, NodePanelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cheap-to-clone handle; all clones share one panel.
#[derive(Clone)]
pub struct NodePanel {
    inner: Arc<NodePanelInner>,
}

impl NodePanel {
    pub fn new(host: Arc<dyn Host>, registry: &ActiveRegistry, options: NodePanelOptions) -> Self {
        let id = PanelId::new();
        let table = options.table.unwrap_or_else(|| format!("node-collector-{id}"));
        let inner = Arc::new(NodePanelInner {
            id,
            host,
            registry: registry.clone(),
            persister: options.persister,
            table,
            state: Mutex::new(NodePanelState {
                active: false,
                disposed: false,
                default_disabled_mode: options.default_disabled_mode.unwrap_or(DEFAULT_DISABLED_MODE),
                entries: IndexMap::new(),
            }),
        });
        let member: Weak<dyn ActiveMember> = Arc::downgrade(&inner) as Weak<_>;
        registry.register(id, member);
        debug!(panel = %id, "node panel created");
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

    /// Collected nodes in display order.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeId> {
        self.inner.lock().entries.keys().copied().collect()
    }

    #[must_use]
    pub fn is_enabled(&self, node: NodeId) -> Option<bool> {
        self.inner.lock().entries.get(&node).map(|t| t.enabled)
    }

    #[must_use]
    pub fn disabled_mode(&self, node: NodeId) -> Option<NodeMode> {
        self.inner.lock().entries.get(&node).map(|t| t.disabled_mode)
    }

    #[must_use]
    pub fn default_disabled_mode(&self) -> NodeMode {
        self.inner.lock().default_disabled_mode
    }

    /// Toggles are read-only exactly while the panel is Active.
    #[must_use]
    pub fn is_read_only(&self, node: NodeId) -> Option<bool> {
        let state = self.inner.lock();
        state.entries.contains_key(&node).then_some(state.active)
    }

    // =========================================================================
    // ENTRY LIFECYCLE
    // =========================================================================

    /// Collect `node` as a toggle. `enabled` defaults to on and
    /// `disabled_mode` to the panel default. The node's mode is applied
    /// right away unless the panel is Active. Returns `false` for a
    /// duplicate or a node that does not exist.
    pub fn add_node(&self, node: NodeId, enabled: Option<bool>, disabled_mode: Option<NodeMode>) -> bool {
        self.prune();
        let added = self.insert_node(node, enabled, disabled_mode);
        if added {
            self.persist();
        }
        added
    }

    fn insert_node(&self, node: NodeId, enabled: Option<bool>, disabled_mode: Option<NodeMode>) -> bool {
        if !self.inner.host.node_exists(node) {
            debug!(panel = %self.id(), %node, "node missing; not collected");
            return false;
        }
        let (toggle, apply) = {
            let mut state = self.inner.lock();
            if state.disposed || state.entries.contains_key(&node) {
                return false;
            }
            let toggle = NodeToggle {
                enabled: enabled.unwrap_or(true),
                disabled_mode: disabled_mode.unwrap_or(state.default_disabled_mode),
            };
            state.entries.insert(node, toggle);
            (toggle, !state.active)
        };
        debug!(panel = %self.id(), %node, enabled = toggle.enabled, "node collected");
        if apply {
            self.apply_mode(node, toggle.mode());
        }
        true
    }

    /// Drop the node's toggle and return the node to normal running.
    pub fn remove_node(&self, node: NodeId) -> bool {
        let removed = self.detach(node);
        if removed {
            self.persist();
        }
        removed
    }

    pub fn clear_all(&self) {
        let mut removed = 0usize;
        for node in self.nodes() {
            if self.detach(node) {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(panel = %self.id(), removed, "node panel cleared");
            self.persist();
        }
    }

    /// Drop toggles whose node the host has deleted. Returns how many.
    pub fn prune(&self) -> usize {
        let gone: Vec<NodeId> = self
            .nodes()
            .into_iter()
            .filter(|node| !self.inner.host.node_exists(*node))
            .collect();
        let pruned = {
            let mut state = self.inner.lock();
            gone.iter().filter(|node| state.entries.shift_remove(*node).is_some()).count()
        };
        if pruned > 0 {
            debug!(panel = %self.id(), pruned, "deleted nodes pruned");
            self.persist();
        }
        pruned
    }

    /// Return every collected node to normal running and drop all toggles.
    /// The panel ignores further adds.
    pub fn dispose(&self) {
        self.inner.registry.unregister(self.id());
        let entries = {
            let mut state = self.inner.lock();
            state.disposed = true;
            state.active = false;
            std::mem::take(&mut state.entries)
        };
        for node in entries.keys() {
            self.apply_mode(*node, NodeMode::Always);
        }
        debug!(panel = %self.id(), entries = entries.len(), "node panel disposed");
    }

    fn detach(&self, node: NodeId) -> bool {
        if self.inner.lock().entries.shift_remove(&node).is_none() {
            return false;
        }
        self.apply_mode(node, NodeMode::Always);
        debug!(panel = %self.id(), %node, "node released");
        true
    }

    pub fn move_node(&self, node: NodeId, to: usize) -> bool {
        let moved = move_in(&mut self.inner.lock().entries, &node, to);
        if moved {
            self.persist();
        }
        moved
    }

    pub fn reorder(&self, node: NodeId, direction: Reorder) -> bool {
        let destination = {
            let state = self.inner.lock();
            let Some(from) = state.entries.get_index_of(&node) else {
                return false;
            };
            direction.destination(from, state.entries.len())
        };
        self.move_node(node, destination)
    }

    // =========================================================================
    // TOGGLES + MODES
    // =========================================================================

    /// A user flip of the node's toggle. Refused while the panel is Active.
    pub fn set_enabled(&self, node: NodeId, enabled: bool) -> bool {
        let mode = {
            let mut state = self.inner.lock();
            if state.active {
                debug!(panel = %self.id(), %node, "panel is active; toggle refused");
                return false;
            }
            let Some(toggle) = state.entries.get_mut(&node) else {
                return false;
            };
            toggle.enabled = enabled;
            toggle.mode()
        };
        self.apply_mode(node, mode);
        self.persist();
        true
    }

    /// Change the panel default and every toggle's disabled mode. Nodes that
    /// are currently off switch to the new mode unless the panel is Active.
    pub fn set_default_disabled_mode(&self, mode: NodeMode) {
        let reapply: Vec<NodeId> = {
            let mut state = self.inner.lock();
            state.default_disabled_mode = mode;
            for toggle in state.entries.values_mut() {
                toggle.disabled_mode = mode;
            }
            if state.active {
                Vec::new()
            } else {
                state
                    .entries
                    .iter()
                    .filter(|(_, toggle)| !toggle.enabled)
                    .map(|(node, _)| *node)
                    .collect()
            }
        };
        for node in reapply {
            self.apply_mode(node, mode);
        }
        info!(panel = %self.id(), mode = mode.code(), "default disabled mode changed");
        self.persist();
    }

    fn apply_mode(&self, node: NodeId, mode: NodeMode) {
        if let Err(e) = self.inner.host.set_node_mode(node, mode) {
            warn!(panel = %self.id(), %node, error = %e, code = e.error_code(), "node mode not applied");
        }
    }

    // =========================================================================
    // MODE
    // =========================================================================

    pub fn set_active(&self, active: bool) {
        if active {
            self.inner.registry.activate(self.id());
        } else {
            self.inner.registry.deactivate(self.id());
        }
    }

    fn apply_active(&self, active: bool) {
        {
            let mut state = self.inner.lock();
            if state.disposed || state.active == active {
                return;
            }
            state.active = active;
        }
        info!(panel = %self.id(), active, "node panel mode changed");
        self.persist();
    }

    // =========================================================================
    // SNAPSHOT / RESTORE
    // =========================================================================

    #[must_use]
    pub fn snapshot(&self) -> NodePanelSnapshot {
        let state = self.inner.lock();
        NodePanelSnapshot {
            version: SNAPSHOT_VERSION,
            active: state.active,
            default_disabled_mode: state.default_disabled_mode,
            entries: state
                .entries
                .iter()
                .map(|(node, toggle)| NodeSnapshotEntry {
                    node: *node,
                    enabled: toggle.enabled,
                    disabled_mode: toggle.disabled_mode,
                })
                .collect(),
        }
    }

    /// Rebuild toggles from `snapshot`, dropping nodes that no longer exist.
    /// Saved modes are applied to the host before the Active flag. Returns
    /// the number of toggles restored.
    pub fn restore(&self, snapshot: &NodePanelSnapshot) -> usize {
        self.inner.lock().default_disabled_mode = snapshot.default_disabled_mode;

        let mut restored = 0usize;
        let mut gone = 0usize;
        for item in &snapshot.entries {
            if !self.inner.host.node_exists(item.node) {
                gone += 1;
                continue;
            }
            if self.insert_node(item.node, Some(item.enabled), Some(item.disabled_mode)) {
                restored += 1;
            }
        }

        info!(panel = %self.id(), restored, saved = snapshot.entries.len(), "node panel restored");
        if gone > 0 {
            if let Some(persister) = &self.inner.persister {
                persister
                    .notifier()
                    .notify(Notice::warning("Collector restored partially", format!("{gone} node(s) no longer exist")));
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

impl ActiveMember for NodePanelInner {
    fn apply_active(self: Arc<Self>, active: bool) {
        NodePanel { inner: self }.apply_active(active);
    }
}

impl fmt::Debug for NodePanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("NodePanel")
            .field("id", &self.inner.id)
            .field("table", &self.inner.table)
            .field("active", &state.active)
            .field("entries", &state.entries.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "nodes_test.rs"]
mod tests;
