//! Collection entries: target reference, mirror control, sync phase,
//! display-order moves.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::host::NodeId;
use crate::services::task::PeriodicTask;

/// One (node, field) pair in the host graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    pub node: NodeId,
    pub field: String,
}

impl TargetRef {
    pub fn new(node: impl Into<NodeId>, field: impl Into<String>) -> Self {
        Self { node: node.into(), field: field.into() }
    }

    /// Stable entry key, `"{node}:{field}"`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.node, self.field)
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.field)
    }
}

/// The panel-side copy of a target's value.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorControl {
    value: Value,
    read_only: bool,
}

impl MirrorControl {
    pub(crate) fn new(value: Value, read_only: bool) -> Self {
        Self { value, read_only }
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// A user edit. Refused while read-only.
    pub(crate) fn edit(&mut self, value: Value) -> bool {
        if self.read_only {
            return false;
        }
        self.value = value;
        true
    }

    /// Programmatic refresh from the target; ignores read-only.
    pub(crate) fn display(&mut self, value: Value) {
        self.value = value;
    }
}

/// What the entry's synchronization is doing right now.
///
/// A check that finds an entry outside `Idle` is skipped, which is what
/// stops a push from echoing back through the target's callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
    #[default]
    Idle,
    PushingToTarget,
    PullingFromTarget,
}

pub(crate) struct Entry {
    pub(crate) target: TargetRef,
    pub(crate) mirror: MirrorControl,
    /// Value both sides agreed on at the last completed sync.
    pub(crate) cached: Value,
    pub(crate) phase: SyncPhase,
    pub(crate) task: Option<PeriodicTask>,
}

impl Entry {
    pub(crate) fn new(target: TargetRef, seed: Value, read_only: bool) -> Self {
        Self {
            target,
            mirror: MirrorControl::new(seed.clone(), read_only),
            cached: seed,
            phase: SyncPhase::Idle,
            task: None,
        }
    }

    pub(crate) fn has_live_task(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

/// A display-order move offered by a panel's reorder menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reorder {
    Up,
    Down,
    Top,
    Bottom,
}

impl Reorder {
    /// Index an entry at `from` ends up at in a list of `len`.
    #[must_use]
    pub fn destination(self, from: usize, len: usize) -> usize {
        let last = len.saturating_sub(1);
        match self {
            Self::Up => from.saturating_sub(1),
            Self::Down => (from + 1).min(last),
            Self::Top => 0,
            Self::Bottom => last,
        }
    }
}

/// Move `key` to `to` (clamped to the last slot). Returns `false` when the
/// key is absent or already there.
pub(crate) fn move_in<K, V, Q>(map: &mut IndexMap<K, V>, key: &Q, to: usize) -> bool
where
    K: Hash + Eq + Borrow<Q>,
    Q: Hash + Eq + ?Sized,
{
    let Some(from) = map.get_index_of(key) else {
        return false;
    };
    let to = to.min(map.len().saturating_sub(1));
    if from == to {
        return false;
    }
    map.move_index(from, to);
    true
}
