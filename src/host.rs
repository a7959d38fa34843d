//! Host graph model — the node/field surface the collector reads and writes.
//!
//! DESIGN
//! ======
//! The host editor owns nodes and their widget values. The collector only
//! needs a handful of capabilities: check a node exists, read a field, write
//! a field through the field's own change callback, and read or switch a
//! node's execution mode. [`Host`] captures exactly that. [`MemoryGraph`] is an in-process implementation used by tests and
//! by embedders that mirror a remote graph locally.
//!
//! TRADE-OFFS
//! ==========
//! `MemoryGraph` releases its lock before invoking a field callback so the
//! callback may re-enter the graph (or a panel mirroring it) without
//! deadlocking. The cost is that a concurrent writer can interleave between
//! the value store and the callback; the last write wins.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorCode;

// =============================================================================
// NODE ID
// =============================================================================

/// Host-assigned node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("field not found: {node}:{field}")]
    FieldNotFound { node: NodeId, field: String },
}

impl ErrorCode for HostError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NodeNotFound(_) => "E_NODE_NOT_FOUND",
            Self::FieldNotFound { .. } => "E_FIELD_NOT_FOUND",
        }
    }
}

// =============================================================================
// NODE MODE
// =============================================================================

/// Execution mode of a whole node, using the host's numeric codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum NodeMode {
    /// Runs normally (0).
    #[default]
    Always,
    /// Skipped, produces no output (2).
    Mute,
    /// Skipped, inputs passed straight through (4).
    Bypass,
}

impl NodeMode {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Always => 0,
            Self::Mute => 2,
            Self::Bypass => 4,
        }
    }
}

impl TryFrom<u8> for NodeMode {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Always),
            2 => Ok(Self::Mute),
            4 => Ok(Self::Bypass),
            other => Err(format!("unsupported node mode {other}")),
        }
    }
}

impl From<NodeMode> for u8 {
    fn from(mode: NodeMode) -> Self {
        mode.code()
    }
}

// =============================================================================
// HOST TRAIT
// =============================================================================

/// The part of the host editor's object model the collector depends on.
pub trait Host: Send + Sync {
    fn node_exists(&self, node: NodeId) -> bool;

    /// Read the current value of `node.field`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the node or the field no longer exists.
    fn read_field(&self, node: NodeId, field: &str) -> Result<Value, HostError>;

    /// Store `value` into `node.field` and invoke the field's change callback,
    /// exactly as a direct edit in the host UI would.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the node or the field no longer exists.
    fn write_field(&self, node: NodeId, field: &str, value: Value) -> Result<(), HostError>;

    /// # Errors
    ///
    /// Returns [`HostError::NodeNotFound`] when the node no longer exists.
    fn node_mode(&self, node: NodeId) -> Result<NodeMode, HostError>;

    /// Switch a whole node between running, muted and bypassed.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::NodeNotFound`] when the node no longer exists.
    fn set_node_mode(&self, node: NodeId, mode: NodeMode) -> Result<(), HostError>;
}

// =============================================================================
// MEMORY GRAPH
// =============================================================================

/// Field change callback. A returned value replaces the stored one, which is
/// how hosts clamp or normalize widget input.
pub type FieldCallback = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

struct FieldSlot {
    value: Value,
    callback: Option<FieldCallback>,
    callback_calls: usize,
}

#[derive(Default)]
struct NodeSlot {
    mode: NodeMode,
    fields: IndexMap<String, FieldSlot>,
}

type Nodes = IndexMap<NodeId, NodeSlot>;

/// In-memory [`Host`] implementation.
#[derive(Clone, Default)]
pub struct MemoryGraph {
    nodes: Arc<Mutex<Nodes>>,
}

impl MemoryGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Nodes> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an empty node. Existing nodes are left untouched.
    pub fn add_node(&self, node: NodeId) {
        self.lock().entry(node).or_default();
    }

    /// Remove a node and all its fields. Returns `false` if it did not exist.
    pub fn remove_node(&self, node: NodeId) -> bool {
        self.lock().shift_remove(&node).is_some()
    }

    /// Set a field directly, bypassing its callback. Models an edit made
    /// elsewhere in the host (graph canvas, another extension).
    pub fn set_field(&self, node: NodeId, field: &str, value: Value) {
        let mut nodes = self.lock();
        let fields = &mut nodes.entry(node).or_default().fields;
        match fields.get_mut(field) {
            Some(slot) => slot.value = value,
            None => {
                fields.insert(field.to_owned(), FieldSlot { value, callback: None, callback_calls: 0 });
            }
        }
    }

    /// Attach a change callback to an existing field.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the node or field does not exist.
    pub fn set_callback(&self, node: NodeId, field: &str, callback: FieldCallback) -> Result<(), HostError> {
        let mut nodes = self.lock();
        let slot = lookup_mut(&mut nodes, node, field)?;
        slot.callback = Some(callback);
        Ok(())
    }

    /// How many times `write_field` has run the field's callback path.
    #[must_use]
    pub fn callback_count(&self, node: NodeId, field: &str) -> usize {
        self.lock()
            .get(&node)
            .and_then(|slot| slot.fields.get(field))
            .map_or(0, |slot| slot.callback_calls)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.lock().len()
    }
}

fn lookup_mut<'a>(nodes: &'a mut Nodes, node: NodeId, field: &str) -> Result<&'a mut FieldSlot, HostError> {
    let slot = nodes.get_mut(&node).ok_or(HostError::NodeNotFound(node))?;
    slot.fields
        .get_mut(field)
        .ok_or_else(|| HostError::FieldNotFound { node, field: field.to_owned() })
}

impl Host for MemoryGraph {
    fn node_exists(&self, node: NodeId) -> bool {
        self.lock().contains_key(&node)
    }

    fn read_field(&self, node: NodeId, field: &str) -> Result<Value, HostError> {
        let nodes = self.lock();
        let slot = nodes.get(&node).ok_or(HostError::NodeNotFound(node))?;
        slot.fields
            .get(field)
            .map(|slot| slot.value.clone())
            .ok_or_else(|| HostError::FieldNotFound { node, field: field.to_owned() })
    }

    fn write_field(&self, node: NodeId, field: &str, value: Value) -> Result<(), HostError> {
        // PHASE: STORE VALUE
        // WHY: callback runs unlocked so it can re-enter the graph.
        let callback = {
            let mut nodes = self.lock();
            let slot = lookup_mut(&mut nodes, node, field)?;
            slot.value = value.clone();
            slot.callback_calls += 1;
            slot.callback.clone()
        };

        // PHASE: RUN CALLBACK + APPLY NORMALIZED VALUE
        let Some(callback) = callback else {
            return Ok(());
        };
        if let Some(normalized) = callback(&value) {
            let mut nodes = self.lock();
            // EDGE: the callback may have removed its own node.
            if let Ok(slot) = lookup_mut(&mut nodes, node, field) {
                slot.value = normalized;
            }
        }
        Ok(())
    }

    fn node_mode(&self, node: NodeId) -> Result<NodeMode, HostError> {
        self.lock()
            .get(&node)
            .map(|slot| slot.mode)
            .ok_or(HostError::NodeNotFound(node))
    }

    fn set_node_mode(&self, node: NodeId, mode: NodeMode) -> Result<(), HostError> {
        let mut nodes = self.lock();
        let slot = nodes.get_mut(&node).ok_or(HostError::NodeNotFound(node))?;
        slot.mode = mode;
        Ok(())
    }
}

#[cfg(test)]
#[path = "host_test.rs"]
mod tests;
