//! Persisted panel snapshots.
//!
//! Both documents are plain: an active flag plus an ordered list of records,
//! `{node, field, value}` for widget panels and `{node, enabled,
//! disabled_mode}` for node panels. Entry order is display order and must
//! survive a save/load round trip.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collector::entry::TargetRef;
use crate::host::{NodeId, NodeMode};
use crate::services::persistence::{PersistError, Persister};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub node: NodeId,
    pub field: String,
    pub value: Value,
}

impl SnapshotEntry {
    #[must_use]
    pub fn target(&self) -> TargetRef {
        TargetRef::new(self.node, self.field.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelSnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub entries: Vec<SnapshotEntry>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl Default for PanelSnapshot {
    fn default() -> Self {
        Self { version: SNAPSHOT_VERSION, active: false, entries: Vec::new() }
    }
}

impl PanelSnapshot {
    /// Ordered `(node, field, value)` triples.
    #[must_use]
    pub fn triples(&self) -> Vec<(NodeId, &str, &Value)> {
        self.entries
            .iter()
            .map(|e| (e.node, e.field.as_str(), &e.value))
            .collect()
    }

    #[must_use]
    pub fn to_document(&self) -> Value {
        // Every field is a plain JSON type, so this cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// # Errors
    ///
    /// Returns [`PersistError::Decode`] when the document is not a snapshot.
    pub fn from_document(document: Value) -> Result<Self, PersistError> {
        Ok(serde_json::from_value(document)?)
    }
}

// =============================================================================
// NODE PANEL
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshotEntry {
    pub node: NodeId,
    pub enabled: bool,
    pub disabled_mode: NodeMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePanelSnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub active: bool,
    #[serde(default = "default_disabled_mode")]
    pub default_disabled_mode: NodeMode,
    #[serde(default)]
    pub entries: Vec<NodeSnapshotEntry>,
}

fn default_disabled_mode() -> NodeMode {
    NodeMode::Bypass
}

impl Default for NodePanelSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            active: false,
            default_disabled_mode: default_disabled_mode(),
            entries: Vec::new(),
        }
    }
}

impl NodePanelSnapshot {
    #[must_use]
    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// # Errors
    ///
    /// Returns [`PersistError::Decode`] when the document is not a node
    /// panel snapshot (including unknown mode codes).
    pub fn from_document(document: Value) -> Result<Self, PersistError> {
        Ok(serde_json::from_value(document)?)
    }
}

/// Load and decode a snapshot table. `Ok(None)` when it was never saved.
///
/// # Errors
///
/// Returns the store error, or [`PersistError::Decode`] for a malformed
/// document.
pub async fn load_snapshot(persister: &Persister, table: &str) -> Result<Option<PanelSnapshot>, PersistError> {
    persister
        .load(table)
        .await?
        .map(PanelSnapshot::from_document)
        .transpose()
}

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod tests;
