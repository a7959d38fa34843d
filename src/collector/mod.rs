//! Collector — panels that mirror host widgets.
//!
//! ARCHITECTURE
//! ============
//! - `entry`: target refs, mirror controls, per-entry sync phase
//! - `sync`: the pure push/pull decision
//! - `panel`: entry lifecycle, polling, Active mode, snapshot/restore
//! - `nodes`: whole nodes as enable toggles (mute / bypass)
//! - `registry`: the single-Active-panel rule
//! - `snapshot`: the persisted document

pub mod entry;
pub mod nodes;
pub mod panel;
pub mod registry;
pub mod snapshot;
pub mod sync;

pub use entry::{MirrorControl, Reorder, SyncPhase, TargetRef};
pub use nodes::{NodePanel, NodePanelOptions};
pub use panel::{MirrorListener, Panel, PanelId, PanelOptions, SyncOutcome};
pub use registry::ActiveRegistry;
pub use snapshot::{NodePanelSnapshot, NodeSnapshotEntry, PanelSnapshot, SnapshotEntry, load_snapshot};
pub use sync::{SyncAction, decide};
