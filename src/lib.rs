//! Graph collector — mirror panels for node-graph editor extensions.
//!
//! SYSTEM CONTEXT
//! ==============
//! A collector panel gathers widgets scattered across a host node graph and
//! shows a mirror of each one in a single place. Edits on a mirror are
//! pushed to the host through the widget's own callback; changes made in
//! the host are pulled back into the mirror. One panel per registry may be
//! Active, which freezes its mirrors into read-only views. Node panels
//! collect whole nodes as enable toggles that mute or bypass them.
//!
//! The host is reached only through the [`host::Host`] trait. Panel layouts
//! and tags are stored as JSON side-tables through
//! [`services::persistence::SideTableStore`], served over HTTP by the
//! `sidetable-server` binary.

pub mod collector;
pub mod config;
pub mod error;
pub mod host;
pub mod routes;
pub mod services;
pub mod state;

pub use collector::{ActiveRegistry, NodePanel, Panel, PanelOptions, PanelSnapshot, Reorder, SyncOutcome, TargetRef};
pub use host::{Host, HostError, MemoryGraph, NodeId, NodeMode};
