//! Supporting services used by the collector and feature modules.
//!
//! ARCHITECTURE
//! ============
//! Services own the side concerns (polling, persistence, notices) so the
//! collector state machine stays focused on entry lifecycle and sync.

pub mod notify;
pub mod persistence;
pub mod tags;
pub mod task;
pub mod theme;
