//! Synchronization decision for one entry.
//!
//! DESIGN
//! ======
//! Each check compares three values: the mirror, the target, and the cached
//! value both agreed on last time. Whichever side differs from the cache has
//! changed since the previous check.
//!
//! - read-only entry: the target always flows into the mirror
//! - neither side changed: nothing to do
//! - only the mirror changed: push mirror → target
//! - the target changed: pull target → mirror, even if the mirror changed
//!   too. A direct edit in the graph is never overwritten by a stale panel.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    None,
    /// Write this value into the target through its callback.
    Push(Value),
    /// Show this target value in the mirror and adopt it as the cache.
    Pull(Value),
}

#[must_use]
pub fn decide(read_only: bool, mirror: &Value, cached: &Value, target: &Value) -> SyncAction {
    if read_only {
        if mirror == target && cached == target {
            return SyncAction::None;
        }
        return SyncAction::Pull(target.clone());
    }

    let target_changed = target != cached;
    let mirror_changed = mirror != cached;

    if target_changed {
        SyncAction::Pull(target.clone())
    } else if mirror_changed {
        SyncAction::Push(mirror.clone())
    } else {
        SyncAction::None
    }
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
