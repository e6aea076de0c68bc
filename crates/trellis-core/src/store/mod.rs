//! Persistent store seam
//!
//! The core reads the pre-transaction state only through `StoreSnapshot`.
//! `MemoryStore` is the in-process multi-version implementation used by
//! `Database`; writes reach it only at commit time through a `CommitBatch`.

pub mod memory;

pub use memory::{CommitBatch, CommitEntry, MemorySnapshot, MemoryStore};

use trellis_core_types::EntityId;

use crate::model::{EntityVersion, PropertyValue};

/// Point-in-time read view of the persistent store
///
/// A snapshot is owned by exactly one changes tracker and released exactly
/// once through `abort`.
pub trait StoreSnapshot: Send {
    /// Commit sequence number this view was taken at
    fn as_of(&self) -> u64;

    /// Current visible version of a live entity, `None` if absent or removed
    fn entity(&self, id: &EntityId) -> Option<EntityVersion>;

    /// Committed property value
    fn property(&self, id: &EntityId, name: &str) -> Option<PropertyValue> {
        self.entity(id)
            .and_then(|v| v.properties.get(name).cloned())
    }

    /// Committed link targets in stored order
    fn links(&self, id: &EntityId, link_name: &str) -> Vec<EntityId> {
        self.entity(id)
            .map(|v| v.links(link_name).to_vec())
            .unwrap_or_default()
    }

    /// Live entities of `source_type` whose committed `link_name` contains `target`
    fn incoming(&self, target: &EntityId, source_type: &str, link_name: &str) -> Vec<EntityId>;

    /// Prior visible versions of an entity, newest first
    fn history(&self, id: &EntityId) -> Vec<EntityVersion>;

    /// First committed version after `version`, including commits newer than this view
    fn next_version(&self, id: &EntityId, version: i64) -> Option<EntityVersion>;

    /// Release the view; calling it again is a no-op
    fn abort(&mut self);

    /// Whether `abort` has run
    fn is_released(&self) -> bool;
}
