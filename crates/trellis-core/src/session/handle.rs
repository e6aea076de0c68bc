//! Session-local handle arena
//!
//! A `Handle` is an index into the table owned by one session's tracker.
//! Delta maps key on handles instead of holding entity objects, so the
//! tracker's back-references never form ownership cycles.

use std::collections::HashMap;

use serde::Serialize;
use trellis_core_types::EntityId;

/// Live binding of an entity inside one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Handle(usize);

impl Handle {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// Position of this handle in its session's table
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct HandleSlot {
    id: EntityId,
    version: i64,
    is_new: bool,
    removed: bool,
}

/// Arena of every entity bound in a session
#[derive(Debug, Default)]
pub struct HandleTable {
    slots: Vec<HandleSlot>,
    by_id: HashMap<EntityId, Handle>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `id`, reusing the existing handle if the entity is already bound
    pub(crate) fn bind(&mut self, id: EntityId, version: i64, is_new: bool) -> Handle {
        if let Some(handle) = self.by_id.get(&id) {
            return *handle;
        }
        let handle = Handle::from_index(self.slots.len());
        self.by_id.insert(id.clone(), handle);
        self.slots.push(HandleSlot {
            id,
            version,
            is_new,
            removed: false,
        });
        handle
    }

    pub fn lookup(&self, id: &EntityId) -> Option<Handle> {
        self.by_id.get(id).copied()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        handle.index() < self.slots.len()
    }

    pub fn id(&self, handle: Handle) -> Option<&EntityId> {
        self.slots.get(handle.index()).map(|s| &s.id)
    }

    /// Version the entity had when bound; new entities start at 0
    pub fn version(&self, handle: Handle) -> Option<i64> {
        self.slots.get(handle.index()).map(|s| s.version)
    }

    pub fn is_new(&self, handle: Handle) -> bool {
        self.slots.get(handle.index()).is_some_and(|s| s.is_new)
    }

    /// Removed flag; unknown handles count as removed
    pub fn is_removed(&self, handle: Handle) -> bool {
        self.slots.get(handle.index()).map_or(true, |s| s.removed)
    }

    pub(crate) fn mark_removed(&mut self, handle: Handle) {
        if let Some(slot) = self.slots.get_mut(handle.index()) {
            slot.removed = true;
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
