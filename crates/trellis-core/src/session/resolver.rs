//! Entity handle resolution
//!
//! Turns a possibly stale reference into this session's live handle. An
//! inactive session, an entity missing from the snapshot, or one removed in
//! this session all resolve to `None`; callers treat that as a neutral result.

use trellis_core_types::EntityId;

use super::{Handle, Session};
use crate::model::EntityRef;

impl Session {
    /// Live handle for `e` in this session
    ///
    /// A reference bound to another (or a finished) session is rebound by
    /// id; the snapshot is never re-acquired.
    pub fn resolve(&mut self, e: &EntityRef) -> Option<Handle> {
        if !self.is_active() {
            return None;
        }
        if let Some((session, handle)) = e.binding() {
            let handles = self.tracker().handles();
            if session == self.id() && handles.id(handle) == Some(e.id()) {
                return (!handles.is_removed(handle)).then_some(handle);
            }
        }
        self.resolve_id(e.id())
    }

    pub(crate) fn resolve_id(&mut self, id: &EntityId) -> Option<Handle> {
        if !self.is_active() {
            return None;
        }
        let handles = self.tracker().handles();
        if let Some(handle) = handles.lookup(id) {
            return (!handles.is_removed(handle)).then_some(handle);
        }
        let version = self.tracker().snapshot().ok()?.entity(id)?.version;
        Some(self.tracker_mut().handles_mut().bind(id.clone(), version, false))
    }
}
