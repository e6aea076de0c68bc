//! Versioning Facade
//!
//! Read-only version queries. Each resolves its reference first and answers
//! with a neutral value when the entity is absent: an empty history, version
//! `-1`, no previous/next version, `is_removed == true`.

use crate::model::{EntityRef, EntityVersion};
use crate::session::Session;

/// Identity comparison by entity id; never rebinds either side
pub fn equals(a: &EntityRef, b: &EntityRef) -> bool {
    std::ptr::eq(a, b) || a.id() == b.id()
}

impl Session {
    /// Prior committed versions, newest first
    pub fn history(&mut self, e: &EntityRef) -> Vec<EntityVersion> {
        let Some(handle) = self.resolve(e) else {
            return Vec::new();
        };
        if self.tracker().handles().is_new(handle) {
            return Vec::new();
        }
        match self.tracker().snapshot() {
            Ok(snapshot) => snapshot.history(e.id()),
            Err(_) => Vec::new(),
        }
    }

    /// Version bound in this session; new entities are at 0
    pub fn version(&mut self, e: &EntityRef) -> i64 {
        self.resolve(e)
            .and_then(|h| self.tracker().handles().version(h))
            .unwrap_or(-1)
    }

    pub fn previous_version(&mut self, e: &EntityRef) -> Option<EntityVersion> {
        self.history(e).into_iter().next()
    }

    /// First version committed after the one bound here, even if it is newer
    /// than this session's snapshot
    ///
    /// `None` when that next record is a deletion.
    pub fn next_version(&mut self, e: &EntityRef) -> Option<EntityVersion> {
        let handle = self.resolve(e)?;
        if self.tracker().handles().is_new(handle) {
            return None;
        }
        let version = self.tracker().handles().version(handle)?;
        self.tracker()
            .snapshot()
            .ok()?
            .next_version(e.id(), version)
    }

    /// `true` when the entity is absent or was deleted in this session
    pub fn is_removed(&mut self, e: &EntityRef) -> bool {
        self.resolve(e).is_none()
    }
}
