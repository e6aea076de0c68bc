//! Per-(entity, link) delta record

use serde::{Deserialize, Serialize};

use super::ordered_set::OrderedSet;
use crate::session::Handle;

/// Coarse classification of a link delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkChangeType {
    Add,
    Remove,
    AddAndRemove,
}

/// Pending delta of one link on one entity
///
/// A target never sits in `added` and `removed` at the same time: recording
/// one side first cancels a pending entry on the other. `deleted` holds
/// targets that were unlinked and then destroyed in the same session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkChange {
    link_name: String,
    added: OrderedSet<Handle>,
    removed: OrderedSet<Handle>,
    deleted: OrderedSet<Handle>,
}

impl LinkChange {
    pub(crate) fn new(link_name: impl Into<String>) -> Self {
        Self {
            link_name: link_name.into(),
            added: OrderedSet::new(),
            removed: OrderedSet::new(),
            deleted: OrderedSet::new(),
        }
    }

    pub fn link_name(&self) -> &str {
        &self.link_name
    }

    /// Targets linked in this session, in recording order
    pub fn added(&self) -> &[Handle] {
        self.added.as_slice()
    }

    /// Targets unlinked in this session that still exist
    pub fn removed(&self) -> &[Handle] {
        self.removed.as_slice()
    }

    /// Targets unlinked and then destroyed in this session
    pub fn deleted(&self) -> &[Handle] {
        self.deleted.as_slice()
    }

    pub fn is_added(&self, target: Handle) -> bool {
        self.added.contains(&target)
    }

    /// Whether `target` was unlinked, destroyed or not
    pub fn is_removed(&self, target: Handle) -> bool {
        self.removed.contains(&target) || self.deleted.contains(&target)
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.deleted.is_empty()
    }

    /// `None` once every set is empty
    pub fn change_type(&self) -> Option<LinkChangeType> {
        let adds = !self.added.is_empty();
        let removes = !self.removed.is_empty() || !self.deleted.is_empty();
        match (adds, removes) {
            (true, true) => Some(LinkChangeType::AddAndRemove),
            (true, false) => Some(LinkChangeType::Add),
            (false, true) => Some(LinkChangeType::Remove),
            (false, false) => None,
        }
    }

    /// Record `target` as linked; returns `false` if this only cancelled a
    /// pending removal
    pub(crate) fn add_added(&mut self, target: Handle) -> bool {
        if self.removed.remove(&target) {
            return false;
        }
        self.added.insert(target);
        true
    }

    /// Record `target` as unlinked; returns `false` if this only cancelled a
    /// pending addition
    pub(crate) fn add_removed(&mut self, target: Handle) -> bool {
        if self.added.remove(&target) {
            return false;
        }
        self.removed.insert(target);
        true
    }

    /// Upgrade a removed target to deleted; no-op if it is not pending removal
    pub(crate) fn add_deleted(&mut self, target: Handle) {
        if self.removed.remove(&target) {
            self.deleted.insert(target);
        }
    }
}
