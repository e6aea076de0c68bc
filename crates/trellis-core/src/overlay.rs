//! Link Delta Overlay
//!
//! The logically visible targets of a link are the committed targets minus
//! every pending removal (destroyed or not), followed by pending additions
//! in recording order. "Added" and "removed" reads report the pending deltas
//! alone, without consulting committed state.
//!
//! Across several link names results are grouped by name in the order the
//! names are given; nothing else about cross-name order is guaranteed.

use std::collections::HashSet;

use trellis_core_types::EntityId;

use crate::model::EntityRef;
use crate::session::{Handle, HandleTable, Session};
use crate::tracker::LinkChange;

/// Overlay pending deltas on the committed targets of one link
pub fn overlay_targets(
    committed: &[EntityId],
    change: Option<&LinkChange>,
    handles: &HandleTable,
) -> Vec<EntityId> {
    let Some(change) = change else {
        return committed.to_vec();
    };
    let hidden: HashSet<&EntityId> = change
        .removed()
        .iter()
        .chain(change.deleted())
        .filter_map(|h| handles.id(*h))
        .collect();

    let mut visible: Vec<EntityId> = committed
        .iter()
        .filter(|id| !hidden.contains(id))
        .cloned()
        .collect();
    for added in change.added() {
        if let Some(id) = handles.id(*added) {
            if !visible.contains(id) {
                visible.push(id.clone());
            }
        }
    }
    visible
}

impl Session {
    fn committed_links(&self, source: Handle, link_name: &str) -> Vec<EntityId> {
        if self.tracker().handles().is_new(source) {
            return Vec::new();
        }
        let (Some(id), Ok(snapshot)) = (self.handle_id(source), self.tracker().snapshot()) else {
            return Vec::new();
        };
        snapshot.links(id, link_name)
    }

    /// Visible target ids across `link_names`, grouped by name
    pub(crate) fn link_ids(&self, source: Handle, link_names: &[&str]) -> Vec<EntityId> {
        link_names
            .iter()
            .flat_map(|name| {
                let change = self.tracker().link_change(source, name).ok().flatten();
                overlay_targets(
                    &self.committed_links(source, name),
                    change,
                    self.tracker().handles(),
                )
            })
            .collect()
    }

    /// Visible targets that still resolve in this session
    pub(crate) fn link_handles(&mut self, source: Handle, link_names: &[&str]) -> Vec<Handle> {
        self.link_ids(source, link_names)
            .iter()
            .filter_map(|id| self.resolve_id(id))
            .collect()
    }

    fn refs(&self, targets: impl IntoIterator<Item = Handle>) -> Vec<EntityRef> {
        targets
            .into_iter()
            .filter_map(|h| self.entity_ref(h))
            .collect()
    }

    /// Current target of a single-valued link
    pub fn get_link(&mut self, e: &EntityRef, link_name: &str) -> Option<EntityRef> {
        self.get_links(e, link_name).into_iter().next()
    }

    /// Current targets of a link; empty if the entity is absent
    pub fn get_links(&mut self, e: &EntityRef, link_name: &str) -> Vec<EntityRef> {
        self.get_links_from_set(e, &[link_name])
    }

    /// Current targets across several links
    pub fn get_links_from_set(&mut self, e: &EntityRef, link_names: &[&str]) -> Vec<EntityRef> {
        let Some(source) = self.resolve(e) else {
            return Vec::new();
        };
        let targets = self.link_handles(source, link_names);
        self.refs(targets)
    }

    /// Targets linked in this session across `link_names`
    pub fn added_links(&mut self, e: &EntityRef, link_names: &[&str]) -> Vec<EntityRef> {
        self.pending_targets(e, link_names, |change| change.added().to_vec())
    }

    /// Targets unlinked in this session across `link_names`, destroyed ones last
    pub fn removed_links(&mut self, e: &EntityRef, link_names: &[&str]) -> Vec<EntityRef> {
        self.pending_targets(e, link_names, |change| {
            change
                .removed()
                .iter()
                .chain(change.deleted())
                .copied()
                .collect()
        })
    }

    fn pending_targets(
        &mut self,
        e: &EntityRef,
        link_names: &[&str],
        select: impl Fn(&LinkChange) -> Vec<Handle>,
    ) -> Vec<EntityRef> {
        let Some(source) = self.resolve(e) else {
            return Vec::new();
        };
        let targets: Vec<Handle> = link_names
            .iter()
            .filter_map(|name| self.tracker().link_change(source, name).ok().flatten())
            .flat_map(|change| select(change))
            .collect();
        self.refs(targets)
    }
}
