//! Change Tracker
//!
//! The per-session ledger of every entity add, update and remove, the
//! changed property names per entity, and the per-link delta records. It
//! owns the session's handle arena and the pre-session store snapshot; once
//! disposed every operation fails with `TrackerDisposed`.
//!
//! All bookkeeping here is total: the only failure mode of a live tracker
//! is naming a handle that was never bound in it.

mod change;
mod link_change;
mod ordered_set;

pub use change::{ChangeDescription, EntityChangeType, LinkChangeSummary, SnapshotEntity};
pub use link_change::{LinkChange, LinkChangeType};
pub use ordered_set::OrderedSet;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::errors::{Result, TrellisError};
use crate::session::{Handle, HandleTable};
use crate::store::StoreSnapshot;

/// Mutable change ledger owned by exactly one session
pub struct ChangesTracker {
    handles: HandleTable,
    snapshot: Option<Box<dyn StoreSnapshot>>,
    changed: OrderedSet<Handle>,
    added: OrderedSet<Handle>,
    removed: OrderedSet<Handle>,
    affected_types: BTreeSet<String>,
    property_deltas: HashMap<Handle, BTreeSet<String>>,
    link_deltas: HashMap<Handle, BTreeMap<String, LinkChange>>,
    /// target -> (source, link) records that list it as removed
    removed_from: HashMap<Handle, Vec<(Handle, String)>>,
}

impl ChangesTracker {
    /// Bind a fresh tracker to a pre-session snapshot
    pub fn new(snapshot: Box<dyn StoreSnapshot>) -> Self {
        Self {
            handles: HandleTable::new(),
            snapshot: Some(snapshot),
            changed: OrderedSet::new(),
            added: OrderedSet::new(),
            removed: OrderedSet::new(),
            affected_types: BTreeSet::new(),
            property_deltas: HashMap::new(),
            link_deltas: HashMap::new(),
            removed_from: HashMap::new(),
        }
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub(crate) fn handles_mut(&mut self) -> &mut HandleTable {
        &mut self.handles
    }

    pub fn is_disposed(&self) -> bool {
        self.snapshot.is_none()
    }

    fn ensure_live(&self, op: &str) -> Result<()> {
        if self.snapshot.is_none() {
            return Err(TrellisError::TrackerDisposed { op: op.to_string() });
        }
        Ok(())
    }

    fn bound_id(&self, e: Handle) -> Result<&trellis_core_types::EntityId> {
        self.handles.id(e).ok_or_else(|| TrellisError::InvalidInput {
            reason: format!("handle {e} is not bound in this session"),
        })
    }

    /// The pre-session read view
    ///
    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn snapshot(&self) -> Result<&dyn StoreSnapshot> {
        self.snapshot
            .as_deref()
            .ok_or_else(|| TrellisError::TrackerDisposed {
                op: "snapshot".to_string(),
            })
    }

    // ===== Mutation bookkeeping =====

    fn mark_changed(&mut self, e: Handle) {
        self.changed.insert(e);
        if let Some(id) = self.handles.id(e) {
            if !self.affected_types.contains(id.entity_type()) {
                self.affected_types.insert(id.entity_type().to_string());
            }
        }
    }

    /// Record that `e` has some change
    ///
    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn entity_changed(&mut self, e: Handle) -> Result<()> {
        self.ensure_live("entity_changed")?;
        self.mark_changed(e);
        Ok(())
    }

    /// Record that `e` was created in this session
    ///
    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn entity_added(&mut self, e: Handle) -> Result<()> {
        self.ensure_live("entity_added")?;
        self.mark_changed(e);
        self.added.insert(e);
        Ok(())
    }

    /// Record that `e` was destroyed, upgrading every pending "removed"
    /// entry that names it to "deleted"
    ///
    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn entity_removed(&mut self, e: Handle) -> Result<()> {
        self.ensure_live("entity_removed")?;
        self.mark_changed(e);
        self.removed.insert(e);

        if let Some(sources) = self.removed_from.remove(&e) {
            for (source, link_name) in sources {
                if let Some(record) = self
                    .link_deltas
                    .get_mut(&source)
                    .and_then(|links| links.get_mut(&link_name))
                {
                    record.add_deleted(e);
                }
            }
        }
        tracing::trace!(handle = %e, "entity removed");
        Ok(())
    }

    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn property_changed(&mut self, e: Handle, name: &str) -> Result<()> {
        self.ensure_live("property_changed")?;
        self.mark_changed(e);
        self.property_deltas
            .entry(e)
            .or_default()
            .insert(name.to_string());
        Ok(())
    }

    /// Forget a property change; prunes the entity's entry once empty
    ///
    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn remove_property_changed(&mut self, e: Handle, name: &str) -> Result<()> {
        self.ensure_live("remove_property_changed")?;
        if let Some(names) = self.property_deltas.get_mut(&e) {
            names.remove(name);
            if names.is_empty() {
                self.property_deltas.remove(&e);
            }
        }
        Ok(())
    }

    fn index_removal(
        removed_from: &mut HashMap<Handle, Vec<(Handle, String)>>,
        target: Handle,
        source: Handle,
        link_name: &str,
    ) {
        let sources = removed_from.entry(target).or_default();
        if !sources
            .iter()
            .any(|(s, l)| *s == source && l == link_name)
        {
            sources.push((source, link_name.to_string()));
        }
    }

    fn prune_link(&mut self, source: Handle, link_name: &str) {
        if let Some(links) = self.link_deltas.get_mut(&source) {
            if links.get(link_name).is_some_and(LinkChange::is_empty) {
                links.remove(link_name);
            }
            if links.is_empty() {
                self.link_deltas.remove(&source);
            }
        }
    }

    /// Single-valued link change
    ///
    /// With `is_add`, `target` becomes linked and `old_target`, if any, is
    /// unlinked. Without it, `target` is unlinked.
    ///
    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn link_changed(
        &mut self,
        source: Handle,
        link_name: &str,
        target: Handle,
        old_target: Option<Handle>,
        is_add: bool,
    ) -> Result<()> {
        self.ensure_live("link_changed")?;
        self.mark_changed(source);

        let record = self
            .link_deltas
            .entry(source)
            .or_default()
            .entry(link_name.to_string())
            .or_insert_with(|| LinkChange::new(link_name));
        if is_add {
            if let Some(old) = old_target {
                if record.add_removed(old) {
                    Self::index_removal(&mut self.removed_from, old, source, link_name);
                }
            }
            record.add_added(target);
        } else if record.add_removed(target) {
            Self::index_removal(&mut self.removed_from, target, source, link_name);
        }

        self.prune_link(source, link_name);
        tracing::trace!(source = %source, link_name, target = %target, is_add, "link changed");
        Ok(())
    }

    /// Bulk unlink of a multi-valued link
    ///
    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn links_removed(
        &mut self,
        source: Handle,
        link_name: &str,
        targets: &[Handle],
    ) -> Result<()> {
        self.ensure_live("links_removed")?;
        self.mark_changed(source);

        let record = self
            .link_deltas
            .entry(source)
            .or_default()
            .entry(link_name.to_string())
            .or_insert_with(|| LinkChange::new(link_name));
        for target in targets {
            if record.add_removed(*target) {
                Self::index_removal(&mut self.removed_from, *target, source, link_name);
            }
        }

        self.prune_link(source, link_name);
        Ok(())
    }

    // ===== Queries =====

    fn change_type_of(&self, e: Handle) -> EntityChangeType {
        if self.added.contains(&e) {
            EntityChangeType::Add
        } else if self.removed.contains(&e) {
            EntityChangeType::Remove
        } else {
            EntityChangeType::Update
        }
    }

    fn describe(&self, e: Handle) -> Option<ChangeDescription> {
        let id = self.handles.id(e)?.clone();
        let properties = self.property_deltas.get(&e).cloned().unwrap_or_default();
        let links: BTreeMap<String, LinkChangeSummary> = self
            .link_deltas
            .get(&e)
            .map(|links| {
                links
                    .iter()
                    .filter_map(|(name, record)| {
                        record.change_type().map(|change_type| {
                            (
                                name.clone(),
                                LinkChangeSummary::from_link_change(
                                    record,
                                    change_type,
                                    &self.handles,
                                ),
                            )
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(ChangeDescription::new(
            e,
            id,
            self.change_type_of(e),
            properties,
            links,
        ))
    }

    /// Immutable description of everything recorded for `e`
    ///
    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`, `InvalidInput` for a
    /// handle not bound in this session.
    pub fn change_description(&self, e: Handle) -> Result<ChangeDescription> {
        self.ensure_live("change_description")?;
        self.bound_id(e)?;
        self.describe(e).ok_or_else(|| TrellisError::Internal {
            message: format!("handle {e} lost its binding"),
        })
    }

    /// Descriptions of every externally visible change, in first-touched order
    ///
    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn all_change_descriptions(&self) -> Result<Vec<ChangeDescription>> {
        self.ensure_live("all_change_descriptions")?;
        Ok(self
            .changed
            .iter()
            .filter(|e| !self.created_and_removed(**e))
            .filter_map(|e| self.describe(*e))
            .collect())
    }

    /// Number of externally visible changes
    ///
    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn change_count(&self) -> Result<usize> {
        self.ensure_live("change_count")?;
        let transient = self
            .removed
            .iter()
            .filter(|e| self.added.contains(e))
            .count();
        Ok(self.changed.len() - transient)
    }

    fn created_and_removed(&self, e: Handle) -> bool {
        self.added.contains(&e) && self.removed.contains(&e)
    }

    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn changed_entities(&self) -> Result<&[Handle]> {
        self.ensure_live("changed_entities")?;
        Ok(self.changed.as_slice())
    }

    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn added_entities(&self) -> Result<&[Handle]> {
        self.ensure_live("added_entities")?;
        Ok(self.added.as_slice())
    }

    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn removed_entities(&self) -> Result<&[Handle]> {
        self.ensure_live("removed_entities")?;
        Ok(self.removed.as_slice())
    }

    /// Type names of every touched entity
    ///
    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn affected_types(&self) -> Result<&BTreeSet<String>> {
        self.ensure_live("affected_types")?;
        Ok(&self.affected_types)
    }

    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn is_new(&self, e: Handle) -> Result<bool> {
        self.ensure_live("is_new")?;
        Ok(self.added.contains(&e))
    }

    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn is_removed(&self, e: Handle) -> Result<bool> {
        self.ensure_live("is_removed")?;
        Ok(self.removed.contains(&e))
    }

    /// Neither created nor destroyed in this session
    ///
    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn is_saved(&self, e: Handle) -> Result<bool> {
        self.ensure_live("is_saved")?;
        Ok(!self.added.contains(&e) && !self.removed.contains(&e))
    }

    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn was_created_and_removed(&self, e: Handle) -> Result<bool> {
        self.ensure_live("was_created_and_removed")?;
        Ok(self.created_and_removed(e))
    }

    /// Whether `e` has any recorded change
    ///
    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn is_changed(&self, e: Handle) -> Result<bool> {
        self.ensure_live("is_changed")?;
        Ok(self.changed.contains(&e))
    }

    /// Changed property names, `None` if there are none
    ///
    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn changed_properties(&self, e: Handle) -> Result<Option<&BTreeSet<String>>> {
        self.ensure_live("changed_properties")?;
        Ok(self.property_deltas.get(&e))
    }

    /// Pending link records keyed by link name, `None` if there are none
    ///
    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn changed_links(&self, e: Handle) -> Result<Option<&BTreeMap<String, LinkChange>>> {
        self.ensure_live("changed_links")?;
        Ok(self.link_deltas.get(&e))
    }

    /// Pending record for one link of `e`
    ///
    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`.
    pub fn link_change(&self, e: Handle, link_name: &str) -> Result<Option<&LinkChange>> {
        self.ensure_live("link_change")?;
        Ok(self.link_deltas.get(&e).and_then(|links| links.get(link_name)))
    }

    /// Committed view of `e` at session start together with its changes
    ///
    /// # Errors
    /// Returns `TrackerDisposed` after `dispose`, `InvalidInput` for an
    /// unbound handle.
    pub fn snapshot_entity(&self, e: Handle) -> Result<SnapshotEntity> {
        let change = self.change_description(e)?;
        let committed = if self.handles.is_new(e) {
            None
        } else {
            self.snapshot()?.entity(change.entity())
        };
        Ok(SnapshotEntity { committed, change })
    }

    /// Release the snapshot and drop all recorded state
    ///
    /// A second call is a no-op.
    pub fn dispose(&mut self) {
        let Some(mut snapshot) = self.snapshot.take() else {
            return;
        };
        snapshot.abort();
        let changes = self.changed.len();
        self.changed.clear();
        self.added.clear();
        self.removed.clear();
        self.affected_types.clear();
        self.property_deltas.clear();
        self.link_deltas.clear();
        self.removed_from.clear();
        tracing::debug!(changes, "changes tracker disposed");
    }
}

impl std::fmt::Debug for ChangesTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangesTracker")
            .field("disposed", &self.is_disposed())
            .field("handles", &self.handles.len())
            .field("changed", &self.changed.len())
            .field("added", &self.added.len())
            .field("removed", &self.removed.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CommitBatch, CommitEntry, MemoryStore};
    use std::collections::BTreeMap;
    use trellis_core_types::EntityId;

    fn tracker() -> (MemoryStore, ChangesTracker) {
        let store = MemoryStore::new();
        let tracker = ChangesTracker::new(Box::new(store.begin_snapshot()));
        (store, tracker)
    }

    fn bind(tracker: &mut ChangesTracker, ty: &str, id: u64) -> Handle {
        tracker
            .handles_mut()
            .bind(EntityId::new(ty, id), 0, false)
    }

    #[test]
    fn test_add_remove_link_cancels_and_prunes() {
        let (_store, mut tracker) = tracker();
        let a = bind(&mut tracker, "Issue", 1);
        let t = bind(&mut tracker, "Tag", 1);

        tracker.link_changed(a, "tags", t, None, true).unwrap();
        tracker.link_changed(a, "tags", t, None, false).unwrap();

        assert!(tracker.link_change(a, "tags").unwrap().is_none());
        assert!(tracker.changed_links(a).unwrap().is_none());
        // the source still counts as touched
        assert!(tracker.is_changed(a).unwrap());
    }

    #[test]
    fn test_replacing_single_link_records_both_sides() {
        let (_store, mut tracker) = tracker();
        let a = bind(&mut tracker, "Issue", 1);
        let old = bind(&mut tracker, "User", 1);
        let new = bind(&mut tracker, "User", 2);

        tracker
            .link_changed(a, "assignee", new, Some(old), true)
            .unwrap();

        let record = tracker.link_change(a, "assignee").unwrap().unwrap();
        assert_eq!(record.added(), &[new]);
        assert_eq!(record.removed(), &[old]);
        assert_eq!(record.change_type(), Some(LinkChangeType::AddAndRemove));
    }

    #[test]
    fn test_removed_upgrades_to_deleted() {
        let (_store, mut tracker) = tracker();
        let a = bind(&mut tracker, "Issue", 1);
        let b = bind(&mut tracker, "Tag", 1);

        tracker.links_removed(a, "tags", &[b]).unwrap();
        tracker.entity_removed(b).unwrap();

        let record = tracker.link_change(a, "tags").unwrap().unwrap();
        assert!(record.removed().is_empty());
        assert_eq!(record.deleted(), &[b]);
    }

    #[test]
    fn test_set_then_unset_property_leaves_no_delta() {
        let (_store, mut tracker) = tracker();
        let a = bind(&mut tracker, "Issue", 1);

        tracker.property_changed(a, "title").unwrap();
        tracker.remove_property_changed(a, "title").unwrap();

        assert!(tracker.changed_properties(a).unwrap().is_none());
        let description = tracker.change_description(a).unwrap();
        assert!(description.changed_properties().is_empty());
        assert_eq!(description.change_type(), EntityChangeType::Update);
    }

    #[test]
    fn test_created_and_removed_excluded_from_descriptions() {
        let (_store, mut tracker) = tracker();
        let kept = bind(&mut tracker, "Issue", 1);
        let transient = bind(&mut tracker, "Issue", 2);

        tracker.property_changed(kept, "title").unwrap();
        tracker.entity_added(transient).unwrap();
        tracker.entity_removed(transient).unwrap();

        let descriptions = tracker.all_change_descriptions().unwrap();
        assert_eq!(descriptions.len(), 1);
        assert_eq!(descriptions[0].handle(), kept);
        assert_eq!(tracker.change_count().unwrap(), 1);
        assert_eq!(tracker.changed_entities().unwrap().len(), 2);
        assert!(tracker.was_created_and_removed(transient).unwrap());
        assert!(!tracker.is_saved(transient).unwrap());
        assert!(tracker.is_saved(kept).unwrap());
    }

    #[test]
    fn test_affected_types() {
        let (_store, mut tracker) = tracker();
        let a = bind(&mut tracker, "Issue", 1);
        let b = bind(&mut tracker, "User", 1);
        tracker.entity_changed(a).unwrap();
        tracker.entity_changed(b).unwrap();

        let types: Vec<&str> = tracker
            .affected_types()
            .unwrap()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(types, vec!["Issue", "User"]);
    }

    #[test]
    fn test_snapshot_entity_reads_committed_state() {
        let store = MemoryStore::new();
        let id = store.allocate_id("Issue");
        store
            .apply(CommitBatch {
                entries: vec![CommitEntry::Create {
                    id: id.clone(),
                    properties: BTreeMap::from([("title".to_string(), "Old".into())]),
                    links: BTreeMap::new(),
                }],
            })
            .unwrap();

        let mut tracker = ChangesTracker::new(Box::new(store.begin_snapshot()));
        let h = tracker.handles_mut().bind(id, 0, false);
        tracker.property_changed(h, "title").unwrap();

        let view = tracker.snapshot_entity(h).unwrap();
        let committed = view.committed.unwrap();
        assert_eq!(committed.property("title").and_then(|v| v.as_text()), Some("Old"));
        assert!(view.change.has_property_change("title"));
    }

    #[test]
    fn test_dispose_is_idempotent_and_releases_snapshot() {
        let (store, mut tracker) = tracker();
        assert_eq!(store.open_snapshot_count(), 1);

        tracker.dispose();
        tracker.dispose();

        assert_eq!(store.open_snapshot_count(), 0);
        assert!(tracker.is_disposed());
        assert!(matches!(
            tracker.snapshot(),
            Err(TrellisError::TrackerDisposed { .. })
        ));
    }

    #[test]
    fn test_operations_after_dispose_fail() {
        let (_store, mut tracker) = tracker();
        let a = bind(&mut tracker, "Issue", 1);
        tracker.dispose();

        assert!(matches!(
            tracker.entity_added(a),
            Err(TrellisError::TrackerDisposed { .. })
        ));
        assert!(matches!(
            tracker.change_count(),
            Err(TrellisError::TrackerDisposed { .. })
        ));
        assert!(matches!(
            tracker.links_removed(a, "tags", &[]),
            Err(TrellisError::TrackerDisposed { .. })
        ));
    }

    #[test]
    fn test_unbound_handle_description_is_invalid_input() {
        let (_store, tracker) = tracker();
        let result = tracker.change_description(Handle::from_index(9));
        assert!(matches!(result, Err(TrellisError::InvalidInput { .. })));
    }
}
