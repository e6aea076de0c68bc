//! Session layer
//!
//! A `Session` is one transaction's working view over the store. It owns a
//! `ChangesTracker` bound to a snapshot taken at `begin_session`, buffers
//! property writes, and expresses link state as pending deltas over the
//! snapshot. Nothing reaches the store until `commit`.
//!
//! Every operation takes the session explicitly; there is no ambient
//! "current session".

mod commit;
mod handle;
mod resolver;

pub use commit::{changeset_digest, CommitReport};
pub use handle::{Handle, HandleTable};

use std::collections::{BTreeMap, HashMap, HashSet};

use trellis_core_types::{EntityId, SessionId};

use crate::database::Database;
use crate::errors::{Result, TrellisError};
use crate::model::{Cardinality, EntityRef, PropertyValue};
use crate::store::StoreSnapshot;
use crate::tracker::ChangesTracker;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Committed,
    Aborted,
}

/// One transaction over a `Database`
pub struct Session {
    id: SessionId,
    db: Database,
    tracker: ChangesTracker,
    /// Buffered writes; `None` marks a deleted property
    properties: HashMap<Handle, BTreeMap<String, Option<PropertyValue>>>,
    /// Entities whose destructor is on the stack
    destroying: HashSet<Handle>,
    state: SessionState,
}

impl Session {
    pub(crate) fn begin(db: Database) -> Self {
        let snapshot = db.store().begin_snapshot();
        let id = SessionId::new();
        tracing::debug!(session_id = %id, as_of = snapshot.as_of(), "session started");
        Self {
            id,
            db,
            tracker: ChangesTracker::new(Box::new(snapshot)),
            properties: HashMap::new(),
            destroying: HashSet::new(),
            state: SessionState::Active,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn tracker(&self) -> &ChangesTracker {
        &self.tracker
    }

    pub(crate) fn tracker_mut(&mut self) -> &mut ChangesTracker {
        &mut self.tracker
    }

    fn ensure_active(&self) -> Result<()> {
        if !self.is_active() {
            return Err(TrellisError::SessionNotActive {
                session_id: self.id.to_string(),
            });
        }
        Ok(())
    }

    /// Reference bound to this session for a live handle
    pub fn entity_ref(&self, handle: Handle) -> Option<EntityRef> {
        let id = self.tracker.handles().id(handle)?;
        Some(EntityRef::bound(id.clone(), self.id, handle))
    }

    pub(crate) fn handle_id(&self, handle: Handle) -> Option<&EntityId> {
        self.tracker.handles().id(handle)
    }

    // ===== Entities =====

    /// Create a new entity of `entity_type`
    ///
    /// # Errors
    /// Returns `SessionNotActive` after commit or abort.
    pub fn new_entity(&mut self, entity_type: &str) -> Result<EntityRef> {
        self.ensure_active()?;
        let id = self.db.store().allocate_id(entity_type);
        let handle = self.tracker.handles_mut().bind(id.clone(), 0, true);
        self.tracker.entity_added(handle)?;
        tracing::debug!(session_id = %self.id, entity = %id, "entity created");
        Ok(EntityRef::bound(id, self.id, handle))
    }

    /// Remove the entity from the working set and record it in the tracker
    pub(crate) fn remove_structurally(&mut self, handle: Handle) -> Result<()> {
        self.tracker.handles_mut().mark_removed(handle);
        self.properties.remove(&handle);
        self.tracker.entity_removed(handle)
    }

    /// Returns `false` if the destructor for `handle` is already running
    pub(crate) fn enter_destructor(&mut self, handle: Handle) -> bool {
        self.destroying.insert(handle)
    }

    pub(crate) fn leave_destructor(&mut self, handle: Handle) {
        self.destroying.remove(&handle);
    }

    // ===== Properties =====

    fn committed_property(&self, handle: Handle, name: &str) -> Option<PropertyValue> {
        if self.tracker.handles().is_new(handle) {
            return None;
        }
        let id = self.handle_id(handle)?;
        self.tracker.snapshot().ok()?.property(id, name)
    }

    pub(crate) fn current_property(&self, handle: Handle, name: &str) -> Option<PropertyValue> {
        match self.properties.get(&handle).and_then(|p| p.get(name)) {
            Some(pending) => pending.clone(),
            None => self.committed_property(handle, name),
        }
    }

    /// Current value of a property, `None` if unset or the entity is absent
    pub fn get_property(&mut self, e: &EntityRef, name: &str) -> Option<PropertyValue> {
        let handle = self.resolve(e)?;
        self.current_property(handle, name)
    }

    /// Write a property; writing back the committed value cancels the change
    ///
    /// A no-op if the entity is absent.
    ///
    /// # Errors
    /// Returns `TrackerDisposed` if the tracker was released under an active session.
    pub fn set_property(
        &mut self,
        e: &EntityRef,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<()> {
        let Some(handle) = self.resolve(e) else {
            return Ok(());
        };
        let value = value.into();
        let reverted = self.committed_property(handle, name).as_ref() == Some(&value);
        self.properties
            .entry(handle)
            .or_default()
            .insert(name.to_string(), Some(value));
        if reverted {
            self.tracker.remove_property_changed(handle, name)
        } else {
            self.tracker.property_changed(handle, name)
        }
    }

    /// Unset a property; a no-op if the entity is absent
    ///
    /// # Errors
    /// Returns `TrackerDisposed` if the tracker was released under an active session.
    pub fn delete_property(&mut self, e: &EntityRef, name: &str) -> Result<()> {
        let Some(handle) = self.resolve(e) else {
            return Ok(());
        };
        let was_committed = self.committed_property(handle, name).is_some();
        self.properties
            .entry(handle)
            .or_default()
            .insert(name.to_string(), None);
        if was_committed {
            self.tracker.property_changed(handle, name)
        } else {
            self.tracker.remove_property_changed(handle, name)
        }
    }

    // ===== Links =====

    fn check_link(&self, source: Handle, link_name: &str, expected: Cardinality) -> Result<()> {
        let Some(id) = self.handle_id(source) else {
            return Ok(());
        };
        let Some(metadata) = self.db.metadata().entity(id.entity_type()) else {
            return Ok(());
        };
        let end = metadata
            .association(link_name)
            .ok_or_else(|| TrellisError::UnknownLink {
                entity_type: id.entity_type().to_string(),
                link_name: link_name.to_string(),
            })?;
        if end.cardinality() != expected {
            return Err(TrellisError::InvalidInput {
                reason: format!(
                    "link '{}' on {} is {:?}-valued",
                    link_name,
                    id.entity_type(),
                    end.cardinality()
                ),
            });
        }
        Ok(())
    }

    /// Point a single-valued link at `target`, or unset it with `None`
    ///
    /// A no-op if the source or target is absent.
    ///
    /// # Errors
    /// * `UnknownLink` - the source type's metadata does not declare `link_name`
    /// * `InvalidInput` - `link_name` is declared multi-valued
    pub fn set_link(
        &mut self,
        e: &EntityRef,
        link_name: &str,
        target: Option<&EntityRef>,
    ) -> Result<()> {
        let Some(source) = self.resolve(e) else {
            return Ok(());
        };
        self.check_link(source, link_name, Cardinality::One)?;
        let current = self.link_handles(source, &[link_name]).into_iter().next();
        match target {
            Some(target) => {
                let Some(target) = self.resolve(target) else {
                    return Ok(());
                };
                if current == Some(target) {
                    return Ok(());
                }
                self.tracker
                    .link_changed(source, link_name, target, current, true)
            }
            None => match current {
                Some(current) => {
                    self.tracker
                        .link_changed(source, link_name, current, None, false)
                }
                None => Ok(()),
            },
        }
    }

    /// Add `target` to a multi-valued link
    ///
    /// A no-op if either side is absent or the target is already linked.
    ///
    /// # Errors
    /// * `UnknownLink` - the source type's metadata does not declare `link_name`
    /// * `InvalidInput` - `link_name` is declared single-valued
    pub fn add_link(&mut self, e: &EntityRef, link_name: &str, target: &EntityRef) -> Result<()> {
        let Some(source) = self.resolve(e) else {
            return Ok(());
        };
        self.check_link(source, link_name, Cardinality::Many)?;
        let Some(target) = self.resolve(target) else {
            return Ok(());
        };
        if self.link_handles(source, &[link_name]).contains(&target) {
            return Ok(());
        }
        self.tracker
            .link_changed(source, link_name, target, None, true)
    }

    /// Remove `target` from a link of either cardinality
    ///
    /// A no-op if either side is absent or the target is not linked.
    ///
    /// # Errors
    /// Returns `TrackerDisposed` if the tracker was released under an active session.
    pub fn remove_link(
        &mut self,
        e: &EntityRef,
        link_name: &str,
        target: &EntityRef,
    ) -> Result<()> {
        let Some(source) = self.resolve(e) else {
            return Ok(());
        };
        let Some(target) = self.resolve(target) else {
            return Ok(());
        };
        self.sever(source, link_name, target)
    }

    /// Unlink every current target of `link_name`
    ///
    /// # Errors
    /// Returns `TrackerDisposed` if the tracker was released under an active session.
    pub fn clear_links(&mut self, e: &EntityRef, link_name: &str) -> Result<()> {
        let Some(source) = self.resolve(e) else {
            return Ok(());
        };
        let targets = self.link_handles(source, &[link_name]);
        if targets.is_empty() {
            return Ok(());
        }
        self.tracker.links_removed(source, link_name, &targets)
    }

    /// Unlink one target if it is currently linked
    pub(crate) fn sever(&mut self, source: Handle, link_name: &str, target: Handle) -> Result<()> {
        if !self.link_handles(source, &[link_name]).contains(&target) {
            return Ok(());
        }
        self.tracker
            .link_changed(source, link_name, target, None, false)
    }

    /// Whether `e` has any recorded change, or a change to `property`
    pub fn has_changes(&mut self, e: &EntityRef, property: Option<&str>) -> bool {
        let Some(handle) = self.resolve(e) else {
            return false;
        };
        match property {
            Some(name) => self
                .tracker
                .changed_properties(handle)
                .ok()
                .flatten()
                .is_some_and(|names| names.contains(name)),
            None => self.tracker.is_changed(handle).unwrap_or(false),
        }
    }

    // ===== Lifecycle =====

    /// Discard every buffered change
    pub fn abort(mut self) {
        self.finish_aborted("session_abort");
    }

    fn finish_aborted(&mut self, op: &str) {
        if !self.is_active() {
            return;
        }
        let started = std::time::Instant::now();
        crate::log_op_start!(op, session_id = %self.id);
        self.finish(SessionState::Aborted);
        crate::log_op_end!(
            op,
            duration_ms = started.elapsed().as_millis() as u64,
            session_id = %self.id
        );
    }

    fn finish(&mut self, state: SessionState) {
        self.tracker.dispose();
        self.properties.clear();
        self.state = state;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.finish_aborted("session_abort");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("tracker", &self.tracker)
            .finish()
    }
}
