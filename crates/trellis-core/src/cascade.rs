//! Cascade Delete Engine
//!
//! Deleting an entity runs, in order:
//!
//! 1. a guard: an absent or already removed entity is a no-op;
//! 2. the type's destructor hook, which may mutate the session freely and
//!    is skipped when the entity's own destructor is already running;
//! 3. `Fail` checks over every declared link touching the entity, then
//!    `Cascade`/`Clear` processing (outgoing links use `on_delete`, incoming
//!    links use the source end's `on_target_delete`);
//! 4. a re-check of the removed flag, since steps 2 and 3 may have deleted
//!    the entity already;
//! 5. the structural removal, which lets the tracker upgrade earlier
//!    "removed" deltas naming the entity to "deleted".
//!
//! The removed flag is only set in step 5. Cycles terminate because every
//! link is severed before the engine recurses across it, so a revisit finds
//! nothing left to traverse and falls through to the guard.

use std::time::Instant;

use trellis_core_types::EntityId;

use crate::errors::{ExError, Result, TrellisError};
use crate::model::{AssociationEnd, EntityRef, OnDeletePolicy};
use crate::session::{Handle, Session};
use crate::{log_op_end, log_op_error, log_op_start};

impl Session {
    /// Delete `e`, applying its destructor and every on-delete policy
    ///
    /// Deleting an absent or already deleted entity does nothing. On error
    /// the session holds partial cascade state; abort it.
    ///
    /// # Errors
    /// * `ConstraintViolation` - a `Fail` policy blocked the deletion
    /// * Any error returned by a destructor hook, unmodified
    pub fn delete(&mut self, e: &EntityRef) -> Result<()> {
        if self.resolve(e).is_none() {
            return Ok(());
        }
        let started = Instant::now();
        log_op_start!("entity_delete", entity = %e.id(), session_id = %self.id());

        match self.cascade_delete(e) {
            Ok(()) => {
                log_op_end!(
                    "entity_delete",
                    duration_ms = started.elapsed().as_millis() as u64,
                    entity = %e.id()
                );
                Ok(())
            }
            Err(err) => {
                log_op_error!(
                    "entity_delete",
                    ExError::from(err.clone()).with_session_id(self.id()),
                    duration_ms = started.elapsed().as_millis() as u64,
                    entity = %e.id()
                );
                Err(err)
            }
        }
    }

    fn cascade_delete(&mut self, e: &EntityRef) -> Result<()> {
        let Some(handle) = self.resolve(e) else {
            return Ok(());
        };
        let metadata = self.database().metadata_arc();
        let entity_type = e.entity_type().to_string();

        if let Some(destructor) = metadata
            .entity(&entity_type)
            .and_then(|m| m.destructor())
            .cloned()
        {
            // a destructor deleting its own entity falls through to the policies
            if self.enter_destructor(handle) {
                let target = self
                    .entity_ref(handle)
                    .unwrap_or_else(|| e.clone());
                let outcome = destructor(self, &target);
                self.leave_destructor(handle);
                outcome?;
                if self.tracker().handles().is_removed(handle) {
                    return Ok(());
                }
            }
        }

        let outgoing: Vec<AssociationEnd> = metadata
            .entity(&entity_type)
            .map(|m| m.associations().to_vec())
            .unwrap_or_default();
        let incoming: Vec<AssociationEnd> = metadata
            .incoming_for(&entity_type)
            .into_iter()
            .cloned()
            .collect();

        for end in outgoing
            .iter()
            .filter(|end| end.on_delete() == OnDeletePolicy::Fail)
        {
            let linked = self.link_handles(handle, &[end.link_name()]);
            self.fail_if_linked(e.id(), end, &linked)?;
        }
        for end in incoming
            .iter()
            .filter(|end| end.on_target_delete() == OnDeletePolicy::Fail)
        {
            let linked = self.incoming_sources(handle, end);
            self.fail_if_linked(e.id(), end, &linked)?;
        }

        for end in &outgoing {
            let cascade = match end.on_delete() {
                OnDeletePolicy::Fail => continue,
                OnDeletePolicy::Clear => false,
                OnDeletePolicy::Cascade => true,
            };
            for target in self.link_handles(handle, &[end.link_name()]) {
                self.sever(handle, end.link_name(), target)?;
                if cascade {
                    self.cascade_to(target)?;
                }
            }
        }
        for end in &incoming {
            let cascade = match end.on_target_delete() {
                OnDeletePolicy::Fail => continue,
                OnDeletePolicy::Clear => false,
                OnDeletePolicy::Cascade => true,
            };
            for source in self.incoming_sources(handle, end) {
                self.sever(source, end.link_name(), handle)?;
                if cascade {
                    self.cascade_to(source)?;
                }
            }
        }

        if self.tracker().handles().is_removed(handle) {
            return Ok(());
        }
        tracing::debug!(entity = %e.id(), "entity removed");
        self.remove_structurally(handle)
    }

    fn cascade_to(&mut self, handle: Handle) -> Result<()> {
        match self.entity_ref(handle) {
            Some(next) => self.cascade_delete(&next),
            None => Ok(()),
        }
    }

    fn fail_if_linked(&self, entity: &EntityId, end: &AssociationEnd, linked: &[Handle]) -> Result<()> {
        if linked.is_empty() {
            return Ok(());
        }
        Err(TrellisError::ConstraintViolation {
            entity: entity.to_string(),
            link_name: end.link_name().to_string(),
            linked: linked
                .iter()
                .filter_map(|h| self.handle_id(*h).map(ToString::to_string))
                .collect(),
        })
    }

    /// Live entities whose `end` link currently contains `target`
    fn incoming_sources(&mut self, target: Handle, end: &AssociationEnd) -> Vec<Handle> {
        let Some(target_id) = self.handle_id(target).cloned() else {
            return Vec::new();
        };
        let mut candidates: Vec<EntityId> = self
            .tracker()
            .snapshot()
            .map(|s| s.incoming(&target_id, end.source_type(), end.link_name()))
            .unwrap_or_default();

        let pending: Vec<EntityId> = self
            .tracker()
            .changed_entities()
            .unwrap_or_default()
            .iter()
            .filter(|h| {
                self.tracker()
                    .link_change(**h, end.link_name())
                    .ok()
                    .flatten()
                    .is_some_and(|change| change.is_added(target))
            })
            .filter_map(|h| self.handle_id(*h).cloned())
            .filter(|id| id.entity_type() == end.source_type())
            .collect();
        for id in pending {
            if !candidates.contains(&id) {
                candidates.push(id);
            }
        }

        let mut sources = Vec::new();
        for id in candidates {
            let Some(source) = self.resolve_id(&id) else {
                continue;
            };
            if self
                .link_handles(source, &[end.link_name()])
                .contains(&target)
            {
                sources.push(source);
            }
        }
        sources
    }
}
