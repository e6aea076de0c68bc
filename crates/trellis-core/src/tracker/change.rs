//! Immutable change descriptions handed to listeners and commit

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use trellis_core_types::EntityId;

use super::link_change::{LinkChange, LinkChangeType};
use crate::model::EntityVersion;
use crate::session::{Handle, HandleTable};

/// How an entity changed in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityChangeType {
    Add,
    Update,
    Remove,
}

/// Link delta with targets named by id, usable after the session ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkChangeSummary {
    pub change_type: LinkChangeType,
    pub added: Vec<EntityId>,
    pub removed: Vec<EntityId>,
    pub deleted: Vec<EntityId>,
}

impl LinkChangeSummary {
    pub(crate) fn from_link_change(
        change: &LinkChange,
        change_type: LinkChangeType,
        handles: &HandleTable,
    ) -> Self {
        let ids = |targets: &[Handle]| -> Vec<EntityId> {
            targets
                .iter()
                .filter_map(|t| handles.id(*t).cloned())
                .collect()
        };
        Self {
            change_type,
            added: ids(change.added()),
            removed: ids(change.removed()),
            deleted: ids(change.deleted()),
        }
    }
}

/// Snapshot of everything recorded for one entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeDescription {
    #[serde(skip)]
    handle: Handle,
    entity: EntityId,
    change_type: EntityChangeType,
    changed_properties: BTreeSet<String>,
    changed_links: BTreeMap<String, LinkChangeSummary>,
}

impl ChangeDescription {
    pub(crate) fn new(
        handle: Handle,
        entity: EntityId,
        change_type: EntityChangeType,
        changed_properties: BTreeSet<String>,
        changed_links: BTreeMap<String, LinkChangeSummary>,
    ) -> Self {
        Self {
            handle,
            entity,
            change_type,
            changed_properties,
            changed_links,
        }
    }

    /// Session-local handle; meaningless once the session has ended
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn entity(&self) -> &EntityId {
        &self.entity
    }

    pub fn entity_type(&self) -> &str {
        self.entity.entity_type()
    }

    pub fn change_type(&self) -> EntityChangeType {
        self.change_type
    }

    pub fn changed_properties(&self) -> &BTreeSet<String> {
        &self.changed_properties
    }

    pub fn changed_links(&self) -> &BTreeMap<String, LinkChangeSummary> {
        &self.changed_links
    }

    pub fn has_property_change(&self, name: &str) -> bool {
        self.changed_properties.contains(name)
    }

    pub fn link_change(&self, link_name: &str) -> Option<&LinkChangeSummary> {
        self.changed_links.get(link_name)
    }
}

/// Read-only pre-session view of an entity paired with what changed since
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntity {
    /// Committed version at session start; `None` for entities created in the session
    pub committed: Option<EntityVersion>,
    pub change: ChangeDescription,
}
