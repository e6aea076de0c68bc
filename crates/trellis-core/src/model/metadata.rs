//! Model metadata: per-type destructor hooks and per-link on-delete policy
//!
//! The cascade delete engine is the only consumer. Metadata is immutable once
//! a `Database` is opened and is shared by all its sessions.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::entity::EntityRef;
use crate::errors::Result;
use crate::session::Session;

/// What happens to the other side of a link when one side is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDeletePolicy {
    /// Delete the linked entity too
    Cascade,
    /// Sever the link and keep the linked entity
    #[default]
    Clear,
    /// Reject the deletion while the link exists
    Fail,
}

/// Number of targets a link may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    One,
    Many,
}

/// Pre-deletion hook registered for an entity type
///
/// Runs before on-delete constraints are processed. It may mutate the
/// session freely, including deleting the entity being destroyed.
pub type Destructor = Arc<dyn Fn(&mut Session, &EntityRef) -> Result<()> + Send + Sync>;

/// One declared link, seen from its source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationEnd {
    source_type: String,
    link_name: String,
    target_type: String,
    cardinality: Cardinality,
    on_delete: OnDeletePolicy,
    on_target_delete: OnDeletePolicy,
}

impl AssociationEnd {
    /// Declare a link; both policies default to `Clear`
    ///
    /// The source type is filled in when the end is attached to an
    /// `EntityMetadata`.
    pub fn new(
        link_name: impl Into<String>,
        target_type: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            source_type: String::new(),
            link_name: link_name.into(),
            target_type: target_type.into(),
            cardinality,
            on_delete: OnDeletePolicy::default(),
            on_target_delete: OnDeletePolicy::default(),
        }
    }

    /// Child-to-parent link: deleting the child clears the link, deleting
    /// the parent cascades to the child
    pub fn child_to_parent(link_name: impl Into<String>, parent_type: impl Into<String>) -> Self {
        Self::new(link_name, parent_type, Cardinality::One)
            .with_on_delete(OnDeletePolicy::Clear)
            .with_on_target_delete(OnDeletePolicy::Cascade)
    }

    /// Policy applied to this link's targets when the source is deleted
    pub fn with_on_delete(mut self, policy: OnDeletePolicy) -> Self {
        self.on_delete = policy;
        self
    }

    /// Policy applied to this link's sources when a target is deleted
    pub fn with_on_target_delete(mut self, policy: OnDeletePolicy) -> Self {
        self.on_target_delete = policy;
        self
    }

    pub fn source_type(&self) -> &str {
        &self.source_type
    }

    pub fn link_name(&self) -> &str {
        &self.link_name
    }

    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn on_delete(&self) -> OnDeletePolicy {
        self.on_delete
    }

    pub fn on_target_delete(&self) -> OnDeletePolicy {
        self.on_target_delete
    }
}

/// Metadata for one entity type
#[derive(Clone)]
pub struct EntityMetadata {
    entity_type: String,
    destructor: Option<Destructor>,
    associations: Vec<AssociationEnd>,
}

impl EntityMetadata {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            destructor: None,
            associations: Vec::new(),
        }
    }

    /// Register the type's pre-deletion hook
    pub fn with_destructor<F>(mut self, destructor: F) -> Self
    where
        F: Fn(&mut Session, &EntityRef) -> Result<()> + Send + Sync + 'static,
    {
        self.destructor = Some(Arc::new(destructor));
        self
    }

    /// Declare an outgoing link of this type
    pub fn with_association(mut self, mut end: AssociationEnd) -> Self {
        end.source_type = self.entity_type.clone();
        self.associations.push(end);
        self
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn destructor(&self) -> Option<&Destructor> {
        self.destructor.as_ref()
    }

    /// Outgoing links declared on this type
    pub fn associations(&self) -> &[AssociationEnd] {
        &self.associations
    }

    /// Look up an outgoing link by name
    pub fn association(&self, link_name: &str) -> Option<&AssociationEnd> {
        self.associations
            .iter()
            .find(|a| a.link_name == link_name)
    }
}

impl std::fmt::Debug for EntityMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityMetadata")
            .field("entity_type", &self.entity_type)
            .field("destructor", &self.destructor.is_some())
            .field("associations", &self.associations)
            .finish()
    }
}

/// Registry of entity metadata keyed by type name
#[derive(Debug, Clone, Default)]
pub struct ModelMetadata {
    entities: HashMap<String, EntityMetadata>,
}

impl ModelMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the metadata for a type
    pub fn register(&mut self, metadata: EntityMetadata) -> &mut Self {
        self.entities
            .insert(metadata.entity_type.clone(), metadata);
        self
    }

    /// Builder form of `register`
    pub fn with(mut self, metadata: EntityMetadata) -> Self {
        self.register(metadata);
        self
    }

    pub fn entity(&self, entity_type: &str) -> Option<&EntityMetadata> {
        self.entities.get(entity_type)
    }

    /// Every declared link whose target type is `target_type`, sorted by
    /// source type then link name so cascades visit them deterministically
    pub fn incoming_for(&self, target_type: &str) -> Vec<&AssociationEnd> {
        let mut ends: Vec<&AssociationEnd> = self
            .entities
            .values()
            .flat_map(|m| m.associations.iter())
            .filter(|a| a.target_type == target_type)
            .collect();
        ends.sort_by(|a, b| {
            (a.source_type.as_str(), a.link_name.as_str())
                .cmp(&(b.source_type.as_str(), b.link_name.as_str()))
        });
        ends
    }
}
