use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trellis_core_types::{EntityId, SessionId};

use super::value::PropertyValue;
use crate::session::Handle;

/// Reference to a logical entity, possibly bound to a session
///
/// References compare and hash by `EntityId` only: a reference obtained in
/// one session is equal to a reference for the same record obtained in
/// another. The binding is a lookup hint for the resolver, never identity.
#[derive(Debug, Clone)]
pub struct EntityRef {
    id: EntityId,
    binding: Option<(SessionId, Handle)>,
}

impl EntityRef {
    /// An unbound reference, resolved by id in whichever session uses it
    pub fn unbound(id: EntityId) -> Self {
        Self { id, binding: None }
    }

    pub(crate) fn bound(id: EntityId, session: SessionId, handle: Handle) -> Self {
        Self {
            id,
            binding: Some((session, handle)),
        }
    }

    /// The logical identity of the referenced entity
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Entity type name
    pub fn entity_type(&self) -> &str {
        self.id.entity_type()
    }

    /// Session this reference was bound in, if any
    pub fn session_id(&self) -> Option<SessionId> {
        self.binding.map(|(session, _)| session)
    }

    pub(crate) fn binding(&self) -> Option<(SessionId, Handle)> {
        self.binding
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EntityRef {}

impl Hash for EntityRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl From<EntityId> for EntityRef {
    fn from(id: EntityId) -> Self {
        EntityRef::unbound(id)
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.id.fmt(f)
    }
}

/// One committed version of an entity in the persistent version chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityVersion {
    pub id: EntityId,
    /// Version number, starting at 0 for the creating commit
    pub version: i64,
    /// Tombstone marker written by the commit that deleted the entity
    pub removed: bool,
    pub properties: BTreeMap<String, PropertyValue>,
    pub links: BTreeMap<String, Vec<EntityId>>,
    pub committed_at: DateTime<Utc>,
}

impl EntityVersion {
    /// Property value in this version
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Link targets in this version (empty if the link is unset)
    pub fn links(&self, link_name: &str) -> &[EntityId] {
        self.links.get(link_name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Unbound reference to this entity
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::unbound(self.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_ignores_binding() {
        let id = EntityId::new("Issue", 1);
        let a = EntityRef::unbound(id.clone());
        let b = EntityRef::bound(id, SessionId::new(), Handle::from_index(3));
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_links_of_unset_link_is_empty() {
        let v = EntityVersion {
            id: EntityId::new("Issue", 1),
            version: 0,
            removed: false,
            properties: BTreeMap::new(),
            links: BTreeMap::new(),
            committed_at: Utc::now(),
        };
        assert!(v.links("assignee").is_empty());
        assert!(v.property("summary").is_none());
    }
}
