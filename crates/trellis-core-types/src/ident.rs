//! Entity identity
//!
//! An `EntityId` names a logical record independent of any session binding.
//! Two references denote the same entity exactly when their ids are equal.

use serde::{Deserialize, Serialize};

/// Store-wide identifier of a logical entity: type name plus numeric id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    entity_type: String,
    local_id: u64,
}

impl EntityId {
    /// Create an id from its type name and per-type numeric id
    pub fn new(entity_type: impl Into<String>, local_id: u64) -> Self {
        Self {
            entity_type: entity_type.into(),
            local_id,
        }
    }

    /// The entity type name
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// The numeric id, unique within the entity type
    pub fn local_id(&self) -> u64 {
        self.local_id
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.entity_type, self.local_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_by_type_and_id() {
        assert_eq!(EntityId::new("Issue", 1), EntityId::new("Issue", 1));
        assert_ne!(EntityId::new("Issue", 1), EntityId::new("Issue", 2));
        assert_ne!(EntityId::new("Issue", 1), EntityId::new("User", 1));
    }

    #[test]
    fn test_display() {
        assert_eq!(EntityId::new("Issue", 7).to_string(), "Issue[7]");
    }

    #[test]
    fn test_ordering_groups_by_type() {
        let mut ids = vec![
            EntityId::new("User", 1),
            EntityId::new("Issue", 2),
            EntityId::new("Issue", 1),
        ];
        ids.sort();
        assert_eq!(ids[0], EntityId::new("Issue", 1));
        assert_eq!(ids[2], EntityId::new("User", 1));
    }

    #[test]
    fn test_serialization() {
        let id = EntityId::new("Issue", 3);
        let json = serde_json::to_string(&id).unwrap();
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
