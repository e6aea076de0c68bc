use trellis_core::{
    AssociationEnd, Cardinality, Database, EntityMetadata, EntityRef, ModelMetadata,
    OnDeletePolicy, TrellisConfig,
};

/// Issue tracker model used across scenarios
///
/// - `Issue.tags` -> many `Tag`, cleared when a tag is deleted
/// - `Issue.assignee` -> one `User`, cleared when the user is deleted
/// - `Issue.reviewer` -> one `User`, blocks deleting the user
/// - `Comment.issue` -> parent `Issue`, deleting the issue deletes its comments
#[allow(dead_code)]
pub fn issue_model() -> ModelMetadata {
    ModelMetadata::new()
        .with(
            EntityMetadata::new("Issue")
                .with_association(AssociationEnd::new("tags", "Tag", Cardinality::Many))
                .with_association(AssociationEnd::new("assignee", "User", Cardinality::One))
                .with_association(
                    AssociationEnd::new("reviewer", "User", Cardinality::One)
                        .with_on_target_delete(OnDeletePolicy::Fail),
                ),
        )
        .with(
            EntityMetadata::new("Comment")
                .with_association(AssociationEnd::child_to_parent("issue", "Issue")),
        )
        .with(EntityMetadata::new("Tag"))
        .with(EntityMetadata::new("User"))
}

#[allow(dead_code)]
pub fn open_db() -> Database {
    Database::open(issue_model(), TrellisConfig::default())
}

/// Commit an issue linked to `tag_count` fresh tags
#[allow(dead_code)]
pub fn seed_issue_with_tags(db: &Database, tag_count: usize) -> (EntityRef, Vec<EntityRef>) {
    let mut session = db.begin_session();
    let issue = session.new_entity("Issue").unwrap();
    session.set_property(&issue, "title", "Seeded").unwrap();
    let mut tags = Vec::new();
    for _ in 0..tag_count {
        let tag = session.new_entity("Tag").unwrap();
        session.add_link(&issue, "tags", &tag).unwrap();
        tags.push(tag);
    }
    session.commit().unwrap();
    (issue, tags)
}

#[allow(dead_code)]
pub fn ids(refs: &[EntityRef]) -> Vec<trellis_core::EntityId> {
    refs.iter().map(|r| r.id().clone()).collect()
}
