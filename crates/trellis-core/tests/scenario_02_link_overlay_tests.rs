#![allow(clippy::unwrap_used, clippy::expect_used)]
/// Scenario 2: Link Deltas and Overlay Reads
///
/// Pending link changes layered over committed links, cancellation of
/// opposite changes, and the removed-to-deleted upgrade.
mod common;

use std::collections::BTreeSet;

use common::{ids, open_db, seed_issue_with_tags};
use proptest::prelude::*;
use trellis_core::{LinkChangeType, TrellisError};

#[test]
fn test_scenario_02_overlay_removes_then_appends() {
    // GIVEN an issue committed with tags {x, y}
    let db = open_db();
    let (issue, tags) = seed_issue_with_tags(&db, 2);
    let (x, y) = (&tags[0], &tags[1]);

    // WHEN a session adds z and removes x
    let mut session = db.begin_session();
    let z = session.new_entity("Tag").unwrap();
    session.add_link(&issue, "tags", &z).unwrap();
    session.remove_link(&issue, "tags", x).unwrap();

    // THEN the visible tags are exactly [y, z]
    let visible = session.get_links(&issue, "tags");
    assert_eq!(ids(&visible), vec![y.id().clone(), z.id().clone()]);

    // AND the pending views report only the deltas
    assert_eq!(ids(&session.added_links(&issue, &["tags"])), vec![z.id().clone()]);
    assert_eq!(ids(&session.removed_links(&issue, &["tags"])), vec![x.id().clone()]);
}

#[test]
fn test_scenario_02_add_then_remove_cancels() {
    // GIVEN a committed issue and an unlinked tag
    let db = open_db();
    let (issue, _) = seed_issue_with_tags(&db, 0);
    let mut seed = db.begin_session();
    let tag = seed.new_entity("Tag").unwrap();
    seed.commit().unwrap();

    // WHEN the tag is linked and unlinked in one session
    let mut session = db.begin_session();
    session.add_link(&issue, "tags", &tag).unwrap();
    session.remove_link(&issue, "tags", &tag).unwrap();

    // THEN no link record remains for the issue
    let handle = session.resolve(&issue).unwrap();
    assert!(session.tracker().link_change(handle, "tags").unwrap().is_none());
    assert!(session.tracker().changed_links(handle).unwrap().is_none());
    assert!(session.get_links(&issue, "tags").is_empty());
}

#[test]
fn test_scenario_02_remove_then_add_cancels() {
    // GIVEN an issue committed with one tag
    let db = open_db();
    let (issue, tags) = seed_issue_with_tags(&db, 1);

    // WHEN the tag is unlinked and linked again
    let mut session = db.begin_session();
    session.remove_link(&issue, "tags", &tags[0]).unwrap();
    session.add_link(&issue, "tags", &tags[0]).unwrap();

    // THEN the delta is gone and the committed link is visible
    let handle = session.resolve(&issue).unwrap();
    assert!(session.tracker().link_change(handle, "tags").unwrap().is_none());
    assert_eq!(ids(&session.get_links(&issue, "tags")), ids(&tags));
}

#[test]
fn test_scenario_02_replacing_single_link_records_both_targets() {
    // GIVEN an issue assigned to alice
    let db = open_db();
    let mut seed = db.begin_session();
    let issue = seed.new_entity("Issue").unwrap();
    let alice = seed.new_entity("User").unwrap();
    let bob = seed.new_entity("User").unwrap();
    seed.set_link(&issue, "assignee", Some(&alice)).unwrap();
    seed.commit().unwrap();

    // WHEN it is reassigned to bob
    let mut session = db.begin_session();
    session.set_link(&issue, "assignee", Some(&bob)).unwrap();

    // THEN bob is current and the delta holds both sides
    assert_eq!(session.get_link(&issue, "assignee").unwrap().id(), bob.id());
    let handle = session.resolve(&issue).unwrap();
    let change = session.tracker().change_description(handle).unwrap();
    let summary = change.link_change("assignee").unwrap();
    assert_eq!(summary.change_type, LinkChangeType::AddAndRemove);
    assert_eq!(summary.added, vec![bob.id().clone()]);
    assert_eq!(summary.removed, vec![alice.id().clone()]);
}

#[test]
fn test_scenario_02_unlinked_target_deleted_later_is_upgraded() {
    // GIVEN an issue linking to tag b
    let db = open_db();
    let (issue, tags) = seed_issue_with_tags(&db, 1);
    let b = &tags[0];

    // WHEN b is unlinked and then destroyed in the same session
    let mut session = db.begin_session();
    session.remove_link(&issue, "tags", b).unwrap();
    session.delete(b).unwrap();

    // THEN the issue's record lists b as deleted, not removed
    let handle = session.resolve(&issue).unwrap();
    let record = session.tracker().link_change(handle, "tags").unwrap().unwrap();
    assert!(record.removed().is_empty());
    assert_eq!(record.deleted().len(), 1);
    let change = session.tracker().change_description(handle).unwrap();
    assert_eq!(change.link_change("tags").unwrap().deleted, vec![b.id().clone()]);

    // AND removed-link reads still report it
    assert_eq!(ids(&session.removed_links(&issue, &["tags"])), vec![b.id().clone()]);
}

#[test]
fn test_scenario_02_clear_links_and_link_sets() {
    // GIVEN an issue with two tags and an assignee
    let db = open_db();
    let mut seed = db.begin_session();
    let issue = seed.new_entity("Issue").unwrap();
    let user = seed.new_entity("User").unwrap();
    let t1 = seed.new_entity("Tag").unwrap();
    let t2 = seed.new_entity("Tag").unwrap();
    seed.add_link(&issue, "tags", &t1).unwrap();
    seed.add_link(&issue, "tags", &t2).unwrap();
    seed.set_link(&issue, "assignee", Some(&user)).unwrap();
    seed.commit().unwrap();

    // WHEN reading across both links
    let mut session = db.begin_session();
    let all = session.get_links_from_set(&issue, &["tags", "assignee"]);

    // THEN targets are grouped by link name
    assert_eq!(
        ids(&all),
        vec![t1.id().clone(), t2.id().clone(), user.id().clone()]
    );

    // AND clearing tags leaves only the assignee
    session.clear_links(&issue, "tags").unwrap();
    assert!(session.get_links(&issue, "tags").is_empty());
    assert_eq!(session.removed_links(&issue, &["tags"]).len(), 2);
    assert_eq!(ids(&session.get_links_from_set(&issue, &["tags", "assignee"])), vec![user.id().clone()]);
}

#[test]
fn test_scenario_02_undeclared_link_is_rejected() {
    // GIVEN an issue
    let db = open_db();
    let (issue, tags) = seed_issue_with_tags(&db, 1);

    // WHEN linking through a link the model does not declare
    let mut session = db.begin_session();
    let result = session.add_link(&issue, "watchers", &tags[0]);

    // THEN the mutation fails with UnknownLink
    assert!(matches!(result, Err(TrellisError::UnknownLink { .. })));

    // AND using a single-valued link as multi-valued is invalid input
    let user = session.new_entity("User").unwrap();
    let result = session.add_link(&issue, "assignee", &user);
    assert!(matches!(result, Err(TrellisError::InvalidInput { .. })));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_link_deltas_never_contradict(
        initially_linked in proptest::collection::vec(any::<bool>(), 3),
        ops in proptest::collection::vec((0usize..3, any::<bool>()), 0..24),
    ) {
        // GIVEN three tags, some of them committed as linked
        let db = open_db();
        let mut seed = db.begin_session();
        let issue = seed.new_entity("Issue").unwrap();
        let tags: Vec<_> = (0..3).map(|_| seed.new_entity("Tag").unwrap()).collect();
        for (tag, linked) in tags.iter().zip(&initially_linked) {
            if *linked {
                seed.add_link(&issue, "tags", tag).unwrap();
            }
        }
        seed.commit().unwrap();

        // WHEN a random sequence of adds and removes runs in one session
        let mut session = db.begin_session();
        let mut model: Vec<bool> = initially_linked.clone();
        for (index, add) in &ops {
            if *add {
                session.add_link(&issue, "tags", &tags[*index]).unwrap();
            } else {
                session.remove_link(&issue, "tags", &tags[*index]).unwrap();
            }
            model[*index] = *add;
        }

        // THEN the overlay matches plain set semantics
        let expected: BTreeSet<_> = tags
            .iter()
            .zip(&model)
            .filter(|(_, linked)| **linked)
            .map(|(tag, _)| tag.id().clone())
            .collect();
        let visible: BTreeSet<_> = ids(&session.get_links(&issue, "tags")).into_iter().collect();
        prop_assert_eq!(visible, expected);

        // AND no target is both added and removed
        let handle = session.resolve(&issue).unwrap();
        let record = session.tracker().link_change(handle, "tags").unwrap().cloned();
        if let Some(record) = &record {
            for target in record.added() {
                prop_assert!(!record.removed().contains(target));
            }
        }

        // AND returning to the committed state leaves no record at all
        if model == initially_linked {
            prop_assert!(record.is_none());
        }
    }
}
