#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{open_db, seed_issue_with_tags};
use trellis_core::errors::{ExErrorKind, TrellisError};
use trellis_core::logging_facility::test_capture::init_test_capture;
use trellis_core::trellis_core_types::schema::{
    EVENT_END, EVENT_END_ERROR, EVENT_START, FIELD_CHANGE_COUNT, FIELD_COMPONENT,
    FIELD_DURATION_MS, FIELD_ENTITY, FIELD_ERR_CODE, FIELD_ERR_KIND, FIELD_LINK_NAME,
    FIELD_SESSION_ID,
};
use trellis_core::{log_op_end, log_op_error, log_op_start};

#[test]
fn test_log_op_start_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_start_unique_1";

    log_op_start!(op_name);

    capture.assert_event_exists(op_name, EVENT_START);
}

#[test]
fn test_log_op_end_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_end_unique_2";

    log_op_end!(op_name, duration_ms = 42);

    let end_events: Vec<_> = capture
        .events_for_op(op_name)
        .into_iter()
        .filter(|e| e.event.as_deref() == Some(EVENT_END))
        .collect();
    assert_eq!(end_events.len(), 1, "Should have exactly one end event");
    assert_eq!(end_events[0].fields.get(FIELD_DURATION_MS), Some(&"42".to_string()));
}

#[test]
fn test_log_op_error_includes_kind_and_code() {
    let capture = init_test_capture();
    let op_name = "test_log_op_error_unique_3";

    let err = TrellisError::TrackerDisposed {
        op: "snapshot".to_string(),
    };
    log_op_error!(op_name, err, duration_ms = 7);

    let events = capture.events_for_op(op_name);
    let error_event = events
        .iter()
        .find(|e| e.event.as_deref() == Some(EVENT_END_ERROR))
        .expect("Should have an end_error event");
    assert_eq!(
        error_event.fields.get(FIELD_ERR_CODE),
        Some(&"ERR_INVALID_STATE".to_string())
    );
    assert_eq!(
        error_event.fields.get(FIELD_ERR_KIND),
        Some(&format!("{:?}", ExErrorKind::InvalidState))
    );
}

#[test]
fn test_commit_and_delete_emit_boundary_events() {
    let capture = init_test_capture();
    let db = open_db();
    let (_, tags) = seed_issue_with_tags(&db, 1);

    let mut session = db.begin_session();
    session.delete(&tags[0]).unwrap();
    session.commit().unwrap();

    capture.assert_event_exists("entity_delete", EVENT_START);
    capture.assert_event_exists("entity_delete", EVENT_END);
    capture.assert_event_exists("session_commit", EVENT_START);
    capture.assert_event_exists("session_commit", EVENT_END);
}

#[test]
fn test_blocked_delete_emits_error_code() {
    let capture = init_test_capture();
    let db = open_db();
    let mut seed = db.begin_session();
    let issue = seed.new_entity("Issue").unwrap();
    let reviewer = seed.new_entity("User").unwrap();
    seed.set_link(&issue, "reviewer", Some(&reviewer)).unwrap();
    seed.commit().unwrap();

    let mut session = db.begin_session();
    assert!(session.delete(&reviewer).is_err());

    let blocked = capture.count_events(|e| {
        e.op.as_deref() == Some("entity_delete")
            && e.event.as_deref() == Some(EVENT_END_ERROR)
            && e.fields.get(FIELD_ERR_CODE).map(String::as_str) == Some("ERR_CONSTRAINT_VIOLATION")
    });
    assert!(blocked >= 1);
}

#[test]
fn test_dropped_session_logs_abort() {
    let capture = init_test_capture();
    let db = open_db();
    {
        let mut session = db.begin_session();
        session.new_entity("Issue").unwrap();
    }

    capture.assert_event_exists("session_abort", EVENT_END);
}

#[test]
fn test_boundary_events_carry_context_fields() {
    let capture = init_test_capture();
    let db = open_db();
    let (_, tags) = seed_issue_with_tags(&db, 2);

    let mut session = db.begin_session();
    session.delete(&tags[1]).unwrap();
    let report = session.commit().unwrap();

    let tag_id = tags[1].id().to_string();
    let delete_end = capture.count_events(|e| {
        e.op.as_deref() == Some("entity_delete")
            && e.event.as_deref() == Some(EVENT_END)
            && e.fields.get(FIELD_ENTITY) == Some(&tag_id)
            && e.fields.get(FIELD_COMPONENT).map(String::as_str) == Some("trellis_core::cascade")
    });
    assert!(delete_end >= 1);

    let session_id = report.session_id.to_string();
    let commit_end = capture.count_events(|e| {
        e.op.as_deref() == Some("session_commit")
            && e.event.as_deref() == Some(EVENT_END)
            && e.fields.get(FIELD_SESSION_ID) == Some(&session_id)
    });
    assert_eq!(commit_end, 1);
    let counted = capture.count_events(|e| {
        e.op.as_deref() == Some("session_commit")
            && e.fields.get(FIELD_SESSION_ID) == Some(&session_id)
            && e.fields.get(FIELD_CHANGE_COUNT).map(String::as_str) == Some("2")
    });
    assert_eq!(counted, 1);
}

#[test]
fn test_blocked_delete_error_carries_link_and_session() {
    let capture = init_test_capture();
    let db = open_db();
    let mut seed = db.begin_session();
    let issue = seed.new_entity("Issue").unwrap();
    let reviewer = seed.new_entity("User").unwrap();
    seed.set_link(&issue, "reviewer", Some(&reviewer)).unwrap();
    seed.commit().unwrap();

    let mut session = db.begin_session();
    let session_id = session.id().to_string();
    assert!(session.delete(&reviewer).is_err());

    let matched = capture.count_events(|e| {
        e.op.as_deref() == Some("entity_delete")
            && e.event.as_deref() == Some(EVENT_END_ERROR)
            && e.fields.get(FIELD_SESSION_ID) == Some(&session_id)
            && e.fields.get(FIELD_LINK_NAME).map(String::as_str) == Some("reviewer")
    });
    assert_eq!(matched, 1);
}
