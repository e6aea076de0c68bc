//! Change listeners notified after a successful commit

use std::sync::Arc;

use crate::session::CommitReport;
use crate::tracker::ChangeDescription;

/// Receiver of committed change descriptions
pub trait ChangeListener: Send + Sync {
    /// Entity types this listener wants; `None` means all of them
    fn entity_types(&self) -> Option<Vec<String>> {
        None
    }

    /// Called once per commit with the changes of the listener's types
    fn entities_changed(&self, changes: &[ChangeDescription]);
}

/// Hand each listener the slice of `report` it subscribed to
///
/// Listeners none of whose types appear in the report's affected types are
/// skipped without looking at the descriptions. An empty commit
/// reaches every listener only when `notify_empty` is set.
pub(crate) fn dispatch(listeners: &[Arc<dyn ChangeListener>], report: &CommitReport, notify_empty: bool) {
    if report.is_empty() {
        if notify_empty {
            for listener in listeners {
                listener.entities_changed(&[]);
            }
        }
        return;
    }

    for listener in listeners {
        let changes: Vec<ChangeDescription> = match listener.entity_types() {
            None => report.changes.clone(),
            Some(types) if !types.iter().any(|t| report.affected_types.contains(t)) => continue,
            Some(types) => report
                .changes
                .iter()
                .filter(|c| types.iter().any(|t| t == c.entity_type()))
                .cloned()
                .collect(),
        };
        if !changes.is_empty() {
            listener.entities_changed(&changes);
        }
    }
    tracing::debug!(listeners = listeners.len(), "commit listeners notified");
}
