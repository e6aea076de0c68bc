//! Commit: turn the tracker's ledger into one atomic store write

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use serde::Serialize;
use sha2::{Digest, Sha256};
use trellis_core_types::{EntityId, SessionId};

use super::{Session, SessionState};
use crate::errors::{ExError, Result};
use crate::store::{CommitBatch, CommitEntry};
use crate::tracker::ChangeDescription;
use crate::{listener, log_op_end, log_op_error, log_op_start};

/// Outcome of a successful commit
#[derive(Debug, Clone, Serialize)]
pub struct CommitReport {
    pub session_id: SessionId,
    /// Store commit sequence written, `None` when there was nothing to write
    pub commit_seq: Option<u64>,
    pub change_count: usize,
    /// Entity types touched by the session
    pub affected_types: BTreeSet<String>,
    pub changes: Vec<ChangeDescription>,
    /// Hex SHA-256 of the canonical JSON of `changes`
    pub changeset_digest: String,
}

impl CommitReport {
    pub fn is_empty(&self) -> bool {
        self.change_count == 0
    }
}

/// Compute the digest of an ordered change set
///
/// Order-sensitive: the same changes in another order hash differently.
///
/// # Errors
/// Returns `Serialization` if JSON encoding fails.
pub fn changeset_digest(changes: &[ChangeDescription]) -> Result<String> {
    let canonical = serde_json::to_string(changes)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

impl Session {
    /// Write every buffered change to the store and notify listeners
    ///
    /// On failure the session is aborted and nothing is written.
    ///
    /// # Errors
    /// * `SessionNotActive` - the session already finished
    /// * `CommitConflict` - another session committed a newer version of a changed entity
    pub fn commit(mut self) -> Result<CommitReport> {
        self.ensure_active()?;
        let started = Instant::now();
        log_op_start!("session_commit", session_id = %self.id);

        match self.write_changes() {
            Ok(report) => {
                log_op_end!(
                    "session_commit",
                    duration_ms = started.elapsed().as_millis() as u64,
                    session_id = %self.id,
                    change_count = report.change_count
                );
                listener::dispatch(
                    &self.db.listeners(),
                    &report,
                    self.db.config().listeners.notify_empty_commits,
                );
                Ok(report)
            }
            Err(err) => {
                log_op_error!(
                    "session_commit",
                    ExError::from(err.clone()).with_session_id(self.id),
                    duration_ms = started.elapsed().as_millis() as u64
                );
                self.finish(SessionState::Aborted);
                Err(err)
            }
        }
    }

    fn write_changes(&mut self) -> Result<CommitReport> {
        let changes = self.tracker.all_change_descriptions()?;
        let change_count = self.tracker.change_count()?;
        let affected_types = self.tracker.affected_types()?.clone();

        let commit_seq = if change_count == 0 {
            None
        } else {
            let batch = self.build_batch()?;
            Some(self.db.store().apply(batch)?)
        };
        let changeset_digest = changeset_digest(&changes)?;

        self.finish(SessionState::Committed);
        Ok(CommitReport {
            session_id: self.id,
            commit_seq,
            change_count,
            affected_types,
            changes,
            changeset_digest,
        })
    }

    fn removed_here(&self, id: &EntityId) -> bool {
        let handles = self.tracker.handles();
        handles.lookup(id).is_some_and(|h| handles.is_removed(h))
    }

    fn build_batch(&self) -> Result<CommitBatch> {
        let handles = self.tracker.handles();
        let snapshot = self.tracker.snapshot()?;
        let mut entries = Vec::new();

        for &handle in self.tracker.changed_entities()? {
            if self.tracker.was_created_and_removed(handle)? {
                continue;
            }
            let Some(id) = handles.id(handle) else {
                continue;
            };
            let base_version = handles.version(handle).unwrap_or(0);
            if self.tracker.is_removed(handle)? {
                entries.push(CommitEntry::Remove {
                    id: id.clone(),
                    base_version,
                });
                continue;
            }

            let is_new = handles.is_new(handle);
            let committed = if is_new { None } else { snapshot.entity(id) };

            let mut properties = committed
                .as_ref()
                .map(|v| v.properties.clone())
                .unwrap_or_default();
            if let Some(pending) = self.properties.get(&handle) {
                for (name, value) in pending {
                    match value {
                        Some(value) => {
                            properties.insert(name.clone(), value.clone());
                        }
                        None => {
                            properties.remove(name);
                        }
                    }
                }
            }

            let mut link_names: BTreeSet<String> = committed
                .map(|v| v.links.into_keys().collect())
                .unwrap_or_default();
            if let Some(changed) = self.tracker.changed_links(handle)? {
                link_names.extend(changed.keys().cloned());
            }
            let mut links = BTreeMap::new();
            for name in link_names {
                let targets: Vec<EntityId> = self
                    .link_ids(handle, &[name.as_str()])
                    .into_iter()
                    .filter(|target| !self.removed_here(target))
                    .collect();
                if !targets.is_empty() {
                    links.insert(name, targets);
                }
            }

            entries.push(if is_new {
                CommitEntry::Create {
                    id: id.clone(),
                    properties,
                    links,
                }
            } else {
                CommitEntry::Update {
                    id: id.clone(),
                    base_version,
                    properties,
                    links,
                }
            });
        }

        Ok(CommitBatch { entries })
    }
}
