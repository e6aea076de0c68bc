use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use trellis_core_types::EntityId;

use super::StoreSnapshot;
use crate::errors::{Result, TrellisError};
use crate::model::{EntityVersion, PropertyValue};

/// In-memory multi-version store
///
/// Each entity owns an append-only chain of versions tagged with the commit
/// sequence that wrote them. Snapshots see every version with a sequence at
/// or below their `as_of`. Cloning the store clones a handle to the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
    open_snapshots: Arc<AtomicUsize>,
    history_limit: usize,
}

#[derive(Debug, Default)]
struct StoreState {
    commit_seq: u64,
    chains: HashMap<EntityId, Vec<StoredVersion>>,
    next_ids: HashMap<String, u64>,
}

#[derive(Debug, Clone)]
struct StoredVersion {
    commit_seq: u64,
    record: EntityVersion,
}

/// One entity write inside a commit
#[derive(Debug, Clone, PartialEq)]
pub enum CommitEntry {
    /// First version of an entity created in the committing session
    Create {
        id: EntityId,
        properties: BTreeMap<String, PropertyValue>,
        links: BTreeMap<String, Vec<EntityId>>,
    },
    /// Replacement state for an entity read at `base_version`
    Update {
        id: EntityId,
        base_version: i64,
        properties: BTreeMap<String, PropertyValue>,
        links: BTreeMap<String, Vec<EntityId>>,
    },
    /// Tombstone for an entity read at `base_version`
    Remove { id: EntityId, base_version: i64 },
}

impl CommitEntry {
    pub fn id(&self) -> &EntityId {
        match self {
            CommitEntry::Create { id, .. }
            | CommitEntry::Update { id, .. }
            | CommitEntry::Remove { id, .. } => id,
        }
    }
}

/// All writes of one session, applied atomically
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitBatch {
    pub entries: Vec<CommitEntry>,
}

impl CommitBatch {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of prior versions returned by history queries (0 = unlimited)
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Reserve a fresh id for a new entity of `entity_type`
    ///
    /// Ids are store-wide, so concurrent sessions never collide. Ids of
    /// entities that are never committed are simply skipped.
    pub fn allocate_id(&self, entity_type: &str) -> EntityId {
        let mut state = self.write();
        let next = state.next_ids.entry(entity_type.to_string()).or_insert(0);
        *next += 1;
        EntityId::new(entity_type, *next)
    }

    /// Open a read view at the latest commit
    pub fn begin_snapshot(&self) -> MemorySnapshot {
        let as_of = self.read().commit_seq;
        self.open_snapshots.fetch_add(1, Ordering::SeqCst);
        MemorySnapshot {
            store: self.clone(),
            as_of,
            released: false,
        }
    }

    /// Number of snapshots opened and not yet released
    pub fn open_snapshot_count(&self) -> usize {
        self.open_snapshots.load(Ordering::SeqCst)
    }

    /// Sequence number of the latest commit
    pub fn head_seq(&self) -> u64 {
        self.read().commit_seq
    }

    /// Latest committed version of an entity, tombstones included
    pub fn head(&self, id: &EntityId) -> Option<EntityVersion> {
        self.read()
            .chains
            .get(id)
            .and_then(|chain| chain.last())
            .map(|v| v.record.clone())
    }

    /// Apply a batch atomically and return the new commit sequence
    ///
    /// # Errors
    /// * `CommitConflict` - an updated or removed entity changed since `base_version`
    /// * `Internal` - a created entity id already has a version chain
    pub fn apply(&self, batch: CommitBatch) -> Result<u64> {
        let mut state = self.write();

        for entry in &batch.entries {
            match entry {
                CommitEntry::Create { id, .. } => {
                    if state.chains.contains_key(id) {
                        return Err(TrellisError::Internal {
                            message: format!("entity {} already exists in store", id),
                        });
                    }
                }
                CommitEntry::Update {
                    id, base_version, ..
                }
                | CommitEntry::Remove { id, base_version } => {
                    let head = state
                        .chains
                        .get(id)
                        .and_then(|chain| chain.last())
                        .ok_or_else(|| TrellisError::EntityNotFound {
                            entity: id.to_string(),
                        })?;
                    if head.record.version != *base_version || head.record.removed {
                        return Err(TrellisError::CommitConflict {
                            entity: id.to_string(),
                            expected_version: *base_version,
                            actual_version: head.record.version,
                        });
                    }
                }
            }
        }

        state.commit_seq += 1;
        let commit_seq = state.commit_seq;
        let committed_at = Utc::now();

        for entry in batch.entries {
            let record = match entry {
                CommitEntry::Create {
                    id,
                    properties,
                    links,
                } => EntityVersion {
                    id,
                    version: 0,
                    removed: false,
                    properties,
                    links,
                    committed_at,
                },
                CommitEntry::Update {
                    id,
                    base_version,
                    properties,
                    links,
                } => EntityVersion {
                    id,
                    version: base_version + 1,
                    removed: false,
                    properties,
                    links,
                    committed_at,
                },
                CommitEntry::Remove { id, base_version } => EntityVersion {
                    id,
                    version: base_version + 1,
                    removed: true,
                    properties: BTreeMap::new(),
                    links: BTreeMap::new(),
                    committed_at,
                },
            };
            state
                .chains
                .entry(record.id.clone())
                .or_default()
                .push(StoredVersion { commit_seq, record });
        }

        Ok(commit_seq)
    }
}

/// Read view over a `MemoryStore` at a fixed commit sequence
#[derive(Debug)]
pub struct MemorySnapshot {
    store: MemoryStore,
    as_of: u64,
    released: bool,
}

impl MemorySnapshot {
    fn visible<'a>(&self, chain: &'a [StoredVersion]) -> &'a [StoredVersion] {
        let end = chain.partition_point(|v| v.commit_seq <= self.as_of);
        &chain[..end]
    }
}

impl StoreSnapshot for MemorySnapshot {
    fn as_of(&self) -> u64 {
        self.as_of
    }

    fn entity(&self, id: &EntityId) -> Option<EntityVersion> {
        let state = self.store.read();
        let chain = state.chains.get(id)?;
        self.visible(chain)
            .last()
            .filter(|v| !v.record.removed)
            .map(|v| v.record.clone())
    }

    fn incoming(&self, target: &EntityId, source_type: &str, link_name: &str) -> Vec<EntityId> {
        let state = self.store.read();
        let mut sources: Vec<EntityId> = state
            .chains
            .iter()
            .filter(|(id, _)| id.entity_type() == source_type)
            .filter_map(|(id, chain)| {
                let current = self.visible(chain).last()?;
                let linked = !current.record.removed
                    && current.record.links(link_name).contains(target);
                linked.then(|| id.clone())
            })
            .collect();
        sources.sort();
        sources
    }

    fn history(&self, id: &EntityId) -> Vec<EntityVersion> {
        let state = self.store.read();
        let Some(chain) = state.chains.get(id) else {
            return Vec::new();
        };
        let visible = self.visible(chain);
        let prior = visible.len().saturating_sub(1);
        let limit = match self.store.history_limit {
            0 => prior,
            n => n.min(prior),
        };
        visible[..prior]
            .iter()
            .rev()
            .take(limit)
            .map(|v| v.record.clone())
            .collect()
    }

    fn next_version(&self, id: &EntityId, version: i64) -> Option<EntityVersion> {
        let state = self.store.read();
        state
            .chains
            .get(id)?
            .iter()
            .find(|v| v.record.version > version)
            .filter(|v| !v.record.removed)
            .map(|v| v.record.clone())
    }

    fn abort(&mut self) {
        if !self.released {
            self.released = true;
            self.store.open_snapshots.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for MemorySnapshot {
    fn drop(&mut self) {
        self.abort();
    }
}
