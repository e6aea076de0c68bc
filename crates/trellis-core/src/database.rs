//! Database: the store, its model metadata and listeners shared by sessions

use std::sync::{Arc, RwLock};

use crate::config::TrellisConfig;
use crate::listener::ChangeListener;
use crate::model::ModelMetadata;
use crate::session::Session;
use crate::store::MemoryStore;

struct DatabaseInner {
    store: MemoryStore,
    metadata: Arc<ModelMetadata>,
    config: TrellisConfig,
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
}

/// Cheaply cloneable handle to one database
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Open an empty in-memory database
    pub fn open(metadata: ModelMetadata, config: TrellisConfig) -> Self {
        let store = MemoryStore::new().with_history_limit(config.store.history_limit);
        tracing::debug!(
            history_limit = config.store.history_limit,
            "database opened"
        );
        Self {
            inner: Arc::new(DatabaseInner {
                store,
                metadata: Arc::new(metadata),
                config,
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Start a transaction over the current committed state
    pub fn begin_session(&self) -> Session {
        Session::begin(self.clone())
    }

    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) {
        self.inner
            .listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    pub(crate) fn listeners(&self) -> Vec<Arc<dyn ChangeListener>> {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn store(&self) -> &MemoryStore {
        &self.inner.store
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.inner.metadata
    }

    pub(crate) fn metadata_arc(&self) -> Arc<ModelMetadata> {
        Arc::clone(&self.inner.metadata)
    }

    pub fn config(&self) -> &TrellisConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("store", &self.inner.store)
            .field("metadata", &self.inner.metadata)
            .field("config", &self.inner.config)
            .finish()
    }
}
