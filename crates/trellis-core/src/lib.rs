//! Trellis Core - transactional change tracking and cascade deletes
//!
//! This crate sits between application code and a versioned entity store,
//! including:
//! - A per-session Change Tracker with property and link deltas
//! - A Link Delta Overlay reading committed links through pending changes
//! - A Cascade Delete Engine driven by per-link on-delete policies
//! - A Versioning Facade over the store's version chains
//! - A thin session/database layer and commit-time change listeners
//!
//! Stale or absent entity references are never errors: reads return neutral
//! values and mutations are no-ops.

pub mod cascade;
pub mod config;
pub mod database;
pub mod errors;
pub mod listener;
pub mod logging_facility;
pub mod model;
pub mod overlay;
pub mod session;
pub mod store;
pub mod tracker;
pub mod versioning;

pub use trellis_core_types;

// Re-export commonly used types
pub use config::TrellisConfig;
pub use database::Database;
pub use errors::{ExError, ExErrorKind, Result, TrellisError};
pub use listener::ChangeListener;
pub use model::{
    AssociationEnd, Cardinality, EntityMetadata, EntityRef, EntityVersion, ModelMetadata,
    OnDeletePolicy, PropertyValue,
};
pub use session::{CommitReport, Handle, Session, SessionState};
pub use store::{MemoryStore, StoreSnapshot};
pub use tracker::{ChangeDescription, ChangesTracker, EntityChangeType, LinkChange, LinkChangeType};
pub use trellis_core_types::EntityId;
