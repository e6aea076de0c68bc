//! Core types shared across the trellis crates
//!
//! This crate provides the identifiers and constants that every other
//! trellis crate agrees on:
//!
//! - **Identity**: `EntityId`, the store's identity rule for logical records
//! - **Correlation types**: `SessionId`
//! - **Schema constants**: canonical structured-log field keys and event names

pub mod correlation;
pub mod ident;
pub mod schema;

pub use correlation::SessionId;
pub use ident::EntityId;
