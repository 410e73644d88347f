//! Storage layer for issuecrawl.
//!
//! The persistence layer talks to a generic key-addressable store
//! ([`Store`]); SQLite is the shipped implementation:
//! - WAL mode for concurrent reads
//! - IMMEDIATE transactions for atomic units of work
//! - One table per collection with a unique dedup key
//!
//! # Submodules
//!
//! - [`store`] - Store and unit-of-work traits
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - SQLite implementation

pub mod schema;
pub mod sqlite;
pub mod store;

pub use sqlite::SqliteStore;
pub use store::{Collection, Store, StoreTx, StoredRecord};
