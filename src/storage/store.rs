//! Key-addressable store interface.
//!
//! The persistence layer only needs three things from a storage engine:
//! look a record up by its dedup key, insert it, and update it in place,
//! all inside an atomic unit of work. Bodies are JSON documents so the
//! engine stays ignorant of the entity model.

use serde_json::Value;

use crate::error::Result;

/// A family of records sharing one key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Trackers,
    Identities,
    Issues,
    Comments,
    Attachments,
    Changes,
    Watchers,
    Extensions,
}

impl Collection {
    pub const ALL: [Self; 8] = [
        Self::Trackers,
        Self::Identities,
        Self::Issues,
        Self::Comments,
        Self::Attachments,
        Self::Changes,
        Self::Watchers,
        Self::Extensions,
    ];

    /// Table name in the SQLite implementation.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Trackers => "trackers",
            Self::Identities => "identities",
            Self::Issues => "issues",
            Self::Comments => "comments",
            Self::Attachments => "attachments",
            Self::Changes => "changes",
            Self::Watchers => "watchers",
            Self::Extensions => "extensions",
        }
    }

    /// Collection whose rows own rows of this one.
    #[must_use]
    pub const fn parent(&self) -> Option<Self> {
        match self {
            Self::Trackers => None,
            Self::Identities | Self::Issues => Some(Self::Trackers),
            Self::Comments | Self::Attachments | Self::Changes | Self::Watchers | Self::Extensions => {
                Some(Self::Issues)
            }
        }
    }
}

/// A stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: i64,
    pub key: String,
    pub parent_id: Option<i64>,
    pub body: Value,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Unix milliseconds.
    pub updated_at: i64,
}

/// Operations available inside a unit of work.
pub trait StoreTx {
    /// Look a record up by its dedup key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the body is not valid JSON.
    fn find_by_key(&self, collection: Collection, key: &str) -> Result<Option<StoredRecord>>;

    /// Look a record up by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the body is not valid JSON.
    fn get(&self, collection: Collection, id: i64) -> Result<Option<StoredRecord>>;

    /// Insert a new record and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the key already exists or the parent is missing.
    fn insert(
        &mut self,
        collection: Collection,
        key: &str,
        parent_id: Option<i64>,
        body: &Value,
    ) -> Result<i64>;

    /// Replace the body of an existing record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not exist or the write fails.
    fn update(&mut self, collection: Collection, id: i64, body: &Value) -> Result<()>;

    /// Records of a collection, optionally restricted to one parent, in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn list(&self, collection: Collection, parent_id: Option<i64>) -> Result<Vec<StoredRecord>>;

    /// Number of records in a collection, optionally restricted to one parent.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn count(&self, collection: Collection, parent_id: Option<i64>) -> Result<usize>;
}

/// A storage engine offering atomic units of work.
pub trait Store: Send + Sync {
    /// Run `f` inside a write transaction.
    ///
    /// Commits when `f` returns `Ok`; rolls back otherwise, leaving no
    /// partial writes behind.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or an error if the transaction cannot
    /// begin or commit.
    fn transaction<R, F>(&self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<R>;

    /// Run read-only queries against a consistent snapshot.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or an error if the snapshot cannot be taken.
    fn read<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&dyn StoreTx) -> Result<R>;
}
