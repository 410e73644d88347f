//! Identity cache.
//!
//! Resolves tracker-local user ids to identity rows, memoizing the result
//! so a busy reporter is looked up once per run rather than once per
//! comment. Shared by every tracker worker.
//!
//! Resolution happens inside a unit of work. Rows created or backfilled
//! there are staged and only enter the cache through [`IdentityCache::commit`]
//! after the unit commits, so a rolled-back unit never leaves the cache
//! pointing at rows that do not exist.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::Result;
use crate::model::Identity;
use crate::persist::keys::identity_key;
use crate::storage::{Collection, StoreTx};

type CacheKey = (i64, String);

/// A resolved identity and the row that stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedIdentity {
    pub row_id: i64,
    pub identity: Identity,
}

/// Identities resolved by a unit of work that has not committed yet.
#[derive(Debug, Default)]
pub struct StagedIdentities {
    entries: HashMap<CacheKey, CachedIdentity>,
}

impl StagedIdentities {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Concurrent memo of `(tracker, user_id)` → identity row.
#[derive(Debug, Default)]
pub struct IdentityCache {
    entries: RwLock<HashMap<CacheKey, CachedIdentity>>,
}

impl IdentityCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached entry for a user, if any.
    #[must_use]
    pub fn get(&self, tracker_row: i64, user_id: &str) -> Option<CachedIdentity> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(tracker_row, user_id.to_string()))
            .cloned()
    }

    /// Number of cached identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve `identity` to a row id, creating or backfilling the row.
    ///
    /// Name and email are filled in when the stored record lacks them;
    /// known values are never overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lookup or write fails.
    pub fn resolve(
        &self,
        tx: &mut dyn StoreTx,
        tracker_row: i64,
        identity: &Identity,
        staged: &mut StagedIdentities,
    ) -> Result<i64> {
        let cache_key = (tracker_row, identity.user_id.clone());

        let known = match staged.entries.get(&cache_key) {
            Some(entry) => Some(entry.clone()),
            None => self.get(tracker_row, &identity.user_id),
        };

        if let Some(mut entry) = known {
            if entry.identity.backfill(identity) {
                tx.update(
                    Collection::Identities,
                    entry.row_id,
                    &serde_json::to_value(&entry.identity)?,
                )?;
                staged.entries.insert(cache_key, entry.clone());
            }
            return Ok(entry.row_id);
        }

        let key = identity_key(tracker_row, &identity.user_id);
        let entry = match tx.find_by_key(Collection::Identities, &key)? {
            Some(record) => {
                let mut stored: Identity = serde_json::from_value(record.body)?;
                if stored.backfill(identity) {
                    tx.update(Collection::Identities, record.id, &serde_json::to_value(&stored)?)?;
                }
                CachedIdentity {
                    row_id: record.id,
                    identity: stored,
                }
            }
            None => {
                let row_id = tx.insert(
                    Collection::Identities,
                    &key,
                    Some(tracker_row),
                    &serde_json::to_value(identity)?,
                )?;
                tracing::trace!(user_id = %identity.user_id, row_id, "Created identity");
                CachedIdentity {
                    row_id,
                    identity: identity.clone(),
                }
            }
        };

        let row_id = entry.row_id;
        staged.entries.insert(cache_key, entry);
        Ok(row_id)
    }

    /// Publish identities from a committed unit of work.
    pub fn commit(&self, staged: StagedIdentities) {
        if staged.is_empty() {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.extend(staged.entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SqliteStore, Store};
    use serde_json::json;

    fn tracker(store: &SqliteStore) -> i64 {
        store
            .transaction("test", |tx| {
                tx.insert(Collection::Trackers, "tracker:test", None, &json!({}))
            })
            .unwrap()
    }

    #[test]
    fn test_resolve_creates_once() {
        let store = SqliteStore::open_memory().unwrap();
        let cache = IdentityCache::new();
        let t = tracker(&store);

        let mut staged = StagedIdentities::default();
        let (a, b) = store
            .transaction("test", |tx| {
                let a = cache.resolve(tx, t, &Identity::new("alice"), &mut staged)?;
                let b = cache.resolve(tx, t, &Identity::new("alice"), &mut staged)?;
                Ok((a, b))
            })
            .unwrap();
        cache.commit(staged);

        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
        assert_eq!(store.read(|tx| tx.count(Collection::Identities, None)).unwrap(), 1);
    }

    #[test]
    fn test_backfill_updates_row() {
        let store = SqliteStore::open_memory().unwrap();
        let cache = IdentityCache::new();
        let t = tracker(&store);

        for identity in [
            Identity::new("bob").with_name(Some("Bob")),
            Identity::new("bob").with_email(Some("bob@example.org")),
            Identity::new("bob").with_name(Some("Robert")),
        ] {
            let mut staged = StagedIdentities::default();
            store
                .transaction("test", |tx| cache.resolve(tx, t, &identity, &mut staged))
                .unwrap();
            cache.commit(staged);
        }

        let stored = cache.get(t, "bob").unwrap();
        assert_eq!(stored.identity.name.as_deref(), Some("Bob"));
        assert_eq!(stored.identity.email.as_deref(), Some("bob@example.org"));

        let body = store
            .read(|tx| Ok(tx.get(Collection::Identities, stored.row_id)?.unwrap().body))
            .unwrap();
        assert_eq!(body["email"], "bob@example.org");
        assert_eq!(body["name"], "Bob");
    }

    #[test]
    fn test_rolled_back_unit_is_not_cached() {
        let store = SqliteStore::open_memory().unwrap();
        let cache = IdentityCache::new();
        let t = tracker(&store);

        let mut staged = StagedIdentities::default();
        let result: Result<()> = store.transaction("test", |tx| {
            cache.resolve(tx, t, &Identity::new("carol"), &mut staged)?;
            Err(crate::Error::Other("boom".into()))
        });
        assert!(result.is_err());
        // Staged entries are dropped instead of committed.
        drop(staged);

        assert!(cache.get(t, "carol").is_none());
        assert_eq!(store.read(|tx| tx.count(Collection::Identities, None)).unwrap(), 0);
    }

    #[test]
    fn test_identities_are_per_tracker() {
        let store = SqliteStore::open_memory().unwrap();
        let cache = IdentityCache::new();
        let t1 = tracker(&store);
        let t2 = store
            .transaction("test", |tx| tx.insert(Collection::Trackers, "tracker:other", None, &json!({})))
            .unwrap();

        let mut staged = StagedIdentities::default();
        let (a, b) = store
            .transaction("test", |tx| {
                Ok((
                    cache.resolve(tx, t1, &Identity::new("dave"), &mut staged)?,
                    cache.resolve(tx, t2, &Identity::new("dave"), &mut staged)?,
                ))
            })
            .unwrap();
        assert_ne!(a, b);
    }
}
