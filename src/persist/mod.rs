//! Idempotent persistence layer.
//!
//! [`Persister::upsert_issue`] writes one issue with all its comments,
//! attachments, changes, watchers and extension fields as a single unit of
//! work. The issue row itself is last-write-wins except for the submitter
//! fields, which keep the values stored at creation. Child records are
//! insert-only and deduplicated by [`keys`], so re-running a crawl over
//! already stored data writes nothing new.
//!
//! Upserts of the same issue are serialized; different issues proceed
//! independently up to the store's own write lock.

pub mod keys;
pub mod rows;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::identity::{IdentityCache, StagedIdentities};
use crate::model::{Issue, Tracker};
use crate::storage::{Collection, Store, StoreTx};

use self::keys::{
    attachment_key, change_key, comment_key, extension_key, issue_key, tracker_key, watcher_key,
};
use self::rows::{AttachmentRow, ChangeRow, CommentRow, IssueRow, WatcherRow};

/// Insert statistics for one kind of child record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityStats {
    /// Number of new records inserted.
    pub inserted: usize,
    /// Number of records already present under the same dedup key.
    pub skipped: usize,
}

impl EntityStats {
    /// Total records processed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.inserted + self.skipped
    }

    pub fn add(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.skipped += other.skipped;
    }
}

/// Result of one issue upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    pub issue_row: i64,
    /// True if the issue row did not exist before.
    pub created: bool,
    pub comments: EntityStats,
    pub attachments: EntityStats,
    pub changes: EntityStats,
    pub watchers: EntityStats,
}

/// Per-tracker counts for status output.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerOverview {
    pub row: i64,
    pub tracker: Tracker,
    pub issues: usize,
    pub identities: usize,
}

/// Writes the entity model to a [`Store`].
pub struct Persister<S: Store> {
    store: Arc<S>,
    identities: Arc<IdentityCache>,
    issue_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: Store> Persister<S> {
    pub fn new(store: Arc<S>, identities: Arc<IdentityCache>) -> Self {
        Self {
            store,
            identities,
            issue_locks: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    #[must_use]
    pub fn identities(&self) -> &Arc<IdentityCache> {
        &self.identities
    }

    /// Load the stored tracker row for `(url, backend)`, creating it if absent.
    ///
    /// A newly reported backend version replaces the stored one; the
    /// checkpoint always comes from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the stored body is unreadable.
    pub fn ensure_tracker(&self, tracker: &Tracker) -> Result<(i64, Tracker)> {
        let key = tracker_key(&tracker.backend_name, &tracker.url);
        self.store.transaction("ensure_tracker", |tx| {
            match tx.find_by_key(Collection::Trackers, &key)? {
                Some(record) => {
                    let mut stored: Tracker = serde_json::from_value(record.body)?;
                    if tracker.backend_version.is_some()
                        && tracker.backend_version != stored.backend_version
                    {
                        stored.backend_version.clone_from(&tracker.backend_version);
                        tx.update(Collection::Trackers, record.id, &serde_json::to_value(&stored)?)?;
                    }
                    Ok((record.id, stored))
                }
                None => {
                    let id = tx.insert(
                        Collection::Trackers,
                        &key,
                        None,
                        &serde_json::to_value(tracker)?,
                    )?;
                    tracing::info!(url = %tracker.url, backend = %tracker.backend_name, "Registered tracker");
                    Ok((id, tracker.clone()))
                }
            }
        })
    }

    /// Persist a tracker row (checkpoint, last sync time).
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn save_tracker(&self, row: i64, tracker: &Tracker) -> Result<()> {
        let body = serde_json::to_value(tracker)?;
        self.store
            .transaction("save_tracker", |tx| tx.update(Collection::Trackers, row, &body))
    }

    /// Stored last-update time of an issue, if the issue is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn stored_issue_update(
        &self,
        tracker_row: i64,
        issue_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let key = issue_key(tracker_row, issue_id);
        self.store.read(|tx| {
            tx.find_by_key(Collection::Issues, &key)?
                .map(|record| serde_json::from_value::<IssueRow>(record.body))
                .transpose()
                .map(|row| row.and_then(|r| r.updated_on))
                .map_err(Into::into)
        })
    }

    /// Upsert an issue and all its children in one unit of work.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails; nothing of the issue is stored
    /// in that case.
    pub fn upsert_issue(&self, tracker_row: i64, issue: &Issue) -> Result<UpsertOutcome> {
        let key = issue_key(tracker_row, &issue.issue_id);
        let lock = self.issue_lock(&key);
        let written = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            let mut staged = StagedIdentities::default();
            let written = self.store.transaction("upsert_issue", |tx| {
                self.write_issue(tx, tracker_row, &key, issue, &mut staged)
            });
            if written.is_ok() {
                self.identities.commit(staged);
            }
            written
        };
        self.release_issue_lock(&key, &lock);
        let outcome = written?;

        tracing::debug!(
            issue_id = %issue.issue_id,
            created = outcome.created,
            new_changes = outcome.changes.inserted,
            new_comments = outcome.comments.inserted,
            "Persisted issue"
        );
        Ok(outcome)
    }

    fn write_issue(
        &self,
        tx: &mut dyn StoreTx,
        tracker_row: i64,
        key: &str,
        issue: &Issue,
        staged: &mut StagedIdentities,
    ) -> Result<UpsertOutcome> {
        let cache = &self.identities;
        let submitted_by = cache.resolve(tx, tracker_row, &issue.submitted_by, staged)?;
        let assigned_to = match &issue.assigned_to {
            Some(identity) => Some(cache.resolve(tx, tracker_row, identity, staged)?),
            None => None,
        };

        let mut outcome = UpsertOutcome::default();
        match tx.find_by_key(Collection::Issues, key)? {
            Some(record) => {
                let stored: IssueRow = serde_json::from_value(record.body)?;
                let row = IssueRow::new(issue, stored.submitted_by, stored.submitted_on, assigned_to);
                tx.update(Collection::Issues, record.id, &serde_json::to_value(&row)?)?;
                outcome.issue_row = record.id;
            }
            None => {
                let row = IssueRow::new(issue, submitted_by, issue.submitted_on, assigned_to);
                outcome.issue_row = tx.insert(
                    Collection::Issues,
                    key,
                    Some(tracker_row),
                    &serde_json::to_value(&row)?,
                )?;
                outcome.created = true;
            }
        }
        let issue_row = outcome.issue_row;

        for comment in &issue.comments {
            let key = comment_key(issue_row, comment);
            if tx.find_by_key(Collection::Comments, &key)?.is_some() {
                outcome.comments.skipped += 1;
                continue;
            }
            let by = cache.resolve(tx, tracker_row, &comment.submitted_by, staged)?;
            let body = serde_json::to_value(CommentRow::new(comment, by))?;
            tx.insert(Collection::Comments, &key, Some(issue_row), &body)?;
            outcome.comments.inserted += 1;
        }

        for attachment in &issue.attachments {
            let key = attachment_key(issue_row, attachment);
            if tx.find_by_key(Collection::Attachments, &key)?.is_some() {
                outcome.attachments.skipped += 1;
                continue;
            }
            let by = match &attachment.submitted_by {
                Some(identity) => Some(cache.resolve(tx, tracker_row, identity, staged)?),
                None => None,
            };
            let body = serde_json::to_value(AttachmentRow::new(attachment, by))?;
            tx.insert(Collection::Attachments, &key, Some(issue_row), &body)?;
            outcome.attachments.inserted += 1;
        }

        for (seq, change) in issue.changes.iter().enumerate() {
            let key = change_key(issue_row, change);
            if tx.find_by_key(Collection::Changes, &key)?.is_some() {
                outcome.changes.skipped += 1;
                continue;
            }
            let by = cache.resolve(tx, tracker_row, &change.changed_by, staged)?;
            let body = serde_json::to_value(ChangeRow::new(change, by, seq))?;
            tx.insert(Collection::Changes, &key, Some(issue_row), &body)?;
            outcome.changes.inserted += 1;
        }

        for watcher in &issue.watchers {
            let key = watcher_key(issue_row, &watcher.user_id);
            if tx.find_by_key(Collection::Watchers, &key)?.is_some() {
                outcome.watchers.skipped += 1;
                continue;
            }
            let identity = cache.resolve(tx, tracker_row, watcher, staged)?;
            let body = serde_json::to_value(WatcherRow { identity })?;
            tx.insert(Collection::Watchers, &key, Some(issue_row), &body)?;
            outcome.watchers.inserted += 1;
        }

        if let Some(extension) = &issue.extension {
            let key = extension_key(issue_row);
            let body = serde_json::to_value(extension)?;
            match tx.find_by_key(Collection::Extensions, &key)? {
                Some(record) if record.body == body => {}
                Some(record) => tx.update(Collection::Extensions, record.id, &body)?,
                None => {
                    tx.insert(Collection::Extensions, &key, Some(issue_row), &body)?;
                }
            }
        }

        Ok(outcome)
    }

    /// Stored trackers with their issue and identity counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or a tracker body is unreadable.
    pub fn tracker_overview(&self) -> Result<Vec<TrackerOverview>> {
        self.store.read(|tx| {
            tx.list(Collection::Trackers, None)?
                .into_iter()
                .map(|record| -> Result<TrackerOverview> {
                    Ok(TrackerOverview {
                        row: record.id,
                        tracker: serde_json::from_value(record.body)?,
                        issues: tx.count(Collection::Issues, Some(record.id))?,
                        identities: tx.count(Collection::Identities, Some(record.id))?,
                    })
                })
                .collect()
        })
    }

    fn issue_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.issue_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Drop the per-issue lock once no other upsert holds or waits on it.
    fn release_issue_lock(&self, key: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.issue_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Clones are only handed out under the map lock, so the count is exact:
        // one in the map, one held by the caller.
        if Arc::strong_count(lock) == 2 {
            locks.remove(key);
        }
    }
}
