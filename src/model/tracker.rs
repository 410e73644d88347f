//! Tracker model.
//!
//! One tracker row exists per distinct (url, backend) pair. Its checkpoint
//! is the only part mutated after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An external issue-tracking system instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracker {
    /// Base URL of the tracker.
    pub url: String,

    /// Backend name (bugzilla, redmine, ...).
    pub backend_name: String,

    /// Backend version reported by the tracker, if any.
    #[serde(default)]
    pub backend_version: Option<String>,

    /// When the last complete synchronization window finished.
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,

    /// Resume state for the next run.
    #[serde(default)]
    pub checkpoint: Checkpoint,
}

impl Tracker {
    /// Create a tracker that has never been synchronized.
    pub fn new(url: impl Into<String>, backend_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backend_name: backend_name.into(),
            backend_version: None,
            last_synced_at: None,
            checkpoint: Checkpoint::default(),
        }
    }
}

/// Resume state of one tracker.
///
/// `watermark` is the highest modification time known to be fully persisted.
/// `window_since` and `cursor` describe a fetch window that was interrupted
/// mid-way; both are cleared when a window completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub watermark: Option<DateTime<Utc>>,
    #[serde(default)]
    pub window_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cursor: Option<String>,
}

impl Checkpoint {
    /// True if a previous run stopped in the middle of a window.
    #[must_use]
    pub fn is_resuming(&self) -> bool {
        self.cursor.is_some()
    }
}
