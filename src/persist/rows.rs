//! Stored record bodies.
//!
//! Rows reference identities by row id rather than embedding them, so a
//! backfilled name or email shows up everywhere the person is referenced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Attachment, Change, Comment, Issue};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRow {
    pub issue_id: String,
    pub issue_type: String,
    pub summary: String,
    pub description: String,
    pub submitted_by: i64,
    pub submitted_on: DateTime<Utc>,
    #[serde(default)]
    pub updated_on: Option<DateTime<Utc>>,
    pub status: String,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<i64>,
}

impl IssueRow {
    /// Row for `issue`; the submitter fields are passed in so that an
    /// update can keep the ones stored at creation.
    #[must_use]
    pub fn new(
        issue: &Issue,
        submitted_by: i64,
        submitted_on: DateTime<Utc>,
        assigned_to: Option<i64>,
    ) -> Self {
        Self {
            issue_id: issue.issue_id.clone(),
            issue_type: issue.issue_type.clone(),
            summary: issue.summary.clone(),
            description: issue.description.clone(),
            submitted_by,
            submitted_on,
            updated_on: issue.updated_on,
            status: issue.status.clone(),
            resolution: issue.resolution.clone(),
            priority: issue.priority.clone(),
            assigned_to,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRow {
    pub text: String,
    pub submitted_by: i64,
    pub submitted_on: DateTime<Utc>,
}

impl CommentRow {
    #[must_use]
    pub fn new(comment: &Comment, submitted_by: i64) -> Self {
        Self {
            text: comment.text.clone(),
            submitted_by,
            submitted_on: comment.submitted_on,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRow {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub submitted_by: Option<i64>,
    #[serde(default)]
    pub submitted_on: Option<DateTime<Utc>>,
}

impl AttachmentRow {
    #[must_use]
    pub fn new(attachment: &Attachment, submitted_by: Option<i64>) -> Self {
        Self {
            name: attachment.name.clone(),
            url: attachment.url.clone(),
            description: attachment.description.clone(),
            submitted_by,
            submitted_on: attachment.submitted_on,
        }
    }
}

/// A change row; `seq` is the position in the reconstructed log and breaks
/// ties between changes sharing a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRow {
    pub field: String,
    #[serde(default)]
    pub old_value: Option<String>,
    #[serde(default)]
    pub new_value: Option<String>,
    pub changed_by: i64,
    pub changed_on: DateTime<Utc>,
    pub seq: usize,
}

impl ChangeRow {
    #[must_use]
    pub fn new(change: &Change, changed_by: i64, seq: usize) -> Self {
        Self {
            field: change.field.clone(),
            old_value: change.old_value.clone(),
            new_value: change.new_value.clone(),
            changed_by,
            changed_on: change.changed_on,
            seq,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherRow {
    pub identity: i64,
}
