//! Issue model and its owned records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::Identity;

/// A tracker issue (bug, ticket, task, review) with its full history.
///
/// `(issue_id, tracker)` is unique. `submitted_by` and `submitted_on` are
/// fixed at creation; every other field follows the latest fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Tracker-scoped identifier.
    pub issue_id: String,

    /// Issue type (bug, feature, changeset, ...).
    pub issue_type: String,

    pub summary: String,
    pub description: String,

    pub submitted_by: Identity,
    pub submitted_on: DateTime<Utc>,

    /// Last modification time reported by the tracker.
    pub updated_on: Option<DateTime<Utc>>,

    pub status: String,
    pub resolution: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<Identity>,

    pub comments: Vec<Comment>,
    pub attachments: Vec<Attachment>,

    /// Field changes ordered by `changed_on`.
    pub changes: Vec<Change>,

    pub watchers: Vec<Identity>,

    /// Backend-specific fields that have no place in the common model.
    pub extension: Option<IssueExtension>,
}

impl Issue {
    /// Create an issue with the required fields; everything else starts empty.
    pub fn new(
        issue_id: impl Into<String>,
        issue_type: impl Into<String>,
        submitted_by: Identity,
        submitted_on: DateTime<Utc>,
    ) -> Self {
        Self {
            issue_id: issue_id.into(),
            issue_type: issue_type.into(),
            summary: String::new(),
            description: String::new(),
            submitted_by,
            submitted_on,
            updated_on: None,
            status: String::new(),
            resolution: None,
            priority: None,
            assigned_to: None,
            comments: Vec::new(),
            attachments: Vec::new(),
            changes: Vec::new(),
            watchers: Vec::new(),
            extension: None,
        }
    }
}

/// A comment; immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub submitted_by: Identity,
    pub submitted_on: DateTime<Utc>,
}

/// A file attached to an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub submitted_by: Option<Identity>,
    pub submitted_on: Option<DateTime<Utc>>,
}

/// One field-level mutation of an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by: Identity,
    pub changed_on: DateTime<Utc>,
}

impl Change {
    pub fn new(
        field: impl Into<String>,
        old_value: Option<String>,
        new_value: Option<String>,
        changed_by: Identity,
        changed_on: DateTime<Utc>,
    ) -> Self {
        Self {
            field: field.into(),
            old_value,
            new_value,
            changed_by,
            changed_on,
        }
    }
}

/// Backend-specific key/value payload attached to an issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueExtension {
    pub backend: String,
    pub fields: BTreeMap<String, String>,
}

impl IssueExtension {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Insert a field, skipping absent or blank values.
    pub fn set(&mut self, key: &str, value: Option<impl Into<String>>) {
        if let Some(value) = value.map(Into::into) {
            if !value.trim().is_empty() {
                self.fields.insert(key.to_string(), value);
            }
        }
    }
}

/// Lightweight listing entry used to decide whether a full fetch is needed.
///
/// Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueSummary {
    pub issue_id: String,
    pub changed_on: DateTime<Utc>,
}

impl IssueSummary {
    pub fn new(issue_id: impl Into<String>, changed_on: DateTime<Utc>) -> Self {
        Self {
            issue_id: issue_id.into(),
            changed_on,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_skips_blank_values() {
        let mut ext = IssueExtension::new("bugzilla");
        ext.set("product", Some("Firefox"));
        ext.set("component", Some(""));
        ext.set("version", None::<String>);
        assert_eq!(ext.fields.len(), 1);
    }
}
