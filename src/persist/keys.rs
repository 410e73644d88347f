//! Deterministic dedup keys.
//!
//! Child records (comments, attachments, changes) are keyed by a SHA-256
//! digest of their identifying fields, serialized as a JSON array, and
//! prefixed with the owning issue's row id. Timestamps are normalised to
//! RFC 3339 UTC seconds first, so one instant rendered two ways by a
//! tracker still yields one key.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::model::{Attachment, Change, Comment};

/// SHA-256 hex digest of the canonical JSON form of `parts`.
#[must_use]
pub fn digest(parts: Vec<Value>) -> String {
    let json = Value::from(parts).to_string();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn instant(ts: DateTime<Utc>) -> Value {
    Value::from(ts.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn optional(value: Option<&str>) -> Value {
    value.map_or(Value::Null, Value::from)
}

/// Key of a tracker row: one per (backend, url).
#[must_use]
pub fn tracker_key(backend: &str, url: &str) -> String {
    format!("tracker:{backend}:{}", url.trim().trim_end_matches('/'))
}

/// Key of an issue row: `(issue_id, tracker)`.
#[must_use]
pub fn issue_key(tracker_row: i64, issue_id: &str) -> String {
    format!("issue:{tracker_row}:{issue_id}")
}

/// Key of an identity row: `(user_id, tracker)`.
#[must_use]
pub fn identity_key(tracker_row: i64, user_id: &str) -> String {
    format!("identity:{tracker_row}:{user_id}")
}

/// Key of a comment: `(issue, text, submitted_on)`.
#[must_use]
pub fn comment_key(issue_row: i64, comment: &Comment) -> String {
    let sha = digest(vec![
        Value::from(comment.text.as_str()),
        instant(comment.submitted_on),
    ]);
    format!("comment:{issue_row}:{sha}")
}

/// Key of an attachment: `(issue, url, submitted_on)`.
#[must_use]
pub fn attachment_key(issue_row: i64, attachment: &Attachment) -> String {
    let sha = digest(vec![
        Value::from(attachment.url.as_str()),
        attachment.submitted_on.map_or(Value::Null, instant),
    ]);
    format!("attachment:{issue_row}:{sha}")
}

/// Key of a change: `(issue, field, changed_on, old_value, new_value)`.
#[must_use]
pub fn change_key(issue_row: i64, change: &Change) -> String {
    let sha = digest(vec![
        Value::from(change.field.as_str()),
        instant(change.changed_on),
        optional(change.old_value.as_deref()),
        optional(change.new_value.as_deref()),
    ]);
    format!("change:{issue_row}:{sha}")
}

/// Key of a watcher link: `(issue, user_id)`.
#[must_use]
pub fn watcher_key(issue_row: i64, user_id: &str) -> String {
    format!("watcher:{issue_row}:{user_id}")
}

/// Key of the extension record; one per issue.
#[must_use]
pub fn extension_key(issue_row: i64) -> String {
    format!("extension:{issue_row}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Identity, parse_timestamp};

    fn change(on: &str, old: Option<&str>) -> Change {
        Change::new(
            "status",
            old.map(String::from),
            Some("ASSIGNED".into()),
            Identity::new("alice"),
            parse_timestamp(on).unwrap(),
        )
    }

    #[test]
    fn test_digest_is_deterministic() {
        let a = digest(vec![Value::from("x"), Value::from(1)]);
        let b = digest(vec![Value::from("x"), Value::from(1)]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_same_instant_different_rendering() {
        let a = change_key(7, &change("2013-06-25 13:56:36 +0200", Some("NEW")));
        let b = change_key(7, &change("2013-06-25T11:56:36Z", Some("NEW")));
        assert_eq!(a, b);
        assert!(a.starts_with("change:7:"));
    }

    #[test]
    fn test_key_distinguishes_absent_from_empty() {
        let none = change_key(7, &change("2013-06-25T11:56:36Z", None));
        let empty = change_key(7, &change("2013-06-25T11:56:36Z", Some("")));
        assert_ne!(none, empty);
    }

    #[test]
    fn test_key_is_scoped_to_issue() {
        let c = change("2013-06-25T11:56:36Z", Some("NEW"));
        assert_ne!(change_key(1, &c), change_key(2, &c));
    }

    #[test]
    fn test_tracker_key_ignores_trailing_slash() {
        assert_eq!(
            tracker_key("bugzilla", "https://bugs.example.org/"),
            tracker_key("bugzilla", "https://bugs.example.org")
        );
    }
}
