//! Identity model.
//!
//! Identities are tracker-local: `user_id` is unique per tracker and two
//! identities with the same `user_id` are the same person.

use serde::{Deserialize, Serialize};

/// A reporter, assignee, commenter or change author.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Tracker-local key (login, account id, email, PHID...).
    pub user_id: String,

    /// Display name, when the tracker exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Email address, when the tracker exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    /// Create an identity with only its tracker-local key.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: None,
            email: None,
        }
    }

    /// Attach a display name, ignoring blank values.
    #[must_use]
    pub fn with_name(mut self, name: Option<impl Into<String>>) -> Self {
        self.name = non_blank(name);
        self
    }

    /// Attach an email address, ignoring blank values.
    #[must_use]
    pub fn with_email(mut self, email: Option<impl Into<String>>) -> Self {
        self.email = non_blank(email);
        self
    }

    /// Backfill missing name/email from another record of the same user.
    ///
    /// Known values are never overwritten. Returns `true` if anything changed.
    pub fn backfill(&mut self, other: &Identity) -> bool {
        let mut changed = false;
        if self.name.is_none() && other.name.is_some() {
            self.name.clone_from(&other.name);
            changed = true;
        }
        if self.email.is_none() && other.email.is_some() {
            self.email.clone_from(&other.email);
            changed = true;
        }
        changed
    }
}

fn non_blank(value: Option<impl Into<String>>) -> Option<String> {
    value
        .map(Into::into)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
