//! Tracker backends.
//!
//! Each backend pairs a [`TrackerAdapter`] (network side) with an
//! [`IssueParser`] (pure conversion of raw documents):
//!
//! - [`bugzilla`] - CSV listing, XML bug export, HTML activity table
//! - [`redmine`] - JSON REST API with journals
//! - [`maniphest`] - Phabricator Conduit API
//! - [`gerrit`] - `gerrit query` over ssh, JSON lines
//! - [`allura`] - Allura REST API plus Atom ticket feeds

pub mod allura;
pub mod bugzilla;
pub mod gerrit;
pub mod maniphest;
pub mod redmine;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::http::{HttpTransport, TrackerClient};
use crate::model::{Identity, parse_timestamp};
use crate::sync::{IssueParser, ParseError, TrackerAdapter};

/// Supported tracker backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Bugzilla,
    Redmine,
    Maniphest,
    Gerrit,
    Allura,
}

impl BackendKind {
    pub const ALL: [Self; 5] = [
        Self::Bugzilla,
        Self::Redmine,
        Self::Maniphest,
        Self::Gerrit,
        Self::Allura,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bugzilla => "bugzilla",
            Self::Redmine => "redmine",
            Self::Maniphest => "maniphest",
            Self::Gerrit => "gerrit",
            Self::Allura => "allura",
        }
    }

    /// Whether the backend needs a `project` setting.
    #[must_use]
    pub const fn requires_project(&self) -> bool {
        matches!(self, Self::Gerrit | Self::Allura)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Error::Config(format!(
                    "unknown backend '{s}' (expected one of: {})",
                    Self::ALL.map(|k| k.as_str()).join(", ")
                ))
            })
    }
}

/// Adapter and parser for one configured tracker.
pub struct Backend {
    pub adapter: Box<dyn TrackerAdapter>,
    pub parser: Box<dyn IssueParser>,
}

/// Build the backend for a tracker configuration.
///
/// HTTP backends share `transport`; Gerrit runs the ssh client instead.
///
/// # Errors
///
/// Returns `Error::Config` if the URL or a backend-specific setting is invalid.
pub fn build(config: &TrackerConfig, transport: Arc<dyn HttpTransport>) -> Result<Backend> {
    let url = config.parsed_url()?;
    let token = config.resolved_token();
    let project = config.project.clone();

    let backend = match config.backend {
        BackendKind::Bugzilla => {
            let client = TrackerClient::new(transport, bugzilla::auth(token));
            Backend {
                adapter: Box::new(bugzilla::BugzillaAdapter::new(client, url.clone(), project)),
                parser: Box::new(bugzilla::BugzillaParser::new(url)),
            }
        }
        BackendKind::Redmine => {
            let client = TrackerClient::new(transport, redmine::auth(token, config.user.clone()));
            Backend {
                adapter: Box::new(redmine::RedmineAdapter::new(client, url, project)),
                parser: Box::new(redmine::RedmineParser),
            }
        }
        BackendKind::Maniphest => {
            let client = TrackerClient::new(transport, crate::http::Auth::Anonymous);
            let token = token.ok_or_else(|| {
                Error::Config(format!("tracker '{}': maniphest needs a Conduit API token", config.name))
            })?;
            Backend {
                adapter: Box::new(maniphest::ManiphestAdapter::new(client, url, token, project)),
                parser: Box::new(maniphest::ManiphestParser),
            }
        }
        BackendKind::Gerrit => {
            let project = require_project(config)?;
            let target = gerrit::SshTarget::from_url(&url, config.user.clone())?;
            let runner = gerrit::SshRunner::new(target, config.timeout());
            Backend {
                adapter: Box::new(gerrit::GerritAdapter::new(Arc::new(runner), url, project)),
                parser: Box::new(gerrit::GerritParser),
            }
        }
        BackendKind::Allura => {
            let project = require_project(config)?;
            let client = TrackerClient::new(transport, allura::auth(token));
            Backend {
                adapter: Box::new(allura::AlluraAdapter::new(client, url.clone(), &project)),
                parser: Box::new(allura::AlluraParser),
            }
        }
    };
    Ok(backend)
}

fn require_project(config: &TrackerConfig) -> Result<String> {
    config.project.clone().ok_or_else(|| {
        Error::Config(format!(
            "tracker '{}': backend {} needs a `project`",
            config.name, config.backend
        ))
    })
}

// ── JSON helpers shared by the parsers ───────────────────────

/// String value at `key`, accepting numbers; `None` for null or blank.
pub(crate) fn json_str(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Required string value at `key`.
pub(crate) fn require_str(value: &Value, key: &'static str) -> std::result::Result<String, ParseError> {
    json_str(value, key).ok_or(ParseError::MissingField(key))
}

/// Required timestamp at `key`.
pub(crate) fn require_time(
    value: &Value,
    key: &'static str,
) -> std::result::Result<DateTime<Utc>, ParseError> {
    let raw = require_str(value, key)?;
    parse_timestamp(&raw).map_err(|e| ParseError::invalid(key, e.to_string()))
}

/// Optional timestamp at `key`; unparseable values count as absent.
pub(crate) fn optional_time(value: &Value, key: &str) -> Option<DateTime<Utc>> {
    json_str(value, key).and_then(|raw| parse_timestamp(&raw).ok())
}

/// Array at `key`, or an empty slice.
pub(crate) fn json_array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

/// An `{id, name}` user reference as used by REST trackers.
pub(crate) fn named_user(value: &Value) -> Option<Identity> {
    let id = json_str(value, "id").or_else(|| json_str(value, "name"))?;
    Some(Identity::new(id).with_name(json_str(value, "name")))
}
