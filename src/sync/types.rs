//! Error and report types for synchronization.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::decode::DecodeError;
use crate::persist::EntityStats;

/// A failed call to a tracker.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Credentials missing, rejected or insufficient.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The tracker asked us to slow down.
    #[error("rate limited until {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// Network hiccup or 5xx; worth retrying.
    #[error("transient error: {0}")]
    Transient(String),

    /// The request exceeded its timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The tracker cannot be reached at all (DNS, refused connection).
    #[error("tracker unreachable: {0}")]
    Unreachable(String),

    /// The tracker answered with something we cannot use.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl FetchError {
    /// Whether the call may succeed if repeated after a backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }

    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

impl From<DecodeError> for FetchError {
    fn from(err: DecodeError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Why a fetched issue could not be turned into the entity model.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("missing raw document '{0}'")]
    MissingPart(String),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid field '{field}': {message}")]
    InvalidField { field: &'static str, message: String },
}

impl ParseError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }
}

/// Outcome of one tracker worker that did not complete normally.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Credentials were rejected; the whole run stops.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The tracker could not be reached before anything was fetched.
    #[error("tracker unreachable: {0}")]
    Unreachable(String),

    /// A never-synced tracker listed no issues at all.
    #[error("no issues found")]
    NoIssuesFound,

    /// A page could not be fetched; this worker stops, others continue.
    #[error("fetch failed: {0}")]
    Fetch(FetchError),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] crate::Error),
}

impl SyncError {
    /// Whether this outcome must end the whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Unreachable(_) | Self::NoIssuesFound)
    }

    /// Convert into the crate error for a named tracker.
    #[must_use]
    pub fn into_error(self, tracker: &str) -> crate::Error {
        let tracker = tracker.to_string();
        match self {
            Self::Auth(message) => crate::Error::Auth { tracker, message },
            Self::Unreachable(message) => crate::Error::Unreachable { tracker, message },
            Self::NoIssuesFound => crate::Error::NoIssuesFound { tracker },
            Self::Fetch(err) => crate::Error::Worker {
                tracker,
                message: err.to_string(),
            },
            Self::Store(err) => err,
        }
    }
}

impl From<FetchError> for SyncError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Auth(message) => Self::Auth(message),
            other => Self::Fetch(other),
        }
    }
}

/// An issue that was listed but not stored.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedIssue {
    pub issue_id: String,
    pub reason: String,
}

/// Final state of one tracker worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Every window was drained.
    Completed,
    /// Stopped between issues on request.
    Cancelled,
    /// Stopped early by an error.
    Failed,
}

/// Per-tracker summary of a run.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerReport {
    pub tracker: String,
    pub backend: String,
    pub status: WorkerStatus,
    /// Issues fetched and stored.
    pub processed: usize,
    /// Issues stored for the first time.
    pub created: usize,
    /// Issues skipped because the stored copy was already current.
    pub unchanged: usize,
    pub skipped: Vec<SkippedIssue>,
    pub comments: EntityStats,
    pub attachments: EntityStats,
    pub changes: EntityStats,
    pub watchers: EntityStats,
    /// Reconstruction warnings across all issues.
    pub warnings: usize,
    pub watermark: Option<DateTime<Utc>>,
    /// Error that stopped the worker, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrackerReport {
    #[must_use]
    pub fn new(tracker: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            tracker: tracker.into(),
            backend: backend.into(),
            status: WorkerStatus::Completed,
            processed: 0,
            created: 0,
            unchanged: 0,
            skipped: Vec::new(),
            comments: EntityStats::default(),
            attachments: EntityStats::default(),
            changes: EntityStats::default(),
            watchers: EntityStats::default(),
            warnings: 0,
            watermark: None,
            error: None,
        }
    }

    pub fn skip(&mut self, issue_id: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkippedIssue {
            issue_id: issue_id.into(),
            reason: reason.into(),
        });
    }
}

/// Summary of a whole run across trackers.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub trackers: Vec<TrackerReport>,
}

impl RunSummary {
    #[must_use]
    pub fn processed(&self) -> usize {
        self.trackers.iter().map(|t| t.processed).sum()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.trackers.iter().map(|t| t.skipped.len()).sum()
    }

    /// True when at least one tracker ran and every one of them failed.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        !self.trackers.is_empty()
            && self
                .trackers
                .iter()
                .all(|t| t.status == WorkerStatus::Failed)
    }
}
