//! Tracker adapter and issue parser contracts.
//!
//! An adapter owns the network side of one backend: authentication, URL
//! construction and pagination. A parser is pure: it turns the raw
//! documents an adapter fetched into the entity model. Keeping the two
//! apart lets parsers be tested on captured payloads without any I/O.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::{FetchError, ParseError};
use crate::changelog::{ReconstructionWarning, TerminalStatuses};
use crate::model::{Issue, IssueSummary};

/// Parameters of one page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchWindow {
    /// Only issues modified at or after this instant; `None` lists everything.
    pub since: Option<DateTime<Utc>>,
    /// Opaque resume position returned by the previous page.
    pub cursor: Option<String>,
    pub page_size: usize,
}

/// One page of listing results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// A final page with no continuation.
    #[must_use]
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
            has_more: false,
        }
    }
}

/// Order in which an adapter lists issues by modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOrder {
    /// Oldest first; the watermark can follow each stored issue.
    Ascending,
    /// Newest first; the watermark can only move when a window completes.
    Descending,
}

/// Raw documents fetched for one issue, keyed by role ("issue", "activity", ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawIssue {
    pub summary: IssueSummary,
    pub parts: BTreeMap<String, Vec<u8>>,
}

impl RawIssue {
    #[must_use]
    pub fn new(summary: IssueSummary) -> Self {
        Self {
            summary,
            parts: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_part(mut self, name: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.parts.insert(name.to_string(), bytes.into());
        self
    }

    #[must_use]
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(Vec::as_slice)
    }

    /// A part the parser cannot do without.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::MissingPart` if the adapter did not fetch it.
    pub fn require(&self, name: &str) -> Result<&[u8], ParseError> {
        self.part(name)
            .ok_or_else(|| ParseError::MissingPart(name.to_string()))
    }
}

/// Network side of a backend.
#[async_trait]
pub trait TrackerAdapter: Send + Sync {
    /// Backend name (bugzilla, redmine, ...).
    fn backend(&self) -> &'static str;

    /// Base URL identifying the tracker.
    fn url(&self) -> &str;

    fn order(&self) -> PageOrder {
        PageOrder::Ascending
    }

    /// Check connectivity and credentials; returns the backend version if known.
    async fn server_version(&self) -> Result<Option<String>, FetchError>;

    /// List issues modified within `window`.
    async fn fetch_page(&self, window: &FetchWindow) -> Result<Page<IssueSummary>, FetchError>;

    /// Fetch every raw document needed to parse one issue.
    async fn fetch_issue(&self, summary: &IssueSummary) -> Result<RawIssue, FetchError>;
}

/// Settings shared by all parsers.
#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    pub terminal: TerminalStatuses,
}

/// An issue with the warnings produced while reconstructing its changes.
#[derive(Debug, Clone)]
pub struct ParsedIssue {
    pub issue: Issue,
    pub warnings: Vec<ReconstructionWarning>,
}

/// Pure side of a backend.
pub trait IssueParser: Send + Sync {
    /// Decode raw documents and reconstruct the issue's change log.
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` if a required document is missing or
    /// structurally malformed, or a required field is absent.
    fn parse(&self, raw: &RawIssue, ctx: &ParseContext) -> Result<ParsedIssue, ParseError>;
}
