//! Change-log reconstruction engine.
//!
//! Turns decoded activity representations into an ordered list of
//! [`Change`]s per issue. Three source forms are supported:
//!
//! - [`table`] - who/when/what/removed/added tables with row-spanning cells
//! - [`feed`] - activity feeds and transaction logs, one actor per entry
//! - [`review`] - code-review histories (patch sets, approvals, messages)
//!
//! Every form reports malformed entries as [`ReconstructionWarning`]s and
//! keeps going. [`ChangeLog::finish`] orders the result and guarantees that
//! an issue in a terminal status has a matching status change.

pub mod feed;
pub mod heuristics;
pub mod review;
pub mod table;

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Change, Identity, InvalidTimestamp, parse_timestamp};

pub use feed::{FeedEntry, FieldDiff, Transaction, apply_atom_feed, apply_transactions, split_diff_text};
pub use heuristics::{CommentPatterns, LifecycleHeuristic, NoInference};
pub use review::{Approval, ReviewHistory, ReviewMessage, Revision, apply_review};
pub use table::{Cell, RowspanMachine, TableState, apply_activity_page, apply_rows};

/// Field name used for status changes across all backends.
pub const STATUS_FIELD: &str = "status";

/// One entry that could not be turned into a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconstructionWarning {
    /// Source form that produced the warning (table, feed, review).
    pub source: &'static str,
    /// Human-readable reference to the offending entry.
    pub entry: Option<String>,
    pub message: String,
}

impl fmt::Display for ReconstructionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entry {
            Some(entry) => write!(f, "[{}] {entry}: {}", self.source, self.message),
            None => write!(f, "[{}] {}", self.source, self.message),
        }
    }
}

/// Statuses after which an issue is considered finished.
#[derive(Debug, Clone)]
pub struct TerminalStatuses(HashSet<String>);

impl TerminalStatuses {
    pub fn new<I, S>(statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            statuses
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    /// Case-insensitive membership test.
    #[must_use]
    pub fn contains(&self, status: &str) -> bool {
        self.0.contains(&status.trim().to_lowercase())
    }

    /// A copy that also treats `extra` as terminal.
    #[must_use]
    pub fn with<I, S>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut merged = self.clone();
        merged.0.extend(Self::new(extra).0);
        merged
    }
}

impl Default for TerminalStatuses {
    fn default() -> Self {
        Self::new(DEFAULT_TERMINAL_STATUSES)
    }
}

/// Terminal statuses used when the configuration does not list any.
pub const DEFAULT_TERMINAL_STATUSES: &[&str] = &[
    "merged",
    "abandoned",
    "resolved",
    "closed",
    "verified",
    "fixed",
    "invalid",
    "wontfix",
    "duplicate",
    "rejected",
];

/// Final state of the issue whose changes are being reconstructed.
#[derive(Debug, Clone, Copy)]
pub struct IssueOutcome<'a> {
    pub status: &'a str,
    /// Who a synthesized closing change is attributed to.
    pub actor: &'a Identity,
    /// Close time recorded by the tracker, if it records one.
    pub closed_at: Option<DateTime<Utc>>,
    pub submitted_on: DateTime<Utc>,
}

impl IssueOutcome<'_> {
    /// Instant a synthesized closing change is stamped with.
    ///
    /// Only values that stay fixed across re-syncs qualify, so the change
    /// keeps its dedup key when the issue later gains comments or edits:
    /// the recorded close time, else the last status change, else the
    /// submission time.
    fn anchor(&self, changes: &[Change]) -> DateTime<Utc> {
        self.closed_at
            .or_else(|| {
                changes
                    .iter()
                    .rev()
                    .find(|c| c.field == STATUS_FIELD)
                    .map(|c| c.changed_on)
            })
            .unwrap_or(self.submitted_on)
    }
}

/// Accumulates changes and warnings for one issue.
#[derive(Debug, Default)]
pub struct ChangeLog {
    changes: Vec<Change>,
    warnings: Vec<ReconstructionWarning>,
}

impl ChangeLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change; emission order is the tie-break for equal timestamps.
    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    /// Record a skipped entry.
    pub fn warn(&mut self, source: &'static str, entry: Option<String>, message: impl Into<String>) {
        let warning = ReconstructionWarning {
            source,
            entry,
            message: message.into(),
        };
        tracing::debug!("Skipping change entry: {warning}");
        self.warnings.push(warning);
    }

    /// Parse a timestamp, recording a warning on failure.
    pub fn timestamp(
        &mut self,
        source: &'static str,
        entry: Option<String>,
        raw: &str,
    ) -> Option<DateTime<Utc>> {
        match parse_timestamp(raw) {
            Ok(ts) => Some(ts),
            Err(InvalidTimestamp(raw)) => {
                self.warn(source, entry, format!("unparseable timestamp {raw:?}"));
                None
            }
        }
    }

    #[must_use]
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    #[must_use]
    pub fn warnings(&self) -> &[ReconstructionWarning] {
        &self.warnings
    }

    /// Order changes by time and enforce terminal-status completeness.
    ///
    /// The sort is stable, so changes sharing a timestamp keep emission
    /// order. When `outcome.status` is terminal and no status change reaches
    /// it, a closing change is synthesized at [`IssueOutcome::anchor`].
    #[must_use]
    pub fn finish(
        mut self,
        outcome: IssueOutcome<'_>,
        terminal: &TerminalStatuses,
    ) -> (Vec<Change>, Vec<ReconstructionWarning>) {
        self.changes.sort_by_key(|c| c.changed_on);

        if terminal.contains(outcome.status) && !self.reaches_status(outcome.status) {
            let previous = self
                .changes
                .iter()
                .rev()
                .find(|c| c.field == STATUS_FIELD)
                .and_then(|c| c.new_value.clone());
            let at = outcome.anchor(&self.changes);
            tracing::debug!(
                status = outcome.status,
                %at,
                "Synthesizing closing status change"
            );
            self.changes.push(Change::new(
                STATUS_FIELD,
                previous,
                Some(outcome.status.to_string()),
                outcome.actor.clone(),
                at,
            ));
            // Stable: the new change lands after everything sharing its instant.
            self.changes.sort_by_key(|c| c.changed_on);
        }

        (self.changes, self.warnings)
    }

    fn reaches_status(&self, status: &str) -> bool {
        self.changes.iter().any(|c| {
            c.field == STATUS_FIELD
                && c.new_value
                    .as_deref()
                    .is_some_and(|v| v.eq_ignore_ascii_case(status))
        })
    }
}

/// Canonical field name for a tracker's display or column name.
///
/// Status, priority, resolution and assignee columns are folded onto one
/// name each so terminal-status checks work across backends; anything else
/// is lowercased with spaces replaced by underscores.
#[must_use]
pub fn normalize_field(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase().replace([' ', '-'], "_");
    match lowered.as_str() {
        "status" | "bug_status" | "status_id" => STATUS_FIELD.to_string(),
        "priority" | "priority_id" => "priority".to_string(),
        "resolution" => "resolution".to_string(),
        "assignee" | "assigned_to" | "assigned_to_id" | "owner" => "assigned_to".to_string(),
        "summary" | "short_desc" | "subject" | "title" => "summary".to_string(),
        _ => lowered,
    }
}

/// Treat blank and placeholder values as absent.
#[must_use]
pub fn clean_value(raw: &str) -> Option<String> {
    let v = raw.trim();
    if v.is_empty() || v == "(none)" || v.eq_ignore_ascii_case("none") || v == "---" {
        None
    } else {
        Some(v.to_string())
    }
}
