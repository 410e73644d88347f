//! Bugzilla backend.
//!
//! Listing comes from `buglist.cgi` as CSV ordered by change date, each bug
//! from the `show_bug.cgi` XML export, and its history from the
//! `show_activity.cgi` HTML table.

mod adapter;
mod parser;

pub use adapter::{BugzillaAdapter, auth};
pub use parser::BugzillaParser;

/// Backend name stored on the tracker row.
pub const BACKEND: &str = "bugzilla";

/// Raw part holding the XML bug export.
pub const ISSUE_PART: &str = "issue";
/// Raw part holding the activity page.
pub const ACTIVITY_PART: &str = "activity";
