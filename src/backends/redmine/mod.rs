//! Redmine backend.
//!
//! Uses the JSON REST API. Issue history comes from journals, whose
//! details reference statuses and priorities by numeric id; the adapter
//! attaches the tracker's status and priority lists so the parser can
//! translate them.

mod adapter;
mod parser;

pub use adapter::{RedmineAdapter, auth};
pub use parser::RedmineParser;

pub const BACKEND: &str = "redmine";

pub const ISSUE_PART: &str = "issue";
pub const STATUSES_PART: &str = "statuses";
pub const PRIORITIES_PART: &str = "priorities";
