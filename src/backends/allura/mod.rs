//! Allura (SourceForge) ticket backend.
//!
//! Tickets are listed through the tool's search endpoint, fetched from the
//! REST API, and their history comes from the per-ticket Atom feed. When
//! the feed is unavailable, field changes are recovered from the
//! discussion posts Allura writes on every edit.

mod adapter;
mod parser;

pub use adapter::{AlluraAdapter, auth};
pub use parser::AlluraParser;

/// Backend name stored on the tracker row.
pub const BACKEND: &str = "allura";

/// Raw part holding the REST ticket document.
pub const ISSUE_PART: &str = "issue";
/// Raw part holding the ticket's Atom feed.
pub const FEED_PART: &str = "feed";

/// Tool mount used when the project setting names no tool.
pub const DEFAULT_TOOL: &str = "tickets";
