//! Data models for issuecrawl.
//!
//! This module contains all domain entities:
//! - Identity
//! - Tracker (with its checkpoint)
//! - Issue, Comment, Attachment, Change, IssueSummary
//! - Timestamp parsing shared by every backend

pub mod identity;
pub mod issue;
pub mod time;
pub mod tracker;

pub use identity::Identity;
pub use issue::{Attachment, Change, Comment, Issue, IssueExtension, IssueSummary};
pub use time::{InvalidTimestamp, parse_timestamp};
pub use tracker::{Checkpoint, Tracker};
