//! Gerrit backend.
//!
//! Changes are listed with `gerrit query --format=JSON` over ssh, newest
//! first. Each result line already carries patch sets, approvals and
//! messages, so the listing line doubles as the issue document.

mod adapter;
mod parser;
mod ssh;

pub use adapter::GerritAdapter;
pub use parser::GerritParser;
pub use ssh::{CommandRunner, SshRunner, SshTarget};

/// Backend name stored on the tracker row.
pub const BACKEND: &str = "gerrit";

/// Raw part holding one query result line.
pub const ISSUE_PART: &str = "issue";

/// Default Gerrit ssh port.
pub const DEFAULT_SSH_PORT: u16 = 29418;
