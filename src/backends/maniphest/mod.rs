//! Phabricator Maniphest backend.
//!
//! Talks to the Conduit API: `maniphest.search` lists and fetches tasks,
//! `transaction.search` returns their history and `user.search` resolves
//! the PHIDs both refer to.

mod adapter;
mod parser;

pub use adapter::ManiphestAdapter;
pub use parser::ManiphestParser;

pub const BACKEND: &str = "maniphest";

pub const ISSUE_PART: &str = "issue";
pub const TRANSACTIONS_PART: &str = "transactions";
pub const USERS_PART: &str = "users";
