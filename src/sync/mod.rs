//! Incremental synchronization.
//!
//! - **Adapters**: per-backend network access behind [`TrackerAdapter`]
//! - **Parsers**: pure raw-document → entity conversion behind [`IssueParser`]
//! - **Checkpoints**: watermark and cursor bookkeeping for resumable runs
//! - **Retry**: exponential backoff with rate-limit waits
//! - **Orchestrator**: one worker per tracker, fatal errors stop the run
//!
//! # Example
//!
//! ```ignore
//! use issuecrawl::sync::{Orchestrator, SyncSettings};
//!
//! let orchestrator = Arc::new(Orchestrator::new(persister, SyncSettings::default()));
//! let outcome = orchestrator.run_all(jobs).await;
//! std::process::exit(outcome.exit_code().into());
//! ```

pub mod adapter;
pub mod checkpoint;
pub mod orchestrator;
pub mod retry;
pub mod types;

pub use adapter::{
    FetchWindow, IssueParser, Page, PageOrder, ParseContext, ParsedIssue, RawIssue, TrackerAdapter,
};
pub use checkpoint::{CheckpointManager, PageStop};
pub use orchestrator::{Orchestrator, RunOutcome, SyncSettings, SyncState, TrackerJob};
pub use retry::{Backoff, RetryPolicy, with_retry};
pub use types::{
    FetchError, ParseError, RunSummary, SkippedIssue, SyncError, TrackerReport, WorkerStatus,
};
