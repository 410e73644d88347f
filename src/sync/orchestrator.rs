//! Synchronization orchestrator.
//!
//! One worker per tracker drives a sequential pipeline:
//! list a page → fetch each issue → decode and reconstruct → persist →
//! checkpoint → delay. Workers for different trackers run concurrently and
//! share only the identity cache and the store.
//!
//! Errors local to one issue skip that issue. A page that cannot be listed
//! stops that tracker's worker. Authentication failures, an unreachable
//! tracker and an empty first listing stop the whole run.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::adapter::{IssueParser, ParseContext, TrackerAdapter};
use super::checkpoint::{CheckpointManager, PageStop};
use super::retry::{RetryPolicy, with_retry};
use super::types::{FetchError, RunSummary, SyncError, TrackerReport, WorkerStatus};
use crate::error::Error;
use crate::model::{IssueSummary, Tracker};
use crate::persist::{Persister, UpsertOutcome};
use crate::storage::Store;

/// Pipeline state of a tracker worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Init,
    FetchingWindow,
    Decoding,
    Reconstructing,
    Persisting,
    Checkpointing,
    Done,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::FetchingWindow => "FETCHING_WINDOW",
            Self::Decoding => "DECODING",
            Self::Reconstructing => "RECONSTRUCTING",
            Self::Persisting => "PERSISTING",
            Self::Checkpointing => "CHECKPOINTING",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Settings shared by every worker of a run.
#[derive(Debug, Clone, Default)]
pub struct SyncSettings {
    pub retry: RetryPolicy,
    pub parse: ParseContext,
}

/// One tracker to synchronize.
pub struct TrackerJob {
    /// Configured tracker name, used in logs and reports.
    pub name: String,
    pub adapter: Box<dyn TrackerAdapter>,
    pub parser: Box<dyn IssueParser>,
    pub page_size: usize,
    /// Pause after each fetched issue.
    pub delay: Duration,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    /// The error that ended the run early, if any.
    pub fatal: Option<Error>,
}

impl RunOutcome {
    /// Process exit code for this outcome.
    ///
    /// Skipped issues do not make a run fail. A run fails with the fatal
    /// error's code, or with the worker code when every tracker failed.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match &self.fatal {
            Some(err) => err.exit_code(),
            None if self.summary.all_failed() => crate::error::ErrorCode::WorkerFailed.exit_code(),
            None => 0,
        }
    }
}

enum IssueResult {
    Stored {
        outcome: UpsertOutcome,
        warnings: usize,
    },
    Unchanged,
    Failed(String),
}

/// Drives tracker workers against one persister.
pub struct Orchestrator<S: Store> {
    persister: Arc<Persister<S>>,
    settings: SyncSettings,
    cancel: CancellationToken,
}

impl<S: Store + 'static> Orchestrator<S> {
    pub fn new(persister: Arc<Persister<S>>, settings: SyncSettings) -> Self {
        Self {
            persister,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops every worker at its next issue boundary.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every job concurrently until all finish or one fails fatally.
    pub async fn run_all(self: &Arc<Self>, jobs: Vec<TrackerJob>) -> RunOutcome {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        tracing::info!(run_id = %run_id, trackers = jobs.len(), "Starting crawl");

        let mut set = JoinSet::new();
        for job in jobs {
            let this = Arc::clone(self);
            let span = tracing::info_span!("tracker", run_id = %run_id, name = %job.name);
            set.spawn(
                async move {
                    let name = job.name.clone();
                    let (report, err) = this.run_tracker(job).await;
                    (name, report, err)
                }
                .instrument(span),
            );
        }

        let mut reports = Vec::new();
        let mut fatal = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, report, err)) => {
                    if let Some(err) = err {
                        if err.is_fatal() {
                            tracing::error!(tracker = %name, "Fatal: {err}; stopping all trackers");
                            self.cancel.cancel();
                            fatal.get_or_insert(err.into_error(&name));
                        } else {
                            tracing::warn!(tracker = %name, "Tracker stopped: {err}");
                        }
                    }
                    reports.push(report);
                }
                Err(join_err) => {
                    tracing::error!("Tracker worker panicked: {join_err}");
                }
            }
        }
        reports.sort_by(|a: &TrackerReport, b| a.tracker.cmp(&b.tracker));

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            trackers: reports,
        };
        tracing::info!(
            processed = summary.processed(),
            skipped = summary.skipped(),
            "Crawl finished"
        );
        RunOutcome { summary, fatal }
    }

    /// Synchronize one tracker.
    ///
    /// Returns the report and, if the worker stopped early, why.
    pub async fn run_tracker(&self, job: TrackerJob) -> (TrackerReport, Option<SyncError>) {
        let mut report = TrackerReport::new(&job.name, job.adapter.backend());
        let result = self.drive(&job, &mut report).await;
        if let Err(err) = &result {
            report.status = WorkerStatus::Failed;
            report.error = Some(err.to_string());
        }
        (report, result.err())
    }

    async fn drive(&self, job: &TrackerJob, report: &mut TrackerReport) -> Result<(), SyncError> {
        let adapter = job.adapter.as_ref();
        let retry = &self.settings.retry;
        let mut state = SyncState::Init;
        tracing::info!(url = %adapter.url(), backend = adapter.backend(), "Synchronizing tracker");

        let version = with_retry(retry, "server_version", || adapter.server_version())
            .await
            .map_err(|err| match err {
                FetchError::Unreachable(message) => SyncError::Unreachable(message),
                other => SyncError::from(other),
            })?;

        let mut tracker = Tracker::new(adapter.url(), adapter.backend());
        tracker.backend_version = version;
        let (row, mut tracker) = self.store_call(move |p| p.ensure_tracker(&tracker)).await?;
        let never_synced = tracker.last_synced_at.is_none() && tracker.checkpoint.watermark.is_none();

        let mut checkpoint =
            CheckpointManager::new(tracker.checkpoint.clone(), adapter.order(), job.page_size);
        report.watermark = checkpoint.watermark();
        let mut first_page = true;

        loop {
            if self.cancel.is_cancelled() {
                report.status = WorkerStatus::Cancelled;
                break;
            }

            transition(&mut state, SyncState::FetchingWindow);
            let window = checkpoint.next_fetch_window();
            let page = match with_retry(retry, "list page", || adapter.fetch_page(&window)).await {
                Ok(page) => page,
                Err(FetchError::Unreachable(message)) if first_page => {
                    return Err(SyncError::Unreachable(message));
                }
                Err(err) => return Err(err.into()),
            };

            if first_page && page.items.is_empty() && never_synced {
                return Err(SyncError::NoIssuesFound);
            }
            first_page = false;
            tracing::debug!(items = page.items.len(), cursor = ?window.cursor, "Fetched page");

            let mut new_items = 0;
            let mut interrupted = false;
            for summary in &page.items {
                if self.cancel.is_cancelled() {
                    interrupted = true;
                    break;
                }

                let fetched = match self.process_issue(job, row, summary, &mut state).await? {
                    IssueResult::Stored { outcome, warnings } => {
                        new_items += 1;
                        record(report, &outcome, warnings);
                        checkpoint.issue_persisted(summary.changed_on);
                        true
                    }
                    IssueResult::Unchanged => {
                        report.unchanged += 1;
                        checkpoint.issue_persisted(summary.changed_on);
                        false
                    }
                    IssueResult::Failed(reason) => {
                        tracing::warn!(issue_id = %summary.issue_id, "Skipping issue: {reason}");
                        report.skip(&summary.issue_id, reason);
                        checkpoint.issue_failed(summary.changed_on);
                        true
                    }
                };

                transition(&mut state, SyncState::Checkpointing);
                tracker.checkpoint = checkpoint.state().clone();
                self.save_tracker(row, &tracker).await?;
                report.watermark = checkpoint.watermark();

                if fetched && !job.delay.is_zero() {
                    tokio::select! {
                        () = tokio::time::sleep(job.delay) => {}
                        () = self.cancel.cancelled() => {}
                    }
                }
            }

            if interrupted {
                report.status = WorkerStatus::Cancelled;
                tracing::info!("Cancelled between issues");
                break;
            }

            let stop = checkpoint.page_stop(&page, new_items);
            checkpoint.page_completed(page.next_cursor.clone());

            if stop == PageStop::Continue {
                tracker.checkpoint = checkpoint.state().clone();
                self.save_tracker(row, &tracker).await?;
                continue;
            }

            if stop == PageStop::Stalled {
                tracing::warn!(cursor = ?page.next_cursor, "Pagination did not advance; ending window");
            }
            checkpoint.window_completed();
            tracker.checkpoint = checkpoint.state().clone();
            tracker.last_synced_at = Some(Utc::now());
            self.save_tracker(row, &tracker).await?;
            report.watermark = checkpoint.watermark();
            transition(&mut state, SyncState::Done);
            break;
        }

        tracing::info!(
            processed = report.processed,
            unchanged = report.unchanged,
            skipped = report.skipped.len(),
            watermark = ?report.watermark,
            "Tracker finished"
        );
        Ok(())
    }

    async fn process_issue(
        &self,
        job: &TrackerJob,
        row: i64,
        summary: &IssueSummary,
        state: &mut SyncState,
    ) -> Result<IssueResult, SyncError> {
        let issue_id = summary.issue_id.clone();
        let stored = self
            .store_call(move |p| p.stored_issue_update(row, &issue_id))
            .await?;
        if stored.is_some_and(|updated| updated >= summary.changed_on) {
            tracing::trace!(issue_id = %summary.issue_id, "Stored copy is current");
            return Ok(IssueResult::Unchanged);
        }

        transition(state, SyncState::Decoding);
        let adapter = job.adapter.as_ref();
        let raw = match with_retry(&self.settings.retry, "issue fetch", || adapter.fetch_issue(summary)).await {
            Ok(raw) => raw,
            Err(FetchError::Auth(message)) => return Err(SyncError::Auth(message)),
            Err(err) => return Ok(IssueResult::Failed(format!("fetch failed: {err}"))),
        };

        transition(state, SyncState::Reconstructing);
        let mut parsed = match job.parser.parse(&raw, &self.settings.parse) {
            Ok(parsed) => parsed,
            Err(err) => return Ok(IssueResult::Failed(format!("parse failed: {err}"))),
        };
        for warning in &parsed.warnings {
            tracing::warn!(issue_id = %summary.issue_id, "{warning}");
        }
        if parsed.issue.updated_on.is_none_or(|u| u < summary.changed_on) {
            parsed.issue.updated_on = Some(summary.changed_on);
        }

        transition(state, SyncState::Persisting);
        let issue = parsed.issue;
        match self.store_call(move |p| p.upsert_issue(row, &issue)).await {
            Ok(outcome) => Ok(IssueResult::Stored {
                outcome,
                warnings: parsed.warnings.len(),
            }),
            Err(err) => Ok(IssueResult::Failed(format!("store failed: {err}"))),
        }
    }

    async fn save_tracker(&self, row: i64, tracker: &Tracker) -> Result<(), Error> {
        let tracker = tracker.clone();
        self.store_call(move |p| p.save_tracker(row, &tracker)).await
    }

    /// Run a persister call on the blocking pool.
    ///
    /// Store calls take the connection lock and do file I/O; they stay off
    /// the async workers so other trackers keep fetching meanwhile.
    async fn store_call<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Persister<S>) -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        let persister = Arc::clone(&self.persister);
        let span = tracing::Span::current();
        tokio::task::spawn_blocking(move || span.in_scope(|| f(&persister)))
            .await
            .map_err(|err| Error::Other(format!("store task failed: {err}")))?
    }
}

fn transition(state: &mut SyncState, next: SyncState) {
    if *state != next {
        tracing::trace!("{state} -> {next}");
        *state = next;
    }
}

fn record(report: &mut TrackerReport, outcome: &UpsertOutcome, warnings: usize) {
    report.processed += 1;
    if outcome.created {
        report.created += 1;
    }
    report.comments.add(outcome.comments);
    report.attachments.add(outcome.attachments);
    report.changes.add(outcome.changes);
    report.watchers.add(outcome.watchers);
    report.warnings += warnings;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};
    use serde_json::json;

    use crate::identity::IdentityCache;
    use crate::model::{Change, Comment, Identity, Issue};
    use crate::storage::{Collection, SqliteStore};
    use crate::sync::adapter::{FetchWindow, Page, PageOrder, ParsedIssue, RawIssue};
    use crate::sync::types::ParseError;

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 3, 1, h, 0, 0).unwrap()
    }

    #[derive(Default)]
    struct FakeTracker {
        issues: Mutex<Vec<IssueSummary>>,
        failing: Mutex<HashSet<String>>,
        reject_auth: bool,
        pages: Mutex<usize>,
        fetched: Mutex<Vec<String>>,
    }

    impl FakeTracker {
        fn with_issues(issues: &[(&str, u32)]) -> Arc<Self> {
            let tracker = Self::default();
            *tracker.issues.lock().unwrap() = issues
                .iter()
                .map(|(id, h)| IssueSummary::new(*id, t(*h)))
                .collect();
            Arc::new(tracker)
        }

        fn fail(&self, id: &str) {
            self.failing.lock().unwrap().insert(id.to_string());
        }

        fn heal(&self) {
            self.failing.lock().unwrap().clear();
        }

        fn touch(&self, id: &str, h: u32) {
            let mut issues = self.issues.lock().unwrap();
            if let Some(issue) = issues.iter_mut().find(|i| i.issue_id == id) {
                issue.changed_on = t(h);
            }
            issues.sort_by_key(|i| i.changed_on);
        }

        fn take_fetched(&self) -> Vec<String> {
            std::mem::take(&mut *self.fetched.lock().unwrap())
        }
    }

    struct FakeAdapter {
        tracker: Arc<FakeTracker>,
        url: String,
    }

    #[async_trait]
    impl TrackerAdapter for FakeAdapter {
        fn backend(&self) -> &'static str {
            "fake"
        }

        fn url(&self) -> &str {
            &self.url
        }

        fn order(&self) -> PageOrder {
            PageOrder::Ascending
        }

        async fn server_version(&self) -> Result<Option<String>, FetchError> {
            if self.tracker.reject_auth {
                return Err(FetchError::Auth("401 Unauthorized".into()));
            }
            Ok(Some("1.0".into()))
        }

        async fn fetch_page(&self, window: &FetchWindow) -> Result<Page<IssueSummary>, FetchError> {
            *self.tracker.pages.lock().unwrap() += 1;
            let offset: usize = window
                .cursor
                .as_deref()
                .map_or(Ok(0), str::parse)
                .map_err(|_| FetchError::protocol("bad cursor"))?;
            let matching: Vec<_> = self
                .tracker
                .issues
                .lock()
                .unwrap()
                .iter()
                .filter(|i| window.since.is_none_or(|s| i.changed_on >= s))
                .cloned()
                .collect();
            let items: Vec<_> = matching.iter().skip(offset).take(window.page_size).cloned().collect();
            let next = offset + items.len();
            Ok(Page {
                has_more: next < matching.len(),
                next_cursor: Some(next.to_string()),
                items,
            })
        }

        async fn fetch_issue(&self, summary: &IssueSummary) -> Result<RawIssue, FetchError> {
            self.tracker.fetched.lock().unwrap().push(summary.issue_id.clone());
            if self.tracker.failing.lock().unwrap().contains(&summary.issue_id) {
                return Err(FetchError::NotFound(summary.issue_id.clone()));
            }
            let body = json!({ "id": summary.issue_id, "on": summary.changed_on.timestamp() });
            Ok(RawIssue::new(summary.clone()).with_part("issue", body.to_string()))
        }
    }

    struct FakeParser;

    impl IssueParser for FakeParser {
        fn parse(&self, raw: &RawIssue, _ctx: &ParseContext) -> Result<ParsedIssue, ParseError> {
            let doc: serde_json::Value = serde_json::from_slice(raw.require("issue")?)
                .map_err(|e| ParseError::invalid("issue", e.to_string()))?;
            let id = doc["id"].as_str().ok_or(ParseError::MissingField("id"))?;
            let on = doc["on"]
                .as_i64()
                .and_then(|s| DateTime::from_timestamp(s, 0))
                .ok_or(ParseError::MissingField("on"))?;

            let reporter = Identity::new("reporter");
            let mut issue = Issue::new(id, "bug", reporter.clone(), t(0));
            issue.status = "NEW".into();
            issue.updated_on = Some(on);
            issue.comments.push(Comment {
                text: format!("comment on {id}"),
                submitted_by: reporter.clone(),
                submitted_on: t(0),
            });
            issue.changes.push(Change::new("status", None, Some("NEW".into()), reporter, on));
            Ok(ParsedIssue {
                issue,
                warnings: Vec::new(),
            })
        }
    }

    fn settings() -> SyncSettings {
        SyncSettings {
            retry: RetryPolicy::default().without_retries(),
            parse: ParseContext::default(),
        }
    }

    fn orchestrator() -> Arc<Orchestrator<SqliteStore>> {
        let persister = Persister::new(
            Arc::new(SqliteStore::open_memory().unwrap()),
            Arc::new(IdentityCache::new()),
        );
        Arc::new(Orchestrator::new(Arc::new(persister), settings()))
    }

    fn job(name: &str, fake: &Arc<FakeTracker>, page_size: usize) -> TrackerJob {
        TrackerJob {
            name: name.into(),
            adapter: Box::new(FakeAdapter {
                tracker: Arc::clone(fake),
                url: format!("https://{name}.example.org"),
            }),
            parser: Box::new(FakeParser),
            page_size,
            delay: Duration::ZERO,
        }
    }

    fn count(o: &Orchestrator<SqliteStore>, c: Collection) -> usize {
        o.persister.store().read(|tx| tx.count(c, None)).unwrap()
    }

    #[tokio::test]
    async fn test_paginates_until_exhausted() {
        let o = orchestrator();
        let fake = FakeTracker::with_issues(&[("1", 1), ("2", 2), ("3", 3), ("4", 4), ("5", 5)]);

        let (report, err) = o.run_tracker(job("fake", &fake, 2)).await;

        assert!(err.is_none());
        assert_eq!(report.status, WorkerStatus::Completed);
        assert_eq!(report.processed, 5);
        assert_eq!(report.created, 5);
        assert_eq!(report.watermark, Some(t(5)));
        assert_eq!(*fake.pages.lock().unwrap(), 3);
        assert_eq!(count(&o, Collection::Issues), 5);
    }

    #[tokio::test]
    async fn test_store_calls_run_off_the_async_thread() {
        let o = orchestrator();
        let caller = std::thread::current().id();

        let worker = o
            .store_call(|p| {
                let issues = p.store().read(|tx| tx.count(Collection::Issues, None))?;
                Ok((issues, std::thread::current().id()))
            })
            .await
            .unwrap();

        assert_eq!(worker.0, 0);
        assert_ne!(worker.1, caller);
    }

    #[tokio::test]
    async fn test_rerun_stores_nothing_new() {
        let o = orchestrator();
        let fake = FakeTracker::with_issues(&[("1", 1), ("2", 2), ("3", 3)]);
        o.run_tracker(job("fake", &fake, 10)).await;
        fake.take_fetched();

        let (report, err) = o.run_tracker(job("fake", &fake, 10)).await;

        assert!(err.is_none());
        assert_eq!(report.processed, 0);
        assert_eq!(report.unchanged, 1);
        assert!(fake.take_fetched().is_empty());
        assert_eq!(count(&o, Collection::Comments), 3);
        assert_eq!(count(&o, Collection::Changes), 3);
    }

    #[tokio::test]
    async fn test_modified_issue_is_refetched() {
        let o = orchestrator();
        let fake = FakeTracker::with_issues(&[("1", 1), ("2", 2)]);
        o.run_tracker(job("fake", &fake, 10)).await;
        fake.take_fetched();

        fake.touch("1", 6);
        let (report, _) = o.run_tracker(job("fake", &fake, 10)).await;

        assert_eq!(fake.take_fetched(), vec!["1".to_string()]);
        assert_eq!(report.processed, 1);
        assert_eq!(report.created, 0);
        assert_eq!(report.changes.inserted, 1);
        assert_eq!(report.comments.skipped, 1);
        assert_eq!(count(&o, Collection::Issues), 2);
        assert_eq!(count(&o, Collection::Comments), 2);
    }

    #[tokio::test]
    async fn test_resume_refetches_failed_issue_only() {
        let o = orchestrator();
        let fake = FakeTracker::with_issues(&[("A", 1), ("B", 2), ("C", 3)]);
        fake.fail("B");

        let (report, err) = o.run_tracker(job("fake", &fake, 10)).await;
        assert!(err.is_none());
        assert_eq!(report.processed, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].issue_id, "B");
        assert_eq!(report.watermark, Some(t(2)));

        fake.heal();
        fake.take_fetched();
        let (report, _) = o.run_tracker(job("fake", &fake, 10)).await;

        assert_eq!(fake.take_fetched(), vec!["B".to_string()]);
        assert_eq!(report.processed, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.watermark, Some(t(3)));
        assert_eq!(count(&o, Collection::Issues), 3);
        assert_eq!(count(&o, Collection::Comments), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_is_fatal() {
        let o = orchestrator();
        let fake = Arc::new(FakeTracker {
            reject_auth: true,
            ..FakeTracker::default()
        });

        let outcome = o.run_all(vec![job("locked", &fake, 10)]).await;

        let fatal = outcome.fatal.as_ref().unwrap();
        assert!(matches!(fatal, Error::Auth { tracker, .. } if tracker == "locked"));
        assert_eq!(outcome.exit_code(), 3);
        assert_eq!(outcome.summary.trackers[0].status, WorkerStatus::Failed);
    }

    #[tokio::test]
    async fn test_empty_first_run_is_fatal() {
        let o = orchestrator();
        let fake = FakeTracker::with_issues(&[]);

        let outcome = o.run_all(vec![job("empty", &fake, 10)]).await;

        assert!(matches!(outcome.fatal, Some(Error::NoIssuesFound { .. })));
        assert_eq!(outcome.exit_code(), 4);
    }

    #[tokio::test]
    async fn test_empty_window_after_first_sync_is_fine() {
        let o = orchestrator();
        let fake = FakeTracker::with_issues(&[("1", 1)]);
        o.run_tracker(job("fake", &fake, 10)).await;

        fake.issues.lock().unwrap().clear();
        let (report, err) = o.run_tracker(job("fake", &fake, 10)).await;
        assert!(err.is_none());
        assert_eq!(report.status, WorkerStatus::Completed);
    }

    #[tokio::test]
    async fn test_skipped_issues_do_not_fail_the_run() {
        let o = orchestrator();
        let good = FakeTracker::with_issues(&[("1", 1), ("2", 2)]);
        let flaky = FakeTracker::with_issues(&[("7", 1)]);
        flaky.fail("7");

        let outcome = o
            .run_all(vec![job("good", &good, 10), job("flaky", &flaky, 10)])
            .await;

        assert!(outcome.fatal.is_none());
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(outcome.summary.processed(), 2);
        assert_eq!(outcome.summary.skipped(), 1);
        assert_eq!(outcome.summary.trackers[0].tracker, "flaky");
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_before_issues() {
        let o = orchestrator();
        let fake = FakeTracker::with_issues(&[("1", 1), ("2", 2)]);
        o.cancellation_token().cancel();

        let (report, err) = o.run_tracker(job("fake", &fake, 10)).await;
        assert!(err.is_none());
        assert_eq!(report.status, WorkerStatus::Cancelled);
        assert_eq!(report.processed, 0);
    }
}
