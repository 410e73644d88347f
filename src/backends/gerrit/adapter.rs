use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::DateTime;
use serde_json::Value;
use url::Url;

use super::{BACKEND, CommandRunner, ISSUE_PART};
use crate::decode::{Decoder, JsonLinesDecoder};
use crate::model::IssueSummary;
use crate::sync::{FetchError, FetchWindow, Page, PageOrder, RawIssue, TrackerAdapter};

const SORTKEY_CURSOR: &str = "sortkey:";
const START_CURSOR: &str = "start:";

pub struct GerritAdapter {
    runner: Arc<dyn CommandRunner>,
    base: Url,
    project: String,
    /// Result lines from the last listing, keyed by change number.
    lines: Mutex<HashMap<String, Vec<u8>>>,
}

impl GerritAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>, base: Url, project: String) -> Self {
        Self {
            runner,
            base,
            project,
            lines: Mutex::new(HashMap::new()),
        }
    }

    async fn query(&self, terms: Vec<String>) -> Result<Vec<Value>, FetchError> {
        let mut args: Vec<String> = [
            "gerrit",
            "query",
            "--format=JSON",
            "--all-approvals",
            "--comments",
            "--patch-sets",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        args.extend(terms);

        let out = self.runner.run(&args).await?;
        Ok(JsonLinesDecoder.decode(&out)?)
    }

    fn remember(&self, number: &str, line: &Value) {
        if let Ok(bytes) = serde_json::to_vec(line) {
            self.lines
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(number.to_string(), bytes);
        }
    }

    fn take_cached(&self, number: &str) -> Option<Vec<u8>> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(number)
    }
}

fn change_number(line: &Value) -> Option<String> {
    match line.get("number")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl TrackerAdapter for GerritAdapter {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn url(&self) -> &str {
        self.base.as_str()
    }

    fn order(&self) -> PageOrder {
        PageOrder::Descending
    }

    async fn server_version(&self) -> Result<Option<String>, FetchError> {
        let out = self
            .runner
            .run(&["gerrit".to_string(), "version".to_string()])
            .await?;
        let text = String::from_utf8_lossy(&out);
        Ok(text
            .trim()
            .strip_prefix("gerrit version ")
            .map(str::to_string))
    }

    async fn fetch_page(&self, window: &FetchWindow) -> Result<Page<IssueSummary>, FetchError> {
        let mut terms = vec![format!("project:{}", self.project)];
        let mut start = 0usize;
        match window.cursor.as_deref() {
            Some(c) if c.starts_with(SORTKEY_CURSOR) => {
                terms.push(format!("resume_sortkey:{}", &c[SORTKEY_CURSOR.len()..]));
            }
            Some(c) => {
                start = c
                    .strip_prefix(START_CURSOR)
                    .unwrap_or(c)
                    .parse()
                    .map_err(|_| FetchError::protocol(format!("bad gerrit cursor {c:?}")))?;
                terms.push("--start".to_string());
                terms.push(start.to_string());
            }
            None => {}
        }
        terms.push(format!("limit:{}", window.page_size));

        let lines = self.query(terms).await?;

        let mut items = Vec::new();
        let mut rows = 0usize;
        let mut more_changes = None;
        let mut reached_since = false;
        let mut last_sortkey = None;

        for line in &lines {
            if line.get("type").and_then(Value::as_str) == Some("stats") {
                more_changes = line.get("moreChanges").and_then(Value::as_bool);
                continue;
            }
            rows += 1;
            let (Some(number), Some(updated)) = (
                change_number(line),
                line.get("lastUpdated").and_then(Value::as_i64),
            ) else {
                tracing::warn!(line = %line, "Skipping gerrit result without number or lastUpdated");
                continue;
            };
            last_sortkey = line.get("sortKey").and_then(Value::as_str).map(str::to_string);

            let Some(changed_on) = DateTime::from_timestamp(updated, 0) else {
                continue;
            };
            if window.since.is_some_and(|since| changed_on < since) {
                reached_since = true;
                break;
            }
            self.remember(&number, line);
            items.push(IssueSummary::new(number, changed_on));
        }

        let has_more = !reached_since && more_changes.unwrap_or(rows >= window.page_size) && rows > 0;
        let next_cursor = match last_sortkey {
            Some(key) => Some(format!("{SORTKEY_CURSOR}{key}")),
            None => Some(format!("{START_CURSOR}{}", start + rows)),
        };
        Ok(Page {
            items,
            next_cursor,
            has_more,
        })
    }

    async fn fetch_issue(&self, summary: &IssueSummary) -> Result<RawIssue, FetchError> {
        if let Some(line) = self.take_cached(&summary.issue_id) {
            return Ok(RawIssue::new(summary.clone()).with_part(ISSUE_PART, line));
        }

        let lines = self
            .query(vec![format!("change:{}", summary.issue_id)])
            .await?;
        let line = lines
            .iter()
            .find(|l| change_number(l).as_deref() == Some(summary.issue_id.as_str()))
            .ok_or_else(|| FetchError::NotFound(format!("change {}", summary.issue_id)))?;
        let bytes = serde_json::to_vec(line).map_err(|e| FetchError::protocol(e.to_string()))?;
        Ok(RawIssue::new(summary.clone()).with_part(ISSUE_PART, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use chrono::{TimeZone, Utc};

    /// Replays canned outputs and records every invocation.
    #[derive(Default)]
    struct FakeRunner {
        outputs: Mutex<VecDeque<Result<Vec<u8>, FetchError>>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl FakeRunner {
        fn with(outputs: Vec<Result<&str, FetchError>>) -> Arc<Self> {
            let runner = Self::default();
            *runner.outputs.lock().unwrap() = outputs
                .into_iter()
                .map(|o| o.map(|s| s.as_bytes().to_vec()))
                .collect();
            Arc::new(runner)
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, args: &[String]) -> Result<Vec<u8>, FetchError> {
            self.calls.lock().unwrap().push(args.to_vec());
            self.outputs
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Transient("no output".into())))
        }
    }

    const PAGE: &str = concat!(
        r#"{"project":"core","number":"12","lastUpdated":1359716000,"sortKey":"k12"}"#,
        "\n",
        r#"{"project":"core","number":"11","lastUpdated":1359713000,"sortKey":"k11"}"#,
        "\n",
        r#"{"type":"stats","rowCount":2,"runTimeMilliseconds":5,"moreChanges":true}"#,
        "\n",
    );

    fn adapter(runner: Arc<FakeRunner>) -> GerritAdapter {
        GerritAdapter::new(
            runner,
            Url::parse("https://review.example.org/").unwrap(),
            "core".into(),
        )
    }

    fn window(since: Option<i64>, cursor: Option<&str>) -> FetchWindow {
        FetchWindow {
            since: since.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
            cursor: cursor.map(String::from),
            page_size: 2,
        }
    }

    #[tokio::test]
    async fn test_listing_reads_lines_and_sortkey() {
        let runner = FakeRunner::with(vec![Ok(PAGE)]);
        let adapter = adapter(runner.clone());

        let page = adapter.fetch_page(&window(None, Some("sortkey:k13"))).await.unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].issue_id, "12");
        assert!(page.has_more);
        assert_eq!(page.next_cursor.as_deref(), Some("sortkey:k11"));
        let call = &runner.calls()[0];
        assert!(call.contains(&"project:core".to_string()));
        assert!(call.contains(&"resume_sortkey:k13".to_string()));
        assert!(call.contains(&"limit:2".to_string()));
    }

    #[tokio::test]
    async fn test_listing_stops_at_since() {
        let runner = FakeRunner::with(vec![Ok(PAGE)]);
        let page = adapter(runner)
            .fetch_page(&window(Some(1_359_714_000), None))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_fetch_issue_served_from_listing() {
        let runner = FakeRunner::with(vec![Ok(PAGE)]);
        let adapter = adapter(runner.clone());
        let page = adapter.fetch_page(&window(None, None)).await.unwrap();

        let raw = adapter.fetch_issue(&page.items[1]).await.unwrap();
        let line: Value = serde_json::from_slice(raw.part(ISSUE_PART).unwrap()).unwrap();
        assert_eq!(line["number"], "11");
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_issue_queries_uncached_change() {
        let runner = FakeRunner::with(vec![Ok(concat!(
            r#"{"number":"7","lastUpdated":1359716000}"#,
            "\n",
            r#"{"type":"stats","rowCount":1}"#
        ))]);
        let adapter = adapter(runner.clone());

        let summary = IssueSummary::new("7", Utc::now());
        assert!(adapter.fetch_issue(&summary).await.is_ok());
        assert!(runner.calls()[0].contains(&"change:7".to_string()));
    }

    #[tokio::test]
    async fn test_server_version_is_read() {
        let runner = FakeRunner::with(vec![Ok("gerrit version 2.16.28\n")]);
        assert_eq!(adapter(runner).server_version().await.unwrap().as_deref(), Some("2.16.28"));
    }
}
