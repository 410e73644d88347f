use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;
use url::Url;

use super::{BACKEND, ISSUE_PART, PRIORITIES_PART, STATUSES_PART};
use crate::decode::{Decoder, JsonDecoder};
use crate::http::{Auth, TrackerClient};
use crate::model::{IssueSummary, parse_timestamp};
use crate::sync::{FetchError, FetchWindow, Page, RawIssue, TrackerAdapter};

/// API key header, or basic auth when a user name is configured.
#[must_use]
pub fn auth(token: Option<String>, user: Option<String>) -> Auth {
    match (token, user) {
        (Some(password), Some(user)) => Auth::Basic { user, password },
        (Some(value), None) => Auth::Header {
            name: "X-Redmine-API-Key".to_string(),
            value,
        },
        (None, _) => Auth::Anonymous,
    }
}

pub struct RedmineAdapter {
    client: TrackerClient,
    base: Url,
    project: Option<String>,
    statuses: OnceCell<Vec<u8>>,
    priorities: OnceCell<Vec<u8>>,
}

impl RedmineAdapter {
    pub fn new(client: TrackerClient, base: Url, project: Option<String>) -> Self {
        Self {
            client,
            base,
            project,
            statuses: OnceCell::new(),
            priorities: OnceCell::new(),
        }
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<u8>, FetchError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| FetchError::protocol(format!("bad url for {path}: {e}")))?;
        self.client.get(&url, query).await
    }

    async fn lookup(&self, cell: &OnceCell<Vec<u8>>, path: &str) -> Result<Vec<u8>, FetchError> {
        cell.get_or_try_init(|| self.get(path, &[]))
            .await
            .cloned()
    }
}

#[async_trait]
impl TrackerAdapter for RedmineAdapter {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn url(&self) -> &str {
        self.base.as_str()
    }

    async fn server_version(&self) -> Result<Option<String>, FetchError> {
        self.lookup(&self.statuses, "issue_statuses.json").await?;
        Ok(None)
    }

    async fn fetch_page(&self, window: &FetchWindow) -> Result<Page<IssueSummary>, FetchError> {
        let offset: usize = match window.cursor.as_deref() {
            Some(c) => c
                .parse()
                .map_err(|_| FetchError::protocol(format!("bad offset cursor {c:?}")))?,
            None => 0,
        };

        let mut query = vec![
            ("status_id", "*".to_string()),
            ("sort", "updated_on,id".to_string()),
            ("limit", window.page_size.to_string()),
            ("offset", offset.to_string()),
        ];
        if let Some(since) = window.since {
            query.push(("updated_on", format!(">={}", since.format("%Y-%m-%dT%H:%M:%SZ"))));
        }
        if let Some(project) = &self.project {
            query.push(("project_id", project.clone()));
        }

        let body = self.get("issues.json", &query).await?;
        let doc = JsonDecoder.decode(&body)?;
        let issues = doc
            .get("issues")
            .and_then(Value::as_array)
            .ok_or_else(|| FetchError::protocol("listing has no 'issues' array"))?;

        let mut items = Vec::with_capacity(issues.len());
        for issue in issues {
            let id = issue.get("id").and_then(Value::as_u64);
            let updated = issue.get("updated_on").and_then(Value::as_str);
            match (id, updated.map(parse_timestamp)) {
                (Some(id), Some(Ok(changed_on))) => items.push(IssueSummary::new(id.to_string(), changed_on)),
                _ => {
                    let raw_id = issue.get("id").unwrap_or(&Value::Null);
                    tracing::warn!(issue = %raw_id, "Skipping listing entry");
                }
            }
        }

        let next = offset + issues.len();
        let total = doc.get("total_count").and_then(Value::as_u64);
        let has_more = match total {
            Some(total) => (next as u64) < total,
            None => issues.len() >= window.page_size,
        };
        Ok(Page {
            items,
            next_cursor: Some(next.to_string()),
            has_more,
        })
    }

    async fn fetch_issue(&self, summary: &IssueSummary) -> Result<RawIssue, FetchError> {
        let path = format!("issues/{}.json", summary.issue_id);
        let issue = self
            .get(&path, &[("include", "journals,attachments,watchers".to_string())])
            .await?;
        let statuses = self.lookup(&self.statuses, "issue_statuses.json").await?;
        let priorities = self
            .lookup(&self.priorities, "enumerations/issue_priorities.json")
            .await?;

        Ok(RawIssue::new(summary.clone())
            .with_part(ISSUE_PART, issue)
            .with_part(STATUSES_PART, statuses)
            .with_part(PRIORITIES_PART, priorities))
    }
}
