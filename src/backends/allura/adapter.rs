use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::{BACKEND, DEFAULT_TOOL, FEED_PART, ISSUE_PART};
use crate::decode::{Decoder, JsonDecoder};
use crate::http::{Auth, TrackerClient};
use crate::model::{IssueSummary, parse_timestamp};
use crate::sync::{FetchError, FetchWindow, Page, RawIssue, TrackerAdapter};

/// OAuth bearer token, if configured.
#[must_use]
pub fn auth(token: Option<String>) -> Auth {
    token.map_or(Auth::Anonymous, Auth::Bearer)
}

pub struct AlluraAdapter {
    client: TrackerClient,
    base: Url,
    /// `project/tool` mount path.
    mount: String,
}

impl AlluraAdapter {
    pub fn new(client: TrackerClient, base: Url, project: &str) -> Self {
        let project = project.trim_matches('/');
        let mount = if project.contains('/') {
            project.to_string()
        } else {
            format!("{project}/{DEFAULT_TOOL}")
        };
        Self { client, base, mount }
    }

    fn join(&self, path: &str) -> Result<Url, FetchError> {
        self.base
            .join(path)
            .map_err(|e| FetchError::protocol(format!("bad url for {path}: {e}")))
    }

    fn rest(&self, suffix: &str) -> Result<Url, FetchError> {
        self.join(&format!("rest/p/{}/{suffix}", self.mount))
    }
}

#[async_trait]
impl TrackerAdapter for AlluraAdapter {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn url(&self) -> &str {
        self.base.as_str()
    }

    async fn server_version(&self) -> Result<Option<String>, FetchError> {
        let url = self.rest("")?;
        self.client.get(&url, &[("limit", "1".to_string())]).await?;
        Ok(None)
    }

    async fn fetch_page(&self, window: &FetchWindow) -> Result<Page<IssueSummary>, FetchError> {
        let page: usize = match window.cursor.as_deref() {
            Some(c) => c
                .parse()
                .map_err(|_| FetchError::protocol(format!("bad page cursor {c:?}")))?,
            None => 0,
        };
        let since = window
            .since
            .map_or_else(|| "*".to_string(), |s| s.format("%Y-%m-%dT%H:%M:%SZ").to_string());

        let url = self.rest("search")?;
        let query = [
            ("q", format!("mod_date_dt:[{since} TO *]")),
            ("sort", "mod_date_dt asc".to_string()),
            ("limit", window.page_size.to_string()),
            ("page", page.to_string()),
        ];
        let body = self.client.get(&url, &query).await?;
        let doc = JsonDecoder.decode(&body)?;
        let tickets = doc
            .get("tickets")
            .and_then(Value::as_array)
            .ok_or_else(|| FetchError::protocol("search result has no 'tickets' array"))?;

        let mut items = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            let num = ticket.get("ticket_num").and_then(Value::as_u64);
            let modified = ticket
                .get("mod_date")
                .and_then(Value::as_str)
                .map(parse_timestamp);
            match (num, modified) {
                (Some(num), Some(Ok(changed_on))) => items.push(IssueSummary::new(num.to_string(), changed_on)),
                _ => tracing::warn!(ticket = ?ticket.get("ticket_num"), "Skipping search entry"),
            }
        }

        let seen = (page + 1) * window.page_size;
        let has_more = match doc.get("count").and_then(Value::as_u64) {
            Some(count) => (seen as u64) < count,
            None => tickets.len() >= window.page_size,
        };
        Ok(Page {
            items,
            next_cursor: Some((page + 1).to_string()),
            has_more,
        })
    }

    async fn fetch_issue(&self, summary: &IssueSummary) -> Result<RawIssue, FetchError> {
        let ticket = self.client.get(&self.rest(&summary.issue_id)?, &[]).await?;
        let mut raw = RawIssue::new(summary.clone()).with_part(ISSUE_PART, ticket);

        let feed_url = self.join(&format!("p/{}/{}/feed.atom", self.mount, summary.issue_id))?;
        match self.client.get(&feed_url, &[]).await {
            Ok(feed) => raw = raw.with_part(FEED_PART, feed),
            Err(FetchError::NotFound(_)) => {
                tracing::debug!(ticket = %summary.issue_id, "No ticket feed; using discussion posts");
            }
            Err(e) => return Err(e),
        }
        Ok(raw)
    }
}
