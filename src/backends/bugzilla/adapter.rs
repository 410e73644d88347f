use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use super::{ACTIVITY_PART, BACKEND, ISSUE_PART};
use crate::decode::{CsvDecoder, Decoder, XmlDecoder};
use crate::http::{Auth, TrackerClient};
use crate::model::{IssueSummary, parse_timestamp};
use crate::sync::{FetchError, FetchWindow, Page, RawIssue, TrackerAdapter};

/// Credentials travel as the `Bugzilla_api_key` query parameter.
#[must_use]
pub fn auth(token: Option<String>) -> Auth {
    token.map_or(Auth::Anonymous, |value| Auth::Query {
        name: "Bugzilla_api_key".to_string(),
        value,
    })
}

pub struct BugzillaAdapter {
    client: TrackerClient,
    base: Url,
    product: Option<String>,
}

impl BugzillaAdapter {
    pub fn new(client: TrackerClient, base: Url, product: Option<String>) -> Self {
        Self {
            client,
            base,
            product,
        }
    }

    fn endpoint(&self, script: &str) -> Result<Url, FetchError> {
        self.base
            .join(script)
            .map_err(|e| FetchError::protocol(format!("bad url for {script}: {e}")))
    }

    async fn bug_xml(&self, id: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.endpoint("show_bug.cgi")?;
        self.client
            .get(&url, &[("ctype", "xml".to_string()), ("id", id.to_string())])
            .await
    }
}

/// Bugzilla's search form takes local-looking timestamps.
fn search_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[async_trait]
impl TrackerAdapter for BugzillaAdapter {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn url(&self) -> &str {
        self.base.as_str()
    }

    async fn server_version(&self) -> Result<Option<String>, FetchError> {
        let body = self.bug_xml("0").await?;
        let root = XmlDecoder.decode(&body)?;
        if root.local_name() != "bugzilla" {
            return Err(FetchError::protocol(format!(
                "expected a <bugzilla> document, got <{}>",
                root.name
            )));
        }
        Ok(root.attr("version").map(str::to_string))
    }

    async fn fetch_page(&self, window: &FetchWindow) -> Result<Page<IssueSummary>, FetchError> {
        let offset: usize = match window.cursor.as_deref() {
            Some(c) => c
                .parse()
                .map_err(|_| FetchError::protocol(format!("bad offset cursor {c:?}")))?,
            None => 0,
        };

        let mut query = vec![
            ("ctype", "csv".to_string()),
            ("columnlist", "changeddate".to_string()),
            ("order", "changeddate,bug_id".to_string()),
            ("limit", window.page_size.to_string()),
            ("offset", offset.to_string()),
        ];
        if let Some(since) = window.since {
            query.push(("chfieldfrom", search_time(since)));
            query.push(("chfieldto", "Now".to_string()));
        }
        if let Some(product) = &self.product {
            query.push(("product", product.clone()));
        }

        let url = self.endpoint("buglist.cgi")?;
        let body = self.client.get(&url, &query).await?;
        let table = CsvDecoder.decode(&body)?;

        let mut items = Vec::with_capacity(table.len());
        for record in table.records() {
            let (Some(id), Some(changed)) = (record.get("bug_id"), record.get("changeddate")) else {
                tracing::warn!("Listing row without bug_id or changeddate");
                continue;
            };
            match parse_timestamp(changed) {
                Ok(changed_on) => items.push(IssueSummary::new(id, changed_on)),
                Err(e) => tracing::warn!(bug_id = id, "Skipping listing row: {e}"),
            }
        }

        let next = offset + table.len();
        Ok(Page {
            has_more: table.len() >= window.page_size,
            next_cursor: Some(next.to_string()),
            items,
        })
    }

    async fn fetch_issue(&self, summary: &IssueSummary) -> Result<RawIssue, FetchError> {
        let xml = self.bug_xml(&summary.issue_id).await?;

        let url = self.endpoint("show_activity.cgi")?;
        let activity = self
            .client
            .get(&url, &[("id", summary.issue_id.clone())])
            .await?;

        Ok(RawIssue::new(summary.clone())
            .with_part(ISSUE_PART, xml)
            .with_part(ACTIVITY_PART, activity))
    }
}
