use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::{Value, json};
use url::Url;

use super::{BACKEND, ISSUE_PART, TRANSACTIONS_PART, USERS_PART};
use crate::decode::{Decoder, JsonDecoder};
use crate::http::TrackerClient;
use crate::model::IssueSummary;
use crate::sync::{FetchError, FetchWindow, Page, RawIssue, TrackerAdapter};

/// Conduit caps result pages at 100.
const MAX_CONDUIT_LIMIT: usize = 100;

const AUTH_ERRORS: &[&str] = &["ERR-INVALID-AUTH", "ERR-INVALID-SESSION", "ERR-NO-CERTIFICATE"];

pub struct ManiphestAdapter {
    client: TrackerClient,
    base: Url,
    token: String,
    project: Option<String>,
}

impl ManiphestAdapter {
    pub fn new(client: TrackerClient, base: Url, token: String, project: Option<String>) -> Self {
        Self {
            client,
            base,
            token,
            project,
        }
    }

    /// Call a Conduit method and return its `result`.
    async fn call(&self, method: &str, mut params: Vec<(String, String)>) -> Result<Value, FetchError> {
        let url = self
            .base
            .join(&format!("api/{method}"))
            .map_err(|e| FetchError::protocol(format!("bad url for {method}: {e}")))?;
        params.push(("api.token".to_string(), self.token.clone()));

        let body = self.client.post_form(&url, &params).await?;
        let mut doc = JsonDecoder.decode(&body)?;

        if let Some(code) = doc.get("error_code").and_then(Value::as_str) {
            let info = doc
                .get("error_info")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let message = format!("{method}: {code}: {info}");
            return Err(if AUTH_ERRORS.contains(&code) {
                FetchError::Auth(message)
            } else {
                FetchError::Protocol(message)
            });
        }
        Ok(doc.get_mut("result").map(Value::take).unwrap_or(Value::Null))
    }

    async fn transactions(&self, task_id: &str) -> Result<Vec<Value>, FetchError> {
        let mut all = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let mut params = vec![
                ("objectIdentifier".to_string(), format!("T{task_id}")),
                ("limit".to_string(), MAX_CONDUIT_LIMIT.to_string()),
            ];
            if let Some(cursor) = &after {
                params.push(("after".to_string(), cursor.clone()));
            }
            let mut result = self.call("transaction.search", params).await?;
            if let Some(Value::Array(data)) = result.get_mut("data").map(Value::take) {
                all.extend(data);
            }
            after = cursor_after(&result);
            if after.is_none() {
                return Ok(all);
            }
        }
    }

    async fn users(&self, phids: &BTreeSet<String>) -> Result<Vec<Value>, FetchError> {
        let phids: Vec<&String> = phids.iter().collect();
        let mut all = Vec::new();
        for chunk in phids.chunks(MAX_CONDUIT_LIMIT) {
            let params = chunk
                .iter()
                .enumerate()
                .map(|(i, phid)| (format!("constraints[phids][{i}]"), (*phid).clone()))
                .collect();
            let mut result = self.call("user.search", params).await?;
            if let Some(Value::Array(data)) = result.get_mut("data").map(Value::take) {
                all.extend(data);
            }
        }
        Ok(all)
    }
}

fn cursor_after(result: &Value) -> Option<String> {
    match result.get("cursor")?.get("after")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// User PHIDs referenced by a task and its transactions.
fn referenced_users(task: &Value, transactions: &[Value]) -> BTreeSet<String> {
    let mut phids = BTreeSet::new();
    let mut add = |v: Option<&Value>| {
        if let Some(s) = v.and_then(Value::as_str) {
            if s.starts_with("PHID-USER-") {
                phids.insert(s.to_string());
            }
        }
    };

    let fields = &task["fields"];
    add(fields.get("authorPHID"));
    add(fields.get("ownerPHID"));
    if let Some(subscribers) = task["attachments"]["subscribers"]["subscriberPHIDs"].as_array() {
        subscribers.iter().for_each(|s| add(Some(s)));
    }
    for tx in transactions {
        add(tx.get("authorPHID"));
        if tx.get("type").and_then(Value::as_str) == Some("owner") {
            add(tx["fields"].get("old"));
            add(tx["fields"].get("new"));
        }
    }
    phids
}

#[async_trait]
impl TrackerAdapter for ManiphestAdapter {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn url(&self) -> &str {
        self.base.as_str()
    }

    async fn server_version(&self) -> Result<Option<String>, FetchError> {
        let me = self.call("user.whoami", Vec::new()).await?;
        tracing::debug!(user = ?me.get("userName"), "Conduit session");
        Ok(None)
    }

    async fn fetch_page(&self, window: &FetchWindow) -> Result<Page<IssueSummary>, FetchError> {
        let mut params = vec![
            ("order".to_string(), "outdated".to_string()),
            ("limit".to_string(), window.page_size.min(MAX_CONDUIT_LIMIT).to_string()),
        ];
        if let Some(since) = window.since {
            params.push(("constraints[modifiedStart]".to_string(), since.timestamp().to_string()));
        }
        if let Some(project) = &self.project {
            params.push(("constraints[projects][0]".to_string(), project.clone()));
        }
        if let Some(cursor) = &window.cursor {
            params.push(("after".to_string(), cursor.clone()));
        }

        let result = self.call("maniphest.search", params).await?;
        let data = result
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| FetchError::protocol("maniphest.search returned no data"))?;

        let items = data
            .iter()
            .filter_map(|task| {
                let id = task.get("id").and_then(Value::as_u64)?;
                let modified = task["fields"].get("dateModified").and_then(Value::as_i64)?;
                let changed_on = chrono::DateTime::from_timestamp(modified, 0)?;
                Some(IssueSummary::new(id.to_string(), changed_on))
            })
            .collect();

        let next_cursor = cursor_after(&result);
        Ok(Page {
            has_more: next_cursor.is_some(),
            next_cursor,
            items,
        })
    }

    async fn fetch_issue(&self, summary: &IssueSummary) -> Result<RawIssue, FetchError> {
        let params = vec![
            ("constraints[ids][0]".to_string(), summary.issue_id.clone()),
            ("attachments[subscribers]".to_string(), "1".to_string()),
            ("attachments[projects]".to_string(), "1".to_string()),
        ];
        let task = self.call("maniphest.search", params).await?;
        let Some(first) = task["data"].get(0) else {
            return Err(FetchError::NotFound(format!("task T{}", summary.issue_id)));
        };

        let transactions = self.transactions(&summary.issue_id).await?;
        let users = self.users(&referenced_users(first, &transactions)).await?;

        let task_part = serde_json::to_vec(first).map_err(|e| FetchError::protocol(e.to_string()))?;
        let tx_part = serde_json::to_vec(&json!({ "data": transactions }))
            .map_err(|e| FetchError::protocol(e.to_string()))?;
        let users_part = serde_json::to_vec(&json!({ "data": users }))
            .map_err(|e| FetchError::protocol(e.to_string()))?;

        Ok(RawIssue::new(summary.clone())
            .with_part(ISSUE_PART, task_part)
            .with_part(TRANSACTIONS_PART, tx_part)
            .with_part(USERS_PART, users_part))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;

    use crate::http::{Auth, HttpMethod, MockTransport};

    const BASE: &str = "https://phab.example.org/";

    fn adapter(mock: &MockTransport) -> ManiphestAdapter {
        let client = TrackerClient::new(Arc::new(mock.clone()), Auth::Anonymous);
        ManiphestAdapter::new(client, Url::parse(BASE).unwrap(), "api-token".into(), None)
    }

    #[tokio::test]
    async fn test_invalid_auth_is_auth_error() {
        let mock = MockTransport::new();
        mock.push(
            HttpMethod::Post,
            "https://phab.example.org/api/user.whoami",
            200,
            r#"{"result":null,"error_code":"ERR-INVALID-AUTH","error_info":"API token is invalid."}"#,
        );
        assert!(matches!(adapter(&mock).server_version().await, Err(FetchError::Auth(_))));
        let body = String::from_utf8(mock.requests()[0].body.clone()).unwrap();
        assert!(body.contains("api.token=api-token"));
    }

    #[tokio::test]
    async fn test_listing_follows_after_cursor() {
        let mock = MockTransport::new();
        mock.push(
            HttpMethod::Post,
            "https://phab.example.org/api/maniphest.search",
            200,
            r#"{"result":{"data":[{"id":5,"phid":"PHID-TASK-5","fields":{"dateModified":1400000000}}],
                "cursor":{"limit":1,"after":"5","before":null}},"error_code":null,"error_info":null}"#,
        );
        let window = FetchWindow {
            since: None,
            cursor: None,
            page_size: 1,
        };

        let page = adapter(&mock).fetch_page(&window).await.unwrap();
        assert_eq!(page.items[0].issue_id, "5");
        assert_eq!(page.next_cursor.as_deref(), Some("5"));
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn test_fetch_issue_gathers_history_and_users() {
        let mock = MockTransport::new();
        mock.push(
            HttpMethod::Post,
            "https://phab.example.org/api/maniphest.search",
            200,
            r#"{"result":{"data":[{"id":5,"phid":"PHID-TASK-5","fields":{"authorPHID":"PHID-USER-a","ownerPHID":null}}]},"error_code":null}"#,
        );
        mock.push(
            HttpMethod::Post,
            "https://phab.example.org/api/transaction.search",
            200,
            r#"{"result":{"data":[{"id":1,"type":"owner","authorPHID":"PHID-USER-a","fields":{"old":null,"new":"PHID-USER-b"}}],"cursor":{"after":"1"}},"error_code":null}"#,
        );
        mock.push(
            HttpMethod::Post,
            "https://phab.example.org/api/transaction.search",
            200,
            r#"{"result":{"data":[],"cursor":{"after":null}},"error_code":null}"#,
        );
        mock.push(
            HttpMethod::Post,
            "https://phab.example.org/api/user.search",
            200,
            r#"{"result":{"data":[]},"error_code":null}"#,
        );

        let raw = adapter(&mock)
            .fetch_issue(&IssueSummary::new("5", Utc::now()))
            .await
            .unwrap();
        assert!(raw.part(TRANSACTIONS_PART).is_some());

        let requests = mock.requests();
        assert_eq!(requests.len(), 4);
        let users_body = String::from_utf8(requests[3].body.clone()).unwrap();
        assert!(users_body.contains("PHID-USER-a"));
        assert!(users_body.contains("PHID-USER-b"));
    }
}
