use std::collections::HashMap;

use chrono::DateTime;
use serde_json::Value;

use super::{BACKEND, ISSUE_PART, TRANSACTIONS_PART, USERS_PART};
use crate::backends::{json_array, json_str};
use crate::changelog::{ChangeLog, FieldDiff, IssueOutcome, Transaction, apply_transactions};
use crate::decode::{Decoder, JsonDecoder};
use crate::model::{Comment, Identity, Issue, IssueExtension};
use crate::sync::{IssueParser, ParseContext, ParseError, ParsedIssue, RawIssue};

/// Transaction types whose `fields.old/new` carry a plain field diff.
const FIELD_TRANSACTIONS: &[(&str, &str)] = &[
    ("status", "status"),
    ("priority", "priority"),
    ("owner", "assigned_to"),
    ("title", "summary"),
    ("points", "points"),
    ("subtype", "subtype"),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct ManiphestParser;

/// PHID → identity, falling back to a bare PHID identity.
struct Users(HashMap<String, Identity>);

impl Users {
    fn from_part(raw: Option<&[u8]>) -> Result<Self, ParseError> {
        let mut map = HashMap::new();
        if let Some(raw) = raw {
            let doc = JsonDecoder.decode(raw)?;
            for user in json_array(&doc, "data") {
                let Some(phid) = json_str(user, "phid") else {
                    continue;
                };
                let fields = &user["fields"];
                let login = json_str(fields, "username").unwrap_or_else(|| phid.clone());
                map.insert(
                    phid,
                    Identity::new(login).with_name(json_str(fields, "realName")),
                );
            }
        }
        Ok(Self(map))
    }

    fn get(&self, phid: &str) -> Identity {
        self.0
            .get(phid)
            .cloned()
            .unwrap_or_else(|| Identity::new(phid))
    }

    fn login(&self, phid: Option<String>) -> Option<String> {
        phid.map(|p| self.get(&p).user_id)
    }
}

/// Render a transaction value: scalars as text, `{value, name}` objects by name.
fn scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        obj @ Value::Object(_) => json_str(obj, "name").or_else(|| json_str(obj, "value")),
        _ => None,
    }
}

fn epoch(value: &Value, key: &'static str) -> Result<chrono::DateTime<chrono::Utc>, ParseError> {
    let secs = value
        .get(key)
        .and_then(Value::as_i64)
        .ok_or(ParseError::MissingField(key))?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| ParseError::invalid(key, secs.to_string()))
}

impl IssueParser for ManiphestParser {
    fn parse(&self, raw: &RawIssue, ctx: &ParseContext) -> Result<ParsedIssue, ParseError> {
        let task = JsonDecoder.decode(raw.require(ISSUE_PART)?)?;
        let users = Users::from_part(raw.part(USERS_PART))?;
        let fields = task.get("fields").ok_or(ParseError::MissingField("fields"))?;

        let id = json_str(&task, "id").ok_or(ParseError::MissingField("id"))?;
        let author = json_str(fields, "authorPHID").ok_or(ParseError::MissingField("authorPHID"))?;
        let created = epoch(fields, "dateCreated")?;

        let kind = json_str(fields, "subtype").unwrap_or_else(|| "task".to_string());
        let mut issue = Issue::new(id, kind, users.get(&author), created);
        issue.summary = json_str(fields, "name").unwrap_or_default();
        issue.description = fields["description"]
            .get("raw")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        issue.status = scalar(fields.get("status").and_then(|s| s.get("value")))
            .ok_or(ParseError::MissingField("status"))?;
        issue.priority = scalar(fields.get("priority"));
        issue.assigned_to = json_str(fields, "ownerPHID").map(|p| users.get(&p));
        issue.updated_on = epoch(fields, "dateModified").ok();

        if let Some(subscribers) = task["attachments"]["subscribers"]["subscriberPHIDs"].as_array() {
            issue.watchers = subscribers
                .iter()
                .filter_map(Value::as_str)
                .map(|p| users.get(p))
                .collect();
        }

        let mut extension = IssueExtension::new(BACKEND);
        extension.set("phid", json_str(&task, "phid"));
        extension.set("points", json_str(fields, "points"));
        if let Some(projects) = task["attachments"]["projects"]["projectPHIDs"].as_array() {
            let joined = projects
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(",");
            extension.set("projects", Some(joined));
        }
        issue.extension = Some(extension);

        let history = match raw.part(TRANSACTIONS_PART) {
            Some(part) => JsonDecoder.decode(part)?,
            None => Value::Null,
        };
        // Conduit returns newest first.
        let mut entries: Vec<&Value> = json_array(&history, "data").iter().collect();
        entries.reverse();

        let mut transactions = Vec::new();
        for tx in entries {
            let actor = users.get(&json_str(tx, "authorPHID").unwrap_or_default());
            let timestamp = json_str(tx, "dateCreated").unwrap_or_default();
            let kind = json_str(tx, "type");

            for comment in json_array(tx, "comments").iter().take(1) {
                let text = comment["content"].get("raw").and_then(Value::as_str);
                let on = tx
                    .get("dateCreated")
                    .and_then(Value::as_i64)
                    .and_then(|s| DateTime::from_timestamp(s, 0));
                if let (Some(text), Some(on)) = (text, on) {
                    if !text.trim().is_empty() {
                        issue.comments.push(Comment {
                            text: text.to_string(),
                            submitted_by: actor.clone(),
                            submitted_on: on,
                        });
                    }
                }
            }

            let Some((_, field)) = FIELD_TRANSACTIONS
                .iter()
                .find(|(t, _)| kind.as_deref() == Some(*t))
            else {
                continue;
            };
            let mut old = scalar(tx["fields"].get("old"));
            let mut new = scalar(tx["fields"].get("new"));
            if *field == "assigned_to" {
                old = users.login(old);
                new = users.login(new);
            }
            transactions.push(Transaction {
                actor,
                timestamp,
                diffs: vec![FieldDiff::new(*field, old, new)],
                source_id: json_str(tx, "phid").or_else(|| json_str(tx, "id")),
            });
        }

        let mut log = ChangeLog::new();
        apply_transactions(transactions, &mut log);

        let closed_at = epoch(fields, "dateClosed").ok();
        let actor = fields
            .get("closerPHID")
            .and_then(Value::as_str)
            .map(|p| users.get(p))
            .or_else(|| issue.assigned_to.clone())
            .unwrap_or_else(|| issue.submitted_by.clone());
        let (changes, warnings) = log.finish(
            IssueOutcome {
                status: &issue.status,
                actor: &actor,
                closed_at,
                submitted_on: issue.submitted_on,
            },
            &ctx.terminal,
        );
        issue.changes = changes;

        Ok(ParsedIssue { issue, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::model::IssueSummary;

    const TASK: &str = r#"{
        "id": 5, "phid": "PHID-TASK-5",
        "fields": {
            "name": "Crash when saving",
            "description": {"raw": "Save crashes."},
            "authorPHID": "PHID-USER-a",
            "ownerPHID": "PHID-USER-b",
            "status": {"value": "resolved", "name": "Resolved"},
            "priority": {"value": 80, "name": "High"},
            "dateCreated": 1400000000,
            "dateModified": 1400090000,
            "dateClosed": 1400090000,
            "closerPHID": "PHID-USER-b"
        },
        "attachments": {
            "subscribers": {"subscriberPHIDs": ["PHID-USER-a", "PHID-USER-c"]},
            "projects": {"projectPHIDs": ["PHID-PROJ-1"]}
        }
    }"#;

    const TRANSACTIONS: &str = r#"{"data": [
        {"id": 3, "phid": "PHID-XACT-3", "type": "status", "authorPHID": "PHID-USER-b",
         "dateCreated": 1400090000, "comments": [], "fields": {"old": "open", "new": "resolved"}},
        {"id": 2, "phid": "PHID-XACT-2", "type": null, "authorPHID": "PHID-USER-b",
         "dateCreated": 1400050000, "comments": [{"content": {"raw": "On it."}}], "fields": {}},
        {"id": 1, "phid": "PHID-XACT-1", "type": "owner", "authorPHID": "PHID-USER-a",
         "dateCreated": 1400010000, "comments": [], "fields": {"old": null, "new": "PHID-USER-b"}}
    ]}"#;

    const USERS: &str = r#"{"data": [
        {"phid": "PHID-USER-a", "fields": {"username": "ann", "realName": "Ann Lee"}},
        {"phid": "PHID-USER-b", "fields": {"username": "bo", "realName": "Bo Chen"}}
    ]}"#;

    fn raw() -> RawIssue {
        RawIssue::new(IssueSummary::new("5", Utc::now()))
            .with_part(ISSUE_PART, TASK)
            .with_part(TRANSACTIONS_PART, TRANSACTIONS)
            .with_part(USERS_PART, USERS)
    }

    #[test]
    fn test_task_with_transactions() {
        let parsed = ManiphestParser.parse(&raw(), &ParseContext::default()).unwrap();
        let issue = parsed.issue;

        assert_eq!(issue.issue_id, "5");
        assert_eq!(issue.submitted_by.user_id, "ann");
        assert_eq!(issue.priority.as_deref(), Some("High"));
        assert_eq!(issue.assigned_to.as_ref().unwrap().user_id, "bo");
        assert_eq!(issue.comments.len(), 1);
        assert_eq!(issue.watchers[1].user_id, "PHID-USER-c");

        assert_eq!(issue.changes.len(), 2);
        assert_eq!(issue.changes[0].field, "assigned_to");
        assert_eq!(issue.changes[0].new_value.as_deref(), Some("bo"));
        assert_eq!(issue.changes[1].field, "status");
        assert_eq!(issue.changes[1].old_value.as_deref(), Some("open"));
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_missing_history_synthesizes_close() {
        let raw = RawIssue::new(IssueSummary::new("5", Utc::now())).with_part(ISSUE_PART, TASK);
        let parsed = ManiphestParser.parse(&raw, &ParseContext::default()).unwrap();
        let changes = parsed.issue.changes;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].new_value.as_deref(), Some("resolved"));
        assert_eq!(changes[0].changed_by.user_id, "PHID-USER-b");
        assert_eq!(changes[0].changed_on.timestamp(), 1_400_090_000);
    }
}
