use std::collections::HashMap;

use serde_json::Value;

use super::{BACKEND, ISSUE_PART, PRIORITIES_PART, STATUSES_PART};
use crate::backends::{json_array, json_str, named_user, optional_time, require_str, require_time};
use crate::changelog::{ChangeLog, FieldDiff, IssueOutcome, Transaction, apply_transactions};
use crate::decode::{Decoder, JsonDecoder};
use crate::model::{Attachment, Comment, Identity, Issue, IssueExtension};
use crate::sync::{IssueParser, ParseContext, ParseError, ParsedIssue, RawIssue};

#[derive(Debug, Clone, Copy, Default)]
pub struct RedmineParser;

/// Id → name table from a Redmine enumeration document.
#[derive(Debug, Default)]
struct Lookup {
    names: HashMap<String, String>,
    closed: Vec<String>,
}

impl Lookup {
    fn from_part(raw: Option<&[u8]>, key: &str) -> Result<Self, ParseError> {
        let Some(raw) = raw else {
            return Ok(Self::default());
        };
        let doc = JsonDecoder.decode(raw)?;
        let mut lookup = Self::default();
        for entry in json_array(&doc, key) {
            let (Some(id), Some(name)) = (json_str(entry, "id"), json_str(entry, "name")) else {
                continue;
            };
            if entry.get("is_closed").and_then(Value::as_bool) == Some(true) {
                lookup.closed.push(name.clone());
            }
            lookup.names.insert(id, name);
        }
        Ok(lookup)
    }

    fn translate(&self, value: Option<String>) -> Option<String> {
        value.map(|v| self.names.get(&v).cloned().unwrap_or(v))
    }
}

/// Field name for one journal detail.
fn detail_field(detail: &Value) -> Option<String> {
    let name = json_str(detail, "name")?;
    match json_str(detail, "property").as_deref() {
        Some("attr") | None => Some(name),
        Some("cf") => Some(format!("cf_{name}")),
        Some("attachment") => Some("attachment".to_string()),
        Some("relation") => Some(format!("relation_{name}")),
        Some(other) => Some(format!("{other}_{name}")),
    }
}

impl IssueParser for RedmineParser {
    fn parse(&self, raw: &RawIssue, ctx: &ParseContext) -> Result<ParsedIssue, ParseError> {
        let doc = JsonDecoder.decode(raw.require(ISSUE_PART)?)?;
        let data = doc.get("issue").ok_or(ParseError::MissingField("issue"))?;
        let statuses = Lookup::from_part(raw.part(STATUSES_PART), "issue_statuses")?;
        let priorities = Lookup::from_part(raw.part(PRIORITIES_PART), "issue_priorities")?;

        let id = require_str(data, "id")?;
        let author = data
            .get("author")
            .and_then(named_user)
            .ok_or(ParseError::MissingField("author"))?;
        let created = require_time(data, "created_on")?;
        let kind = data
            .get("tracker")
            .and_then(|t| json_str(t, "name"))
            .unwrap_or_else(|| "issue".to_string());

        let mut issue = Issue::new(id, kind, author, created);
        issue.summary = json_str(data, "subject").unwrap_or_default();
        issue.description = data
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        issue.status = data
            .get("status")
            .and_then(|s| json_str(s, "name"))
            .ok_or(ParseError::MissingField("status"))?;
        issue.priority = data.get("priority").and_then(|p| json_str(p, "name"));
        issue.assigned_to = data.get("assigned_to").and_then(named_user);
        issue.updated_on = optional_time(data, "updated_on");

        let mut transactions = Vec::new();
        for journal in json_array(data, "journals") {
            let Some(user) = journal.get("user").and_then(named_user) else {
                continue;
            };
            let timestamp = json_str(journal, "created_on").unwrap_or_default();

            if let Some(notes) = json_str(journal, "notes") {
                if let Some(on) = optional_time(journal, "created_on") {
                    issue.comments.push(Comment {
                        text: notes,
                        submitted_by: user.clone(),
                        submitted_on: on,
                    });
                }
            }

            let diffs = json_array(journal, "details")
                .iter()
                .filter_map(|detail| {
                    let field = detail_field(detail)?;
                    let mut old = json_str(detail, "old_value");
                    let mut new = json_str(detail, "new_value");
                    match field.as_str() {
                        "status_id" => {
                            old = statuses.translate(old);
                            new = statuses.translate(new);
                        }
                        "priority_id" => {
                            old = priorities.translate(old);
                            new = priorities.translate(new);
                        }
                        _ => {}
                    }
                    Some(FieldDiff::new(field, old, new))
                })
                .collect();

            transactions.push(Transaction {
                actor: user,
                timestamp,
                diffs,
                source_id: json_str(journal, "id").map(|id| format!("journal {id}")),
            });
        }

        issue.attachments = json_array(data, "attachments")
            .iter()
            .filter_map(|att| {
                Some(Attachment {
                    name: json_str(att, "filename")?,
                    url: json_str(att, "content_url").unwrap_or_default(),
                    description: json_str(att, "description"),
                    submitted_by: att.get("author").and_then(named_user),
                    submitted_on: optional_time(att, "created_on"),
                })
            })
            .collect();

        issue.watchers = json_array(data, "watchers")
            .iter()
            .filter_map(named_user)
            .collect::<Vec<Identity>>();

        let mut extension = IssueExtension::new(BACKEND);
        for key in ["project", "category", "fixed_version"] {
            extension.set(key, data.get(key).and_then(|v| json_str(v, "name")));
        }
        for key in ["start_date", "due_date", "done_ratio", "estimated_hours"] {
            extension.set(key, json_str(data, key));
        }
        for field in json_array(data, "custom_fields") {
            if let Some(name) = json_str(field, "name") {
                extension.set(&format!("cf_{name}"), json_str(field, "value"));
            }
        }
        issue.extension = Some(extension);

        let mut log = ChangeLog::new();
        apply_transactions(transactions, &mut log);

        let terminal = ctx.terminal.with(&statuses.closed);
        let closed_at = optional_time(data, "closed_on");
        let actor = issue.assigned_to.as_ref().unwrap_or(&issue.submitted_by).clone();
        let (changes, warnings) = log.finish(
            IssueOutcome {
                status: &issue.status,
                actor: &actor,
                closed_at,
                submitted_on: issue.submitted_on,
            },
            &terminal,
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

    const ISSUE: &str = r#"{"issue": {
        "id": 3,
        "project": {"id": 1, "name": "Core"},
        "tracker": {"id": 1, "name": "Bug"},
        "status": {"id": 5, "name": "Finished"},
        "priority": {"id": 4, "name": "Urgent"},
        "author": {"id": 7, "name": "Ann Lee"},
        "assigned_to": {"id": 8, "name": "Bo"},
        "subject": "Login fails",
        "description": "Steps...",
        "done_ratio": 100,
        "created_on": "2014-01-01T08:00:00Z",
        "updated_on": "2014-02-01T10:00:00Z",
        "custom_fields": [{"id": 2, "name": "Browser", "value": "Firefox"}],
        "journals": [
            {"id": 11, "user": {"id": 8, "name": "Bo"}, "notes": "Looking into it",
             "created_on": "2014-01-02T09:00:00Z",
             "details": [{"property": "attr", "name": "status_id", "old_value": "1", "new_value": "2"},
                         {"property": "attr", "name": "priority_id", "old_value": "2", "new_value": "4"}]},
            {"id": 12, "user": {"id": 8, "name": "Bo"}, "notes": "",
             "created_on": "not a date",
             "details": [{"property": "attr", "name": "done_ratio", "old_value": "0", "new_value": "100"}]}
        ],
        "attachments": [{"id": 1, "filename": "log.txt", "content_url": "https://redmine.example.org/attachments/download/1/log.txt",
                         "description": "", "author": {"id": 7, "name": "Ann Lee"}, "created_on": "2014-01-01T08:05:00Z"}],
        "watchers": [{"id": 9, "name": "Cy"}]
    }}"#;

    const STATUSES: &str = r#"{"issue_statuses": [
        {"id": 1, "name": "New", "is_closed": false},
        {"id": 2, "name": "In Progress", "is_closed": false},
        {"id": 5, "name": "Finished", "is_closed": true}]}"#;

    const PRIORITIES: &str = r#"{"issue_priorities": [{"id": 2, "name": "Normal"}, {"id": 4, "name": "Urgent"}]}"#;

    fn raw() -> RawIssue {
        RawIssue::new(IssueSummary::new("3", Utc::now()))
            .with_part(ISSUE_PART, ISSUE)
            .with_part(STATUSES_PART, STATUSES)
            .with_part(PRIORITIES_PART, PRIORITIES)
    }

    #[test]
    fn test_journals_become_changes_with_names() {
        let parsed = RedmineParser.parse(&raw(), &ParseContext::default()).unwrap();
        let issue = parsed.issue;

        assert_eq!(issue.issue_type, "Bug");
        assert_eq!(issue.submitted_by.user_id, "7");
        assert_eq!(issue.submitted_by.name.as_deref(), Some("Ann Lee"));
        assert_eq!(issue.comments.len(), 1);
        assert_eq!(issue.watchers.len(), 1);
        assert_eq!(issue.attachments[0].name, "log.txt");

        let status = &issue.changes[0];
        assert_eq!(status.field, "status");
        assert_eq!(status.old_value.as_deref(), Some("New"));
        assert_eq!(status.new_value.as_deref(), Some("In Progress"));
        assert_eq!(issue.changes[1].field, "priority");
        assert_eq!(issue.changes[1].new_value.as_deref(), Some("Urgent"));

        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].entry.as_deref(), Some("journal 12"));

        let ext = issue.extension.unwrap();
        assert_eq!(ext.fields["project"], "Core");
        assert_eq!(ext.fields["cf_Browser"], "Firefox");
    }

    #[test]
    fn test_closed_status_from_tracker_is_terminal() {
        let parsed = RedmineParser.parse(&raw(), &ParseContext::default()).unwrap();
        let last = parsed.issue.changes.last().unwrap();
        assert_eq!(last.field, "status");
        assert_eq!(last.old_value.as_deref(), Some("In Progress"));
        assert_eq!(last.new_value.as_deref(), Some("Finished"));
        assert_eq!(last.changed_by.user_id, "8");
    }

    #[test]
    fn test_missing_issue_object() {
        let raw = RawIssue::new(IssueSummary::new("3", Utc::now())).with_part(ISSUE_PART, "{}");
        assert!(matches!(
            RedmineParser.parse(&raw, &ParseContext::default()),
            Err(ParseError::MissingField("issue"))
        ));
    }
}
