use chrono::DateTime;
use serde_json::Value;

use super::{BACKEND, ISSUE_PART};
use crate::backends::{json_array, json_str};
use crate::changelog::{
    Approval, ChangeLog, CommentPatterns, IssueOutcome, ReviewHistory, ReviewMessage, Revision,
    apply_review,
};
use crate::decode::{Decoder, JsonDecoder};
use crate::model::{Comment, Identity, Issue, IssueExtension};
use crate::sync::{IssueParser, ParseContext, ParseError, ParsedIssue, RawIssue};

#[derive(Debug, Clone, Copy, Default)]
pub struct GerritParser;

/// Gerrit account: prefer the username, then the email, then the full name.
fn account(value: &Value) -> Option<Identity> {
    let email = json_str(value, "email");
    let login = json_str(value, "username")
        .or_else(|| email.clone())
        .or_else(|| json_str(value, "name"))?;
    Some(
        Identity::new(login)
            .with_name(json_str(value, "name"))
            .with_email(email),
    )
}

fn unknown() -> Identity {
    Identity::new("unknown")
}

fn revision(patch_set: &Value) -> Option<Revision> {
    let number = json_str(patch_set, "number")?.parse().ok()?;
    let approvals = json_array(patch_set, "approvals")
        .iter()
        .filter_map(|a| {
            Some(Approval {
                kind: json_str(a, "type")?,
                value: json_str(a, "value")?,
                by: a.get("by").and_then(account).unwrap_or_else(unknown),
                granted_on: json_str(a, "grantedOn").unwrap_or_default(),
            })
        })
        .collect();
    Some(Revision {
        number,
        uploader: patch_set
            .get("uploader")
            .and_then(account)
            .unwrap_or_else(unknown),
        created_on: json_str(patch_set, "createdOn").unwrap_or_default(),
        approvals,
    })
}

impl IssueParser for GerritParser {
    fn parse(&self, raw: &RawIssue, ctx: &ParseContext) -> Result<ParsedIssue, ParseError> {
        let change = JsonDecoder.decode(raw.require(ISSUE_PART)?)?;

        let number = json_str(&change, "number").ok_or(ParseError::MissingField("number"))?;
        let owner = change
            .get("owner")
            .and_then(account)
            .ok_or(ParseError::MissingField("owner"))?;
        let created_raw = json_str(&change, "createdOn").ok_or(ParseError::MissingField("createdOn"))?;
        let created = epoch(&change, "createdOn")?;

        let mut issue = Issue::new(number, "changeset", owner.clone(), created);
        issue.summary = json_str(&change, "subject").unwrap_or_default();
        issue.description = json_str(&change, "commitMessage").unwrap_or_default();
        issue.status = json_str(&change, "status").ok_or(ParseError::MissingField("status"))?;
        issue.updated_on = epoch(&change, "lastUpdated").ok();
        issue.assigned_to = change.get("assignee").and_then(account);

        let messages: Vec<ReviewMessage> = json_array(&change, "comments")
            .iter()
            .filter_map(|c| {
                Some(ReviewMessage {
                    author: c.get("reviewer").and_then(account).unwrap_or_else(unknown),
                    timestamp: json_str(c, "timestamp")?,
                    text: c.get("message").and_then(Value::as_str)?.to_string(),
                })
            })
            .collect();

        issue.comments = messages
            .iter()
            .filter_map(|m| {
                let secs = m.timestamp.parse::<i64>().ok()?;
                let on = DateTime::from_timestamp(secs, 0)?;
                Some(Comment {
                    text: m.text.clone(),
                    submitted_by: m.author.clone(),
                    submitted_on: on,
                })
            })
            .collect();

        issue.watchers = json_array(&change, "allReviewers")
            .iter()
            .filter_map(account)
            .collect();

        let mut extension = IssueExtension::new(BACKEND);
        for key in ["project", "branch", "topic", "url"] {
            extension.set(key, json_str(&change, key));
        }
        extension.set("change_id", json_str(&change, "id"));
        issue.extension = Some(extension);

        let history = ReviewHistory {
            owner,
            created_on: created_raw,
            status: issue.status.clone(),
            revisions: json_array(&change, "patchSets").iter().filter_map(revision).collect(),
            messages,
        };
        let mut log = ChangeLog::new();
        apply_review(&history, &CommentPatterns::code_review(), &mut log);

        let actor = issue.assigned_to.as_ref().unwrap_or(&issue.submitted_by).clone();
        let (changes, warnings) = log.finish(
            IssueOutcome {
                status: &issue.status,
                actor: &actor,
                closed_at: None,
                submitted_on: issue.submitted_on,
            },
            &ctx.terminal,
        );
        issue.changes = changes;

        Ok(ParsedIssue { issue, warnings })
    }
}

fn epoch(value: &Value, key: &'static str) -> Result<chrono::DateTime<chrono::Utc>, ParseError> {
    let secs = value
        .get(key)
        .and_then(Value::as_i64)
        .ok_or(ParseError::MissingField(key))?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| ParseError::invalid(key, secs.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::changelog::review::UPLOADED_FIELD;
    use crate::model::IssueSummary;

    const OWNER: &str = r#"{"name":"Ann Lee","email":"ann@example.org","username":"ann"}"#;

    fn change(status: &str, approvals: &str, comments: &str) -> String {
        format!(
            r#"{{"project":"core","branch":"master","topic":"login","id":"I0a1b","number":"42",
                "subject":"Fix login","owner":{OWNER},"url":"https://review.example.org/42",
                "createdOn":1359712000,"lastUpdated":1359716000,"status":"{status}",
                "comments":{comments},
                "patchSets":[
                  {{"number":"1","uploader":{OWNER},"createdOn":1359712000}},
                  {{"number":"2","uploader":{OWNER},"createdOn":1359713000,"approvals":{approvals}}}
                ]}}"#
        )
    }

    fn parse(json: &str) -> ParsedIssue {
        let raw = RawIssue::new(IssueSummary::new("42", Utc::now())).with_part(ISSUE_PART, json.to_string());
        GerritParser.parse(&raw, &ParseContext::default()).unwrap()
    }

    fn status_path(issue: &Issue) -> Vec<&str> {
        issue
            .changes
            .iter()
            .filter(|c| c.field == "status")
            .filter_map(|c| c.new_value.as_deref())
            .collect()
    }

    #[test]
    fn test_merged_change_lifecycle() {
        let parsed = parse(&change(
            "MERGED",
            r#"[{"type":"Code-Review","value":"2","grantedOn":1359714000,"by":{"username":"rev"}},
                {"type":"SUBM","value":"1","grantedOn":1359715000,"by":{"username":"rev"}}]"#,
            "[]",
        ));
        let issue = parsed.issue;

        assert_eq!(issue.issue_type, "changeset");
        assert_eq!(status_path(&issue), vec!["NEW", "MERGED"]);
        let uploads = issue.changes.iter().filter(|c| c.field == UPLOADED_FIELD).count();
        assert_eq!(uploads, 2);
        assert!(issue.changes.windows(2).all(|w| w[0].changed_on <= w[1].changed_on));

        let ext = issue.extension.unwrap();
        assert_eq!(ext.fields["branch"], "master");
        assert_eq!(ext.fields["change_id"], "I0a1b");
    }

    #[test]
    fn test_abandon_message_infers_status() {
        let parsed = parse(&change(
            "ABANDONED",
            "[]",
            r#"[{"timestamp":1359715500,"reviewer":{"username":"ann"},"message":"Abandoned\n\nSuperseded."}]"#,
        ));
        assert_eq!(status_path(&parsed.issue), vec!["NEW", "ABANDONED"]);
        assert_eq!(parsed.issue.comments.len(), 1);
    }

    #[test]
    fn test_missing_owner_is_error() {
        let raw = RawIssue::new(IssueSummary::new("42", Utc::now()))
            .with_part(ISSUE_PART, r#"{"number":"42","createdOn":1,"status":"NEW"}"#);
        assert!(matches!(
            GerritParser.parse(&raw, &ParseContext::default()),
            Err(ParseError::MissingField("owner"))
        ));
    }
}
