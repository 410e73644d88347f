use serde_json::Value;

use super::{BACKEND, FEED_PART, ISSUE_PART};
use crate::backends::{json_array, json_str, optional_time, require_str, require_time};
use crate::changelog::feed::is_only_diffs;
use crate::changelog::{
    ChangeLog, IssueOutcome, Transaction, apply_atom_feed, apply_transactions, split_diff_text,
};
use crate::decode::{Decoder, JsonDecoder, XmlDecoder};
use crate::model::{Attachment, Comment, Identity, Issue, IssueExtension};
use crate::sync::{IssueParser, ParseContext, ParseError, ParsedIssue, RawIssue};

/// Allura renders an unassigned ticket with this placeholder user.
const NOBODY: &str = "*anonymous";

#[derive(Debug, Clone, Copy, Default)]
pub struct AlluraParser;

fn user(value: &Value, key: &str) -> Option<Identity> {
    json_str(value, key)
        .filter(|u| u != NOBODY)
        .map(Identity::new)
}

impl IssueParser for AlluraParser {
    fn parse(&self, raw: &RawIssue, ctx: &ParseContext) -> Result<ParsedIssue, ParseError> {
        let doc = JsonDecoder.decode(raw.require(ISSUE_PART)?)?;
        let ticket = doc.get("ticket").ok_or(ParseError::MissingField("ticket"))?;

        let id = require_str(ticket, "ticket_num")?;
        let reporter = user(ticket, "reported_by").unwrap_or_else(|| Identity::new(NOBODY));
        let created = require_time(ticket, "created_date")?;

        let mut issue = Issue::new(id, "ticket", reporter, created);
        issue.summary = json_str(ticket, "summary").unwrap_or_default();
        issue.description = ticket
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        issue.status = require_str(ticket, "status")?;
        issue.assigned_to = user(ticket, "assigned_to");
        issue.updated_on = optional_time(ticket, "mod_date");

        issue.attachments = json_array(ticket, "attachments")
            .iter()
            .filter_map(|att| {
                let url = json_str(att, "url")?;
                let name = url.rsplit('/').next().unwrap_or(&url).to_string();
                Some(Attachment {
                    name,
                    url,
                    description: None,
                    submitted_by: None,
                    submitted_on: None,
                })
            })
            .collect();

        let posts = json_array(&ticket["discussion_thread"], "posts");
        let mut post_transactions = Vec::new();
        for post in posts {
            let Some(author) = user(post, "author") else {
                continue;
            };
            let text = post.get("text").and_then(Value::as_str).unwrap_or_default();
            let timestamp = json_str(post, "timestamp").unwrap_or_default();

            if !is_only_diffs(text) && !text.trim().is_empty() {
                if let Some(on) = optional_time(post, "timestamp") {
                    issue.comments.push(Comment {
                        text: text.to_string(),
                        submitted_by: author.clone(),
                        submitted_on: on,
                    });
                }
            }
            post_transactions.push(Transaction {
                actor: author,
                timestamp,
                diffs: split_diff_text(text),
                source_id: json_str(post, "slug").or_else(|| json_str(post, "subject")),
            });
        }

        let mut extension = IssueExtension::new(BACKEND);
        let labels: Vec<&str> = json_array(ticket, "labels")
            .iter()
            .filter_map(Value::as_str)
            .collect();
        if !labels.is_empty() {
            extension.set("labels", Some(labels.join(",")));
        }
        if let Some(custom) = ticket.get("custom_fields").and_then(Value::as_object) {
            for key in custom.keys() {
                extension.set(key.trim_start_matches('_'), json_str(&ticket["custom_fields"], key));
            }
        }
        extension.set("private", json_str(ticket, "private"));
        issue.extension = Some(extension);

        let mut log = ChangeLog::new();
        match raw.part(FEED_PART) {
            Some(feed) => apply_atom_feed(&XmlDecoder.decode(feed)?, &mut log),
            None => apply_transactions(post_transactions, &mut log),
        }

        // Allura closed states share a "closed" prefix (closed-fixed, closed-wont-fix, ...).
        let terminal = if issue.status.to_lowercase().starts_with("closed") {
            ctx.terminal.with([issue.status.as_str()])
        } else {
            ctx.terminal.clone()
        };
        let actor = issue.assigned_to.as_ref().unwrap_or(&issue.submitted_by).clone();
        let (changes, warnings) = log.finish(
            IssueOutcome {
                status: &issue.status,
                actor: &actor,
                closed_at: None,
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

    const TICKET: &str = r#"{"ticket": {
        "ticket_num": 7,
        "summary": "Crash on start",
        "description": "It crashes.",
        "created_date": "2014-03-01 09:00:00.000000",
        "mod_date": "2014-03-02 10:00:00.000000",
        "reported_by": "ann",
        "assigned_to": "*anonymous",
        "status": "closed-fixed",
        "labels": ["ui", "startup"],
        "custom_fields": {"_milestone": "1.2"},
        "private": false,
        "attachments": [{"url": "https://forge.example.org/p/widget/tickets/7/attachment/trace.txt", "bytes": 120}],
        "discussion_thread": {"posts": [
            {"slug": "a1", "author": "bo", "timestamp": "2014-03-01 10:00:00.000000",
             "text": "- **status**: open --> pending\n"},
            {"slug": "b2", "author": "bo", "timestamp": "2014-03-02 10:00:00.000000",
             "text": "Fixed in r12.\n\n- **status**: pending --> closed-fixed\n"}
        ]}
    }}"#;

    const FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
        <feed xmlns="http://www.w3.org/2005/Atom">
          <entry>
            <title>#7 Crash on start</title>
            <author><name>cy</name></author>
            <updated>2014-03-02T10:00:00Z</updated>
            <content>status: open => closed-fixed</content>
          </entry>
        </feed>"#;

    fn summary() -> IssueSummary {
        IssueSummary::new("7", Utc::now())
    }

    #[test]
    fn test_posts_provide_changes_without_feed() {
        let raw = RawIssue::new(summary()).with_part(ISSUE_PART, TICKET);
        let parsed = AlluraParser.parse(&raw, &ParseContext::default()).unwrap();
        let issue = parsed.issue;

        assert!(issue.assigned_to.is_none());
        assert_eq!(issue.comments.len(), 1);
        assert_eq!(issue.attachments[0].name, "trace.txt");
        assert_eq!(issue.changes.len(), 2);
        assert_eq!(issue.changes[1].new_value.as_deref(), Some("closed-fixed"));

        let ext = issue.extension.unwrap();
        assert_eq!(ext.fields["labels"], "ui,startup");
        assert_eq!(ext.fields["milestone"], "1.2");
    }

    #[test]
    fn test_feed_wins_over_posts() {
        let raw = RawIssue::new(summary())
            .with_part(ISSUE_PART, TICKET)
            .with_part(FEED_PART, FEED);
        let parsed = AlluraParser.parse(&raw, &ParseContext::default()).unwrap();
        let changes = parsed.issue.changes;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].changed_by.user_id, "cy");
    }

    #[test]
    fn test_closed_variant_gets_closing_change() {
        let ticket = TICKET.replace("\"posts\": [", "\"posts\": [], \"unused\": [");
        let raw = RawIssue::new(summary()).with_part(ISSUE_PART, ticket);
        let parsed = AlluraParser.parse(&raw, &ParseContext::default()).unwrap();
        let last = parsed.issue.changes.last().unwrap();
        assert_eq!(last.new_value.as_deref(), Some("closed-fixed"));
        assert_eq!(last.changed_by.user_id, "ann");
    }
}
