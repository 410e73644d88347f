use url::Url;

use super::{ACTIVITY_PART, BACKEND, ISSUE_PART};
use crate::changelog::{ChangeLog, IssueOutcome, apply_activity_page};
use crate::decode::{Decoder, Element, HtmlDecoder, XmlDecoder};
use crate::model::{Attachment, Comment, Identity, Issue, IssueExtension, parse_timestamp};
use crate::sync::{IssueParser, ParseContext, ParseError, ParsedIssue, RawIssue};

/// Extension fields copied verbatim from the bug export.
const EXTENSION_FIELDS: &[(&str, &str)] = &[
    ("product", "product"),
    ("component", "component"),
    ("version", "version"),
    ("bug_severity", "severity"),
    ("rep_platform", "platform"),
    ("op_sys", "op_sys"),
    ("keywords", "keywords"),
    ("target_milestone", "target_milestone"),
    ("bug_file_loc", "url"),
    ("status_whiteboard", "whiteboard"),
];

pub struct BugzillaParser {
    base: Url,
}

impl BugzillaParser {
    #[must_use]
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    fn attachment_url(&self, id: &str) -> String {
        self.base
            .join(&format!("attachment.cgi?id={id}"))
            .map_or_else(|_| format!("attachment.cgi?id={id}"), String::from)
    }
}

/// A user element: login as text, display name in the `name` attribute.
fn user(el: &Element) -> Option<Identity> {
    let login = el.text_trimmed();
    if login.is_empty() {
        return None;
    }
    let email = login.contains('@').then(|| login.clone());
    Some(Identity::new(login).with_name(el.attr("name")).with_email(email))
}

fn required<'a>(bug: &'a Element, name: &'static str) -> Result<&'a Element, ParseError> {
    bug.child(name).ok_or(ParseError::MissingField(name))
}

fn required_time(bug: &Element, name: &'static str) -> Result<chrono::DateTime<chrono::Utc>, ParseError> {
    let raw = bug.child_text(name).ok_or(ParseError::MissingField(name))?;
    parse_timestamp(&raw).map_err(|e| ParseError::invalid(name, e.to_string()))
}

impl IssueParser for BugzillaParser {
    fn parse(&self, raw: &RawIssue, ctx: &ParseContext) -> Result<ParsedIssue, ParseError> {
        let root = XmlDecoder.decode(raw.require(ISSUE_PART)?)?;
        let bug = root.child("bug").ok_or(ParseError::MissingField("bug"))?;
        if let Some(error) = bug.attr("error") {
            return Err(ParseError::invalid("bug", error.to_string()));
        }

        let id = bug.child_text("bug_id").ok_or(ParseError::MissingField("bug_id"))?;
        let reporter = user(required(bug, "reporter")?).ok_or(ParseError::MissingField("reporter"))?;
        let created = required_time(bug, "creation_ts")?;

        let mut issue = Issue::new(id, "bug", reporter, created);
        issue.summary = bug.child_text("short_desc").unwrap_or_default();
        issue.status = bug.child_text("bug_status").ok_or(ParseError::MissingField("bug_status"))?;
        issue.resolution = bug.child_text("resolution");
        issue.priority = bug.child_text("priority");
        issue.assigned_to = bug.child("assigned_to").and_then(user);
        issue.updated_on = bug
            .child_text("delta_ts")
            .and_then(|raw| parse_timestamp(&raw).ok());

        let mut texts = bug.children_named("long_desc").filter_map(|desc| {
            let who = desc.child("who").and_then(user)?;
            let when = parse_timestamp(&desc.child_text("bug_when")?).ok()?;
            Some(Comment {
                text: desc.child("thetext").map(Element::text).unwrap_or_default(),
                submitted_by: who,
                submitted_on: when,
            })
        });
        if let Some(first) = texts.next() {
            issue.description = first.text;
        }
        issue.comments = texts.collect();

        issue.attachments = bug
            .children_named("attachment")
            .filter_map(|att| {
                let attach_id = att.child_text("attachid")?;
                Some(Attachment {
                    name: att.child_text("filename").unwrap_or_else(|| attach_id.clone()),
                    url: self.attachment_url(&attach_id),
                    description: att.child_text("desc"),
                    submitted_by: att.child("attacher").and_then(user),
                    submitted_on: att
                        .child_text("date")
                        .and_then(|raw| parse_timestamp(&raw).ok()),
                })
            })
            .collect();

        issue.watchers = bug.children_named("cc").filter_map(user).collect();

        let mut extension = IssueExtension::new(BACKEND);
        for (source, key) in EXTENSION_FIELDS {
            extension.set(key, bug.child_text(source));
        }
        issue.extension = Some(extension);

        let mut log = ChangeLog::new();
        if let Some(activity) = raw.part(ACTIVITY_PART) {
            let page = HtmlDecoder.decode(activity)?;
            apply_activity_page(&page, &mut log);
        }
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
