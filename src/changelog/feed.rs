//! Activity feeds and transaction logs.
//!
//! Every entry already names its actor and timestamp, so reconstruction is
//! mostly a matter of splitting entries that report several field diffs.

use std::sync::LazyLock;

use regex::Regex;

use super::{ChangeLog, clean_value, normalize_field};
use crate::decode::{Element, fragment_text};
use crate::model::{Change, Identity};

const SOURCE: &str = "feed";

/// One field diff inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl FieldDiff {
    pub fn new(field: impl Into<String>, old_value: Option<String>, new_value: Option<String>) -> Self {
        Self {
            field: field.into(),
            old_value,
            new_value,
        }
    }
}

/// An actor-stamped entry carrying zero or more field diffs.
///
/// The timestamp stays raw so a bad value becomes a warning at
/// reconstruction time rather than a parse failure for the whole issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub actor: Identity,
    pub timestamp: String,
    pub diffs: Vec<FieldDiff>,
    /// Tracker-side id of the entry, used in warnings.
    pub source_id: Option<String>,
}

/// Emit one change per field diff, in entry order.
pub fn apply_transactions<I>(transactions: I, log: &mut ChangeLog)
where
    I: IntoIterator<Item = Transaction>,
{
    for (idx, tx) in transactions.into_iter().enumerate() {
        if tx.diffs.is_empty() {
            continue;
        }
        let entry = tx
            .source_id
            .clone()
            .unwrap_or_else(|| format!("entry {}", idx + 1));

        let Some(when) = log.timestamp(SOURCE, Some(entry), &tx.timestamp) else {
            continue;
        };

        for diff in tx.diffs {
            log.push(Change::new(
                normalize_field(&diff.field),
                diff.old_value,
                diff.new_value,
                tx.actor.clone(),
                when,
            ));
        }
    }
}

static DIFF_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:[-*]\s+)?\**(?P<field>[A-Za-z][\w .\-/]*?)\**\s*:\s*(?P<old>.*?)\s*(?:=>|-->|->)\s*(?P<new>.*?)\s*$",
    )
    .expect("diff line pattern is valid")
});

/// Split free text reporting several field diffs into one diff per field.
///
/// Accepts `field: old => new`, `field: old -> new` and the markdown
/// `- **field**: old --> new` form, one per line. HTML markup is flattened
/// to text first. Lines that are not diffs are ignored.
#[must_use]
pub fn split_diff_text(text: &str) -> Vec<FieldDiff> {
    let plain = fragment_text(text);
    plain
        .lines()
        .filter_map(|line| DIFF_LINE.captures(line))
        .map(|caps| {
            FieldDiff::new(
                caps["field"].trim(),
                clean_value(&caps["old"]),
                clean_value(&caps["new"]),
            )
        })
        .collect()
}

/// Whether every non-blank line of `text` is a field diff.
#[must_use]
pub fn is_only_diffs(text: &str) -> bool {
    let plain = fragment_text(text);
    let mut lines = plain.lines().filter(|l| !l.trim().is_empty()).peekable();
    lines.peek().is_some() && lines.all(|l| DIFF_LINE.is_match(l))
}

/// One entry of an Atom activity feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub author: Option<String>,
    pub updated: Option<String>,
    pub title: Option<String>,
    pub content: String,
}

impl FeedEntry {
    /// Turn the entry into a transaction, or `None` if it lacks an author
    /// or a timestamp.
    #[must_use]
    pub fn into_transaction(self) -> Option<Transaction> {
        let actor = Identity::new(self.author?);
        Some(Transaction {
            actor,
            timestamp: self.updated?,
            diffs: split_diff_text(&self.content),
            source_id: self.title,
        })
    }
}

/// Read the entries of a decoded Atom feed, in document order.
#[must_use]
pub fn entries_from_atom(feed: &Element) -> Vec<FeedEntry> {
    feed.children_named("entry")
        .map(|entry| FeedEntry {
            author: entry
                .child("author")
                .and_then(|a| a.child_text("name"))
                .or_else(|| entry.child_text("author")),
            updated: entry
                .child_text("updated")
                .or_else(|| entry.child_text("published")),
            title: entry.child_text("title"),
            content: entry
                .child("content")
                .or_else(|| entry.child("summary"))
                .map(Element::text)
                .unwrap_or_default(),
        })
        .collect()
}

/// Reconstruct changes from a decoded Atom feed.
pub fn apply_atom_feed(feed: &Element, log: &mut ChangeLog) {
    let mut transactions = Vec::new();
    for (idx, entry) in entries_from_atom(feed).into_iter().enumerate() {
        let label = entry
            .title
            .clone()
            .unwrap_or_else(|| format!("entry {}", idx + 1));
        match entry.into_transaction() {
            Some(tx) => transactions.push(tx),
            None => log.warn(SOURCE, Some(label), "feed entry has no author or timestamp"),
        }
    }
    apply_transactions(transactions, log);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{Decoder, XmlDecoder};

    #[test]
    fn test_split_plain_diffs() {
        let diffs = split_diff_text("status: open => closed\npriority: 5 -> 1\n");
        assert_eq!(
            diffs,
            vec![
                FieldDiff::new("status", Some("open".into()), Some("closed".into())),
                FieldDiff::new("priority", Some("5".into()), Some("1".into())),
            ]
        );
    }

    #[test]
    fn test_split_markdown_and_html() {
        let text = "<ul><li><strong>status</strong>: open --&gt; closed</li>\
                    <li><strong>assigned_to</strong>: (none) --&gt; alice</li></ul>";
        let diffs = split_diff_text(text);
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[1].field, "assigned_to");
        assert_eq!(diffs[1].old_value, None);
        assert_eq!(diffs[1].new_value.as_deref(), Some("alice"));

        let md = split_diff_text("- **Milestone**: 1.0 --> 2.0");
        assert_eq!(md[0].field, "Milestone");
        assert_eq!(md[0].new_value.as_deref(), Some("2.0"));
    }

    #[test]
    fn test_numeric_references_are_decoded() {
        let diffs = split_diff_text("<p>summary: Crash &#8220;on save&#8221; =&gt; Crash &#x26; burn</p>");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].old_value.as_deref(), Some("Crash \u{201c}on save\u{201d}"));
        assert_eq!(diffs[0].new_value.as_deref(), Some("Crash & burn"));
    }

    #[test]
    fn test_is_only_diffs() {
        assert!(is_only_diffs("- **status**: open --> closed\n"));
        assert!(!is_only_diffs("Fixed in trunk.\n- **status**: open --> closed"));
        assert!(!is_only_diffs("   "));
    }

    #[test]
    fn test_transactions_split_per_field() {
        let tx = Transaction {
            actor: Identity::new("PHID-USER-1"),
            timestamp: "1359712772".into(),
            diffs: split_diff_text("status: open=>resolved\npriority: normal=>high"),
            source_id: Some("PHID-XACT-1".into()),
        };
        let bad = Transaction {
            actor: Identity::new("PHID-USER-2"),
            timestamp: "garbage".into(),
            diffs: vec![FieldDiff::new("status", None, Some("open".into()))],
            source_id: None,
        };

        let mut log = ChangeLog::new();
        apply_transactions(vec![bad, tx], &mut log);

        assert_eq!(log.changes().len(), 2);
        assert_eq!(log.changes()[0].field, "status");
        assert_eq!(log.changes()[1].field, "priority");
        assert!(log.changes().iter().all(|c| c.changed_by.user_id == "PHID-USER-1"));
        assert_eq!(log.warnings().len(), 1);
        assert_eq!(log.warnings()[0].entry.as_deref(), Some("entry 1"));
    }

    #[test]
    fn test_atom_feed() {
        let xml = br#"<?xml version="1.0" encoding="utf-8"?>
            <feed xmlns="http://www.w3.org/2005/Atom">
              <title>tickets</title>
              <entry>
                <title>#7 Crash on start</title>
                <author><name>alice</name></author>
                <updated>2014-03-01T10:20:30Z</updated>
                <content type="html">&lt;ul&gt;&lt;li&gt;&lt;strong&gt;status&lt;/strong&gt;: open --&amp;gt; closed&lt;/li&gt;&lt;/ul&gt;</content>
              </entry>
              <entry>
                <title>#7 anonymous</title>
                <updated>2014-03-02T10:20:30Z</updated>
                <content>status: closed => open</content>
              </entry>
            </feed>"#;
        let feed = XmlDecoder.decode(xml).unwrap();

        let mut log = ChangeLog::new();
        apply_atom_feed(&feed, &mut log);

        assert_eq!(log.changes().len(), 1);
        let c = &log.changes()[0];
        assert_eq!(c.field, "status");
        assert_eq!(c.old_value.as_deref(), Some("open"));
        assert_eq!(c.new_value.as_deref(), Some("closed"));
        assert_eq!(c.changed_by.user_id, "alice");
        assert_eq!(log.warnings().len(), 1);
    }
}
