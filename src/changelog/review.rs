//! Code-review histories.
//!
//! A review carries patch-set revisions, approval votes and free-text
//! messages. Beyond the votes themselves, the engine synthesizes the
//! lifecycle the source never states as data: a `NEW` status at creation,
//! an `UPLOADED` change per revision, `MERGED` from a submit approval, and
//! whatever the configured [`LifecycleHeuristic`] infers from messages.

use chrono::{DateTime, Utc};

use super::{ChangeLog, LifecycleHeuristic, STATUS_FIELD};
use crate::model::{Change, Identity};

const SOURCE: &str = "review";

/// Field name of the per-revision upload change.
pub const UPLOADED_FIELD: &str = "UPLOADED";

const SUBMIT_APPROVALS: &[&str] = &["SUBM", "Submitted"];
const CODE_REVIEW_APPROVALS: &[&str] = &["Code-Review", "CRVW"];

/// A vote on a revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approval {
    /// Vote category (`Code-Review`, `Verified`, `SUBM`, ...).
    pub kind: String,
    pub value: String,
    pub by: Identity,
    pub granted_on: String,
}

/// One uploaded patch set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub number: u32,
    pub uploader: Identity,
    pub created_on: String,
    pub approvals: Vec<Approval>,
}

/// A review message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewMessage {
    pub author: Identity,
    pub timestamp: String,
    pub text: String,
}

/// Everything the engine needs to rebuild a review's change log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewHistory {
    pub owner: Identity,
    pub created_on: String,
    /// Status reported by the tracker at fetch time.
    pub status: String,
    pub revisions: Vec<Revision>,
    pub messages: Vec<ReviewMessage>,
}

struct StatusEvent {
    status: String,
    by: Identity,
    on: DateTime<Utc>,
}

/// Reconstruct the change log of a review.
///
/// Status changes are chained: each one's `old_value` is the previous
/// status in time order, and consecutive repeats of a status collapse.
pub fn apply_review(history: &ReviewHistory, heuristic: &dyn LifecycleHeuristic, log: &mut ChangeLog) {
    let mut statuses = Vec::new();

    if let Some(created) = log.timestamp(SOURCE, Some("creation".into()), &history.created_on) {
        statuses.push(StatusEvent {
            status: "NEW".to_string(),
            by: history.owner.clone(),
            on: created,
        });
    }

    let mut submitted = false;
    let mut best_code_review: Option<(DateTime<Utc>, &Identity)> = None;

    for rev in &history.revisions {
        let entry = format!("patch set {}", rev.number);
        if let Some(on) = log.timestamp(SOURCE, Some(entry.clone()), &rev.created_on) {
            log.push(Change::new(
                UPLOADED_FIELD,
                None,
                Some(rev.number.to_string()),
                rev.uploader.clone(),
                on,
            ));
        }

        for approval in &rev.approvals {
            let label = format!("{entry} {}", approval.kind);
            let Some(on) = log.timestamp(SOURCE, Some(label), &approval.granted_on) else {
                continue;
            };
            log.push(Change::new(
                approval.kind.as_str(),
                None,
                Some(approval.value.clone()),
                approval.by.clone(),
                on,
            ));

            if SUBMIT_APPROVALS.contains(&approval.kind.as_str()) {
                submitted = true;
                statuses.push(StatusEvent {
                    status: "MERGED".to_string(),
                    by: approval.by.clone(),
                    on,
                });
            } else if CODE_REVIEW_APPROVALS.contains(&approval.kind.as_str())
                && is_top_vote(&approval.value)
                && best_code_review.is_none_or(|(best, _)| on >= best)
            {
                best_code_review = Some((on, &approval.by));
            }
        }
    }

    for (idx, message) in history.messages.iter().enumerate() {
        let Some(status) = heuristic.status_for(&message.text) else {
            continue;
        };
        let entry = format!("message {}", idx + 1);
        if let Some(on) = log.timestamp(SOURCE, Some(entry), &message.timestamp) {
            submitted |= status.eq_ignore_ascii_case("MERGED");
            statuses.push(StatusEvent {
                status,
                by: message.author.clone(),
                on,
            });
        }
    }

    if !submitted && history.status.eq_ignore_ascii_case("MERGED") {
        match best_code_review {
            Some((on, by)) => statuses.push(StatusEvent {
                status: "MERGED".to_string(),
                by: by.clone(),
                on,
            }),
            None => log.warn(
                SOURCE,
                None,
                "merged review has neither a submit nor a +2 code-review approval",
            ),
        }
    }

    chain_statuses(statuses, log);
}

fn is_top_vote(value: &str) -> bool {
    matches!(value.trim(), "2" | "+2")
}

fn chain_statuses(mut events: Vec<StatusEvent>, log: &mut ChangeLog) {
    events.sort_by_key(|e| e.on);

    let mut previous: Option<String> = None;
    for event in events {
        if previous
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case(&event.status))
        {
            continue;
        }
        log.push(Change::new(
            STATUS_FIELD,
            previous.replace(event.status.clone()),
            Some(event.status),
            event.by,
            event.on,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelog::{CommentPatterns, IssueOutcome, NoInference, TerminalStatuses};

    fn approval(kind: &str, value: &str, by: &str, at: &str) -> Approval {
        Approval {
            kind: kind.into(),
            value: value.into(),
            by: Identity::new(by),
            granted_on: at.into(),
        }
    }

    fn history(status: &str, approvals: Vec<Approval>, messages: Vec<ReviewMessage>) -> ReviewHistory {
        ReviewHistory {
            owner: Identity::new("owner"),
            created_on: "1359712000".into(),
            status: status.into(),
            revisions: vec![
                Revision {
                    number: 1,
                    uploader: Identity::new("owner"),
                    created_on: "1359712000".into(),
                    approvals: Vec::new(),
                },
                Revision {
                    number: 2,
                    uploader: Identity::new("owner"),
                    created_on: "1359713000".into(),
                    approvals,
                },
            ],
            messages,
        }
    }

    fn statuses(log: &ChangeLog) -> Vec<(Option<&str>, Option<&str>, &str)> {
        log.changes()
            .iter()
            .filter(|c| c.field == STATUS_FIELD)
            .map(|c| {
                (
                    c.old_value.as_deref(),
                    c.new_value.as_deref(),
                    c.changed_by.user_id.as_str(),
                )
            })
            .collect()
    }

    #[test]
    fn test_submit_approval_merges() {
        let h = history(
            "MERGED",
            vec![
                approval("Code-Review", "2", "reviewer", "1359714000"),
                approval("SUBM", "1", "gerrit", "1359715000"),
            ],
            Vec::new(),
        );
        let mut log = ChangeLog::new();
        apply_review(&h, &NoInference, &mut log);

        assert_eq!(
            statuses(&log),
            vec![(None, Some("NEW"), "owner"), (Some("NEW"), Some("MERGED"), "gerrit")]
        );
        let uploads = log.changes().iter().filter(|c| c.field == UPLOADED_FIELD).count();
        assert_eq!(uploads, 2);
        assert!(log.changes().iter().any(|c| c.field == "Code-Review"));
    }

    #[test]
    fn test_merged_without_submit_uses_latest_top_vote() {
        let h = history(
            "MERGED",
            vec![
                approval("Code-Review", "2", "early", "1359714000"),
                approval("Code-Review", "1", "other", "1359714500"),
                approval("Code-Review", "+2", "late", "1359715000"),
            ],
            Vec::new(),
        );
        let mut log = ChangeLog::new();
        apply_review(&h, &NoInference, &mut log);

        let s = statuses(&log);
        assert_eq!(s.last(), Some(&(Some("NEW"), Some("MERGED"), "late")));
    }

    #[test]
    fn test_abandon_restore_from_messages() {
        let messages = vec![
            ReviewMessage {
                author: Identity::new("owner"),
                timestamp: "1359716000".into(),
                text: "Patch Set 2: Abandoned".into(),
            },
            ReviewMessage {
                author: Identity::new("owner"),
                timestamp: "1359717000".into(),
                text: "Patch Set 2: Restored".into(),
            },
            ReviewMessage {
                author: Identity::new("owner"),
                timestamp: "1359718000".into(),
                text: "Patch Set 2: Abandoned".into(),
            },
        ];
        let h = history("ABANDONED", Vec::new(), messages);
        let mut log = ChangeLog::new();
        apply_review(&h, &CommentPatterns::code_review(), &mut log);

        let values: Vec<_> = statuses(&log).into_iter().map(|(o, n, _)| (o, n)).collect();
        assert_eq!(
            values,
            vec![
                (None, Some("NEW")),
                (Some("NEW"), Some("ABANDONED")),
                (Some("ABANDONED"), Some("NEW")),
                (Some("NEW"), Some("ABANDONED")),
            ]
        );
    }

    #[test]
    fn test_terminal_status_holds_after_finish() {
        let h = history("MERGED", Vec::new(), Vec::new());
        let mut log = ChangeLog::new();
        apply_review(&h, &NoInference, &mut log);
        assert_eq!(log.warnings().len(), 1);

        let owner = Identity::new("owner");
        let (changes, _) = log.finish(
            IssueOutcome {
                status: "MERGED",
                actor: &owner,
                closed_at: DateTime::from_timestamp(1_359_720_000, 0),
                submitted_on: DateTime::from_timestamp(1_359_700_000, 0).unwrap(),
            },
            &TerminalStatuses::default(),
        );
        assert!(changes
            .iter()
            .any(|c| c.field == STATUS_FIELD && c.new_value.as_deref() == Some("MERGED")));
        assert!(changes.windows(2).all(|w| w[0].changed_on <= w[1].changed_on));
    }
}
