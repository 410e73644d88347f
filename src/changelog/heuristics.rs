//! Lifecycle inference from comment text.
//!
//! Some trackers never record certain status transitions as data; they
//! only leave a human-readable message behind ("Patch Set 3: Abandoned").
//! Inference from text is lossy: a user quoting such a message in a
//! comment produces a spurious transition. Backends pick the heuristic they
//! trust, and the review engine only sees the [`LifecycleHeuristic`] trait.

use std::sync::LazyLock;

use regex::Regex;

/// Infers a status transition from a message.
pub trait LifecycleHeuristic: Send + Sync {
    /// The status the message moves the issue to, if any.
    fn status_for(&self, message: &str) -> Option<String>;
}

/// Heuristic that never infers anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInference;

impl LifecycleHeuristic for NoInference {
    fn status_for(&self, _message: &str) -> Option<String> {
        None
    }
}

/// Ordered list of message patterns; the first match wins.
#[derive(Debug, Clone)]
pub struct CommentPatterns {
    patterns: Vec<(Regex, String)>,
}

static REVIEW_PATTERNS: LazyLock<Vec<(Regex, String)>> = LazyLock::new(|| {
    [
        (r"(?im)^\s*(?:Patch Set \d+:\s*)?Abandoned\b", "ABANDONED"),
        (r"(?im)^\s*(?:Patch Set \d+:\s*)?Restored\b", "NEW"),
        (
            r"(?i)\bChange has been successfully (?:merged|cherry-picked|rebased)\b",
            "MERGED",
        ),
    ]
    .into_iter()
    .map(|(re, status)| {
        (
            Regex::new(re).expect("review message pattern is valid"),
            status.to_string(),
        )
    })
    .collect()
});

impl CommentPatterns {
    #[must_use]
    pub const fn new(patterns: Vec<(Regex, String)>) -> Self {
        Self { patterns }
    }

    /// Patterns for code-review messages (abandon, restore, merge).
    #[must_use]
    pub fn code_review() -> Self {
        Self::new(REVIEW_PATTERNS.clone())
    }
}

impl LifecycleHeuristic for CommentPatterns {
    fn status_for(&self, message: &str) -> Option<String> {
        self.patterns
            .iter()
            .find(|(re, _)| re.is_match(message))
            .map(|(_, status)| status.clone())
    }
}
