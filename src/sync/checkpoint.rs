//! Checkpoint / resume manager.
//!
//! Owns one tracker's [`Checkpoint`] during a run. The watermark only moves
//! after an issue is durably stored, and never past an issue that failed
//! in the current window, so a restart always re-lists anything not yet
//! stored. Windows are inclusive of their `since` bound; issues re-listed
//! at exactly the watermark are filtered out by the unchanged-issue check.

use chrono::{DateTime, Utc};

use super::adapter::{FetchWindow, Page, PageOrder};
use crate::model::Checkpoint;

/// Why pagination ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStop {
    /// Keep fetching.
    Continue,
    /// The adapter reported the end of the listing.
    Exhausted,
    /// A short page brought nothing new.
    NothingNew,
    /// The adapter returned the same cursor again.
    Stalled,
}

/// Tracks the resume state of one tracker during a run.
#[derive(Debug)]
pub struct CheckpointManager {
    state: Checkpoint,
    order: PageOrder,
    page_size: usize,
    open: bool,
    /// Earliest modification time of an issue that failed this window.
    failure_ceiling: Option<DateTime<Utc>>,
    /// Latest modification time stored this window.
    window_max: Option<DateTime<Utc>>,
}

impl CheckpointManager {
    #[must_use]
    pub fn new(state: Checkpoint, order: PageOrder, page_size: usize) -> Self {
        Self {
            state,
            order,
            page_size: page_size.max(1),
            open: false,
            failure_ceiling: None,
            window_max: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &Checkpoint {
        &self.state
    }

    #[must_use]
    pub const fn watermark(&self) -> Option<DateTime<Utc>> {
        self.state.watermark
    }

    /// Parameters for the next page request.
    ///
    /// The first call opens a window: an interrupted window is resumed
    /// with its stored bound and cursor, otherwise a new one starts at
    /// the watermark.
    pub fn next_fetch_window(&mut self) -> FetchWindow {
        if !self.open {
            self.open = true;
            if self.state.is_resuming() {
                tracing::info!(
                    since = ?self.state.window_since,
                    cursor = ?self.state.cursor,
                    "Resuming interrupted window"
                );
            } else {
                self.state.window_since = self.state.watermark;
                self.state.cursor = None;
            }
        }
        FetchWindow {
            since: self.state.window_since,
            cursor: self.state.cursor.clone(),
            page_size: self.page_size,
        }
    }

    /// Record a durably stored issue.
    ///
    /// Returns true if the watermark moved.
    pub fn issue_persisted(&mut self, changed_on: DateTime<Utc>) -> bool {
        self.window_max = self.window_max.max(Some(changed_on));
        match self.order {
            PageOrder::Ascending => self.raise_watermark(changed_on),
            PageOrder::Descending => false,
        }
    }

    /// Record an issue that could not be stored.
    pub fn issue_failed(&mut self, changed_on: DateTime<Utc>) {
        self.failure_ceiling = Some(
            self.failure_ceiling
                .map_or(changed_on, |c| c.min(changed_on)),
        );
    }

    /// Decide whether pagination continues after `page`.
    #[must_use]
    pub fn page_stop<T>(&self, page: &Page<T>, new_items: usize) -> PageStop {
        if !page.has_more {
            PageStop::Exhausted
        } else if new_items == 0 && page.items.len() < self.page_size {
            PageStop::NothingNew
        } else if page.next_cursor.is_none() || page.next_cursor == self.state.cursor {
            PageStop::Stalled
        } else {
            PageStop::Continue
        }
    }

    /// Record that every issue of a page was handled; the cursor moves on.
    pub fn page_completed(&mut self, next_cursor: Option<String>) {
        self.state.cursor = next_cursor;
    }

    /// Close the window: clear resume state and release a descending
    /// adapter's watermark.
    pub fn window_completed(&mut self) {
        if let Some(max) = self.window_max {
            self.raise_watermark(max);
        }
        self.state.window_since = None;
        self.state.cursor = None;
        self.open = false;
        self.window_max = None;
    }

    fn raise_watermark(&mut self, candidate: DateTime<Utc>) -> bool {
        let candidate = self
            .failure_ceiling
            .map_or(candidate, |ceiling| candidate.min(ceiling));
        if self.state.watermark.is_some_and(|w| w >= candidate) {
            return false;
        }
        self.state.watermark = Some(candidate);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 1, 1, h, 0, 0).unwrap()
    }

    fn page(n: usize, has_more: bool, cursor: Option<&str>) -> Page<u32> {
        Page {
            items: vec![0; n],
            next_cursor: cursor.map(String::from),
            has_more,
        }
    }

    #[test]
    fn test_fresh_window_starts_at_watermark() {
        let state = Checkpoint {
            watermark: Some(t(5)),
            ..Checkpoint::default()
        };
        let mut cp = CheckpointManager::new(state, PageOrder::Ascending, 50);
        let window = cp.next_fetch_window();
        assert_eq!(window.since, Some(t(5)));
        assert_eq!(window.cursor, None);
        assert_eq!(window.page_size, 50);
    }

    #[test]
    fn test_interrupted_window_resumes_at_cursor() {
        let state = Checkpoint {
            watermark: Some(t(7)),
            window_since: Some(t(5)),
            cursor: Some("100".into()),
        };
        let mut cp = CheckpointManager::new(state, PageOrder::Descending, 50);
        let window = cp.next_fetch_window();
        assert_eq!(window.since, Some(t(5)));
        assert_eq!(window.cursor.as_deref(), Some("100"));
    }

    #[test]
    fn test_ascending_advances_per_issue() {
        let mut cp = CheckpointManager::new(Checkpoint::default(), PageOrder::Ascending, 10);
        cp.next_fetch_window();
        assert!(cp.issue_persisted(t(1)));
        assert!(cp.issue_persisted(t(2)));
        assert!(!cp.issue_persisted(t(2)));
        assert_eq!(cp.watermark(), Some(t(2)));
    }

    #[test]
    fn test_failure_caps_watermark() {
        let mut cp = CheckpointManager::new(Checkpoint::default(), PageOrder::Ascending, 10);
        cp.next_fetch_window();
        cp.issue_persisted(t(1));
        cp.issue_failed(t(2));
        cp.issue_persisted(t(3));
        cp.issue_persisted(t(4));
        assert_eq!(cp.watermark(), Some(t(2)));

        cp.window_completed();
        assert_eq!(cp.watermark(), Some(t(2)));
    }

    #[test]
    fn test_descending_waits_for_window_end() {
        let mut cp = CheckpointManager::new(Checkpoint::default(), PageOrder::Descending, 10);
        cp.next_fetch_window();
        assert!(!cp.issue_persisted(t(9)));
        assert!(!cp.issue_persisted(t(3)));
        assert_eq!(cp.watermark(), None);

        cp.page_completed(Some("sortkey:abc".into()));
        assert!(cp.state().is_resuming());

        cp.window_completed();
        assert_eq!(cp.watermark(), Some(t(9)));
        assert!(!cp.state().is_resuming());
        assert_eq!(cp.state().window_since, None);
    }

    #[test]
    fn test_page_stop_rules() {
        let cp = CheckpointManager::new(Checkpoint::default(), PageOrder::Ascending, 10);
        assert_eq!(cp.page_stop(&page(3, false, None), 3), PageStop::Exhausted);
        assert_eq!(cp.page_stop(&page(9, true, Some("9")), 0), PageStop::NothingNew);
        // A full page of already-known issues may be followed by new ones.
        assert_eq!(cp.page_stop(&page(10, true, Some("10")), 0), PageStop::Continue);
        assert_eq!(cp.page_stop(&page(9, true, Some("9")), 2), PageStop::Continue);
        assert_eq!(cp.page_stop(&page(10, true, None), 10), PageStop::Stalled);
    }

    #[test]
    fn test_page_stop_detects_repeated_cursor() {
        let mut cp = CheckpointManager::new(Checkpoint::default(), PageOrder::Ascending, 10);
        cp.next_fetch_window();
        cp.page_completed(Some("20".into()));
        assert_eq!(cp.page_stop(&page(10, true, Some("20")), 10), PageStop::Stalled);
    }
}
