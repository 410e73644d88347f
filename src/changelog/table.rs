//! Row-spanning activity tables.
//!
//! A group opens with a "who" and a "when" cell whose `rowspan` declares
//! how many what/old/new triples share that actor and timestamp. The
//! opening row may carry triples itself; continuation rows carry only
//! triples. Row shape tells the two apart: opening rows have `3k + 2`
//! cells and continuation rows have `3k`.

use chrono::{DateTime, Utc};

use super::{ChangeLog, clean_value, normalize_field};
use crate::decode::Element;
use crate::model::{Change, Identity};

const SOURCE: &str = "table";

/// One table cell; `text` is `None` for empty cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub text: Option<String>,
    pub rowspan: u32,
}

impl Cell {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: clean_value(&text.into()),
            rowspan: 1,
        }
    }

    #[must_use]
    pub fn with_rowspan(mut self, rowspan: u32) -> Self {
        self.rowspan = rowspan.max(1);
        self
    }

    fn from_element(el: &Element) -> Self {
        let rowspan = el
            .attr("rowspan")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(1);
        Self::new(el.text_trimmed()).with_rowspan(rowspan)
    }
}

/// The actor and timestamp shared by a group of triples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub who: Identity,
    pub when: DateTime<Utc>,
}

/// Reconstruction state between rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableState {
    /// Expecting a row that opens a new who/when group.
    StartOfGroup,
    /// Inside a group; `remaining` triples still belong to it.
    Continuation { group: Group, remaining: u32 },
    /// Inside a group whose header was unusable; its triples are dropped.
    SkippingGroup { remaining: u32 },
}

/// Explicit state machine over activity-table rows.
#[derive(Debug)]
pub struct RowspanMachine {
    state: TableState,
    row: usize,
}

impl Default for RowspanMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RowspanMachine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: TableState::StartOfGroup,
            row: 0,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &TableState {
        &self.state
    }

    /// Consume one row, emitting changes into `log`.
    pub fn feed(&mut self, cells: &[Cell], log: &mut ChangeLog) {
        self.row += 1;
        let n = cells.len();

        if n >= 2 && (n - 2) % 3 == 0 {
            self.open_group(cells, log);
        } else if n >= 3 && n % 3 == 0 {
            self.continue_group(cells, log);
        } else if n > 0 {
            log.warn(
                SOURCE,
                Some(self.entry()),
                format!("row has {n} cells, expected who/when or what/old/new triples"),
            );
        }
    }

    /// Flush the machine at the end of the table.
    pub fn finish(self, log: &mut ChangeLog) {
        if let TableState::Continuation { remaining, .. } = self.state {
            if remaining > 0 {
                log.warn(
                    SOURCE,
                    None,
                    format!("table ended with {remaining} declared change(s) missing"),
                );
            }
        }
    }

    fn open_group(&mut self, cells: &[Cell], log: &mut ChangeLog) {
        if let TableState::Continuation { remaining, .. } = &self.state {
            if *remaining > 0 {
                log.warn(
                    SOURCE,
                    Some(self.entry()),
                    format!("new group starts with {remaining} declared change(s) missing"),
                );
            }
        }

        let (who_cell, when_cell) = (&cells[0], &cells[1]);
        let declared = who_cell.rowspan.max(when_cell.rowspan);
        let entry = Some(self.entry());

        let group = match (&who_cell.text, &when_cell.text) {
            (Some(who), Some(when)) => log.timestamp(SOURCE, entry, when).map(|when| Group {
                who: Identity::new(who.as_str()),
                when,
            }),
            (None, _) => {
                log.warn(SOURCE, entry, "group has no actor");
                None
            }
            (_, None) => {
                log.warn(SOURCE, entry, "group has no timestamp");
                None
            }
        };

        self.state = match group {
            Some(group) => TableState::Continuation {
                group,
                remaining: declared,
            },
            None => TableState::SkippingGroup {
                remaining: declared,
            },
        };
        self.consume_triples(&cells[2..], log);
    }

    fn continue_group(&mut self, cells: &[Cell], log: &mut ChangeLog) {
        if self.state == TableState::StartOfGroup {
            log.warn(
                SOURCE,
                Some(self.entry()),
                "change row outside any who/when group",
            );
            return;
        }
        self.consume_triples(cells, log);
    }

    fn consume_triples(&mut self, cells: &[Cell], log: &mut ChangeLog) {
        let entry = self.entry();
        for triple in cells.chunks_exact(3) {
            let next = match std::mem::replace(&mut self.state, TableState::StartOfGroup) {
                TableState::Continuation { group, remaining } if remaining > 0 => {
                    match &triple[0].text {
                        Some(what) => log.push(Change::new(
                            normalize_field(what),
                            triple[1].text.clone(),
                            triple[2].text.clone(),
                            group.who.clone(),
                            group.when,
                        )),
                        None => log.warn(SOURCE, Some(entry.clone()), "change has no field name"),
                    }
                    TableState::Continuation {
                        group,
                        remaining: remaining - 1,
                    }
                }
                TableState::SkippingGroup { remaining } if remaining > 0 => {
                    TableState::SkippingGroup {
                        remaining: remaining - 1,
                    }
                }
                _ => {
                    log.warn(SOURCE, Some(entry), "more changes than the group declared");
                    return;
                }
            };

            self.state = match next {
                TableState::Continuation { remaining: 0, .. }
                | TableState::SkippingGroup { remaining: 0 } => TableState::StartOfGroup,
                other => other,
            };
        }
    }

    fn entry(&self) -> String {
        format!("row {}", self.row)
    }
}

/// Reconstruct changes from pre-split rows.
pub fn apply_rows<'a, I>(rows: I, log: &mut ChangeLog)
where
    I: IntoIterator<Item = &'a [Cell]>,
{
    let mut machine = RowspanMachine::new();
    for row in rows {
        machine.feed(row, log);
    }
    machine.finish(log);
}

/// Locate the activity table in a decoded page and split it into data rows.
///
/// The table is the one with `id="bug_activity"` or, failing that, the
/// first table whose header mentions "Who". Header rows are dropped.
/// Returns `None` when the page has no activity table.
#[must_use]
pub fn activity_rows(page: &Element) -> Option<Vec<Vec<Cell>>> {
    let tables = page.descendants_named("table");
    let table = tables
        .iter()
        .find(|t| t.attr("id") == Some("bug_activity"))
        .or_else(|| {
            tables.iter().find(|t| {
                t.descendants_named("th")
                    .iter()
                    .any(|th| th.text_trimmed().eq_ignore_ascii_case("who"))
            })
        })?;

    let rows = table
        .descendants_named("tr")
        .into_iter()
        .map(|tr| tr.children_named("td").map(Cell::from_element).collect::<Vec<_>>())
        .filter(|cells| !cells.is_empty())
        .collect();
    Some(rows)
}

/// Reconstruct changes from an activity page.
///
/// A page without an activity table yields no changes and no warnings:
/// issues that were never modified have no table.
pub fn apply_activity_page(page: &Element, log: &mut ChangeLog) {
    if let Some(rows) = activity_rows(page) {
        apply_rows(rows.iter().map(Vec::as_slice), log);
    }
}
