//! Timestamp parsing shared by all backends.
//!
//! Trackers render timestamps in many shapes: RFC 3339, SQL-style with or
//! without fractional seconds, with numeric offsets or zone abbreviations,
//! and bare Unix epochs. Everything is normalised to UTC.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

/// A timestamp string no known format could parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable timestamp: {0:?}")]
pub struct InvalidTimestamp(pub String);

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f %:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%a, %d %b %Y %H:%M:%S %z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Zone abbreviations seen in tracker output, in seconds east of UTC.
///
/// Unknown abbreviations are treated as UTC.
const ZONE_ABBREVIATIONS: &[(&str, i32)] = &[
    ("UTC", 0),
    ("GMT", 0),
    ("Z", 0),
    ("WET", 0),
    ("BST", 3600),
    ("CET", 3600),
    ("CEST", 7200),
    ("EET", 7200),
    ("EEST", 10800),
    ("EST", -5 * 3600),
    ("EDT", -4 * 3600),
    ("CST", -6 * 3600),
    ("CDT", -5 * 3600),
    ("MST", -7 * 3600),
    ("MDT", -6 * 3600),
    ("PST", -8 * 3600),
    ("PDT", -7 * 3600),
    ("JST", 9 * 3600),
];

/// Parse a tracker timestamp into UTC.
///
/// # Errors
///
/// Returns `InvalidTimestamp` when the input matches none of the known
/// formats.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, InvalidTimestamp> {
    let s = raw.trim();
    let invalid = || InvalidTimestamp(raw.to_string());

    if s.is_empty() {
        return Err(invalid());
    }

    // Unix epoch seconds (Gerrit, Phabricator)
    if s.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = s.parse().map_err(|_| invalid())?;
        return DateTime::from_timestamp(secs, 0).ok_or_else(invalid);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    let (body, offset) = split_zone_abbreviation(s);

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(body, fmt) {
            return localize(naive, offset).ok_or_else(invalid);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(body, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
        return localize(naive, offset).ok_or_else(invalid);
    }

    Err(invalid())
}

/// Strip a trailing alphabetic zone name, returning its offset in seconds.
fn split_zone_abbreviation(s: &str) -> (&str, i32) {
    if let Some(stripped) = s.strip_suffix('Z') {
        if stripped.ends_with(|c: char| c.is_ascii_digit()) {
            return (stripped, 0);
        }
    }

    match s.rsplit_once(' ') {
        Some((body, zone)) if !zone.is_empty() && zone.chars().all(|c| c.is_ascii_alphabetic()) => {
            let offset = ZONE_ABBREVIATIONS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(zone))
                .map_or(0, |(_, secs)| *secs);
            (body.trim_end(), offset)
        }
        _ => (s, 0),
    }
}

fn localize(naive: NaiveDateTime, offset_secs: i32) -> Option<DateTime<Utc>> {
    let offset = FixedOffset::east_opt(offset_secs)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}
