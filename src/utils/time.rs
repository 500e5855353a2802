//! Timestamp helpers: now, format, parse.
//!
//! The canonical text form is RFC 3339 in UTC with as many fractional digits
//! as the value needs, so `parse_timestamp(&format_timestamp(t)) == t`.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use thiserror::Error;

/// Naive layouts accepted by [`parse_timestamp`] after RFC 3339 and RFC 2822.
/// Interpreted as UTC.
const NAIVE_DATETIME_PATTERNS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const DATE_PATTERN: &str = "%Y-%m-%d";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("unrecognized timestamp: {input:?}")]
    Unrecognized { input: String },

    #[error("timestamp {input:?} does not match pattern {pattern:?}")]
    Mismatch { input: String, pattern: String },

    #[error("invalid format pattern: {pattern:?}")]
    InvalidPattern { pattern: String },
}

/// Current time in UTC. Used for every `created_at` / `updated_at` default.
pub fn current_time() -> DateTime<Utc> {
    Utc::now()
}

/// Canonical, lossless text form (RFC 3339, `Z` suffix).
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Format with a `strftime` pattern, optionally shifted into `offset`.
///
/// An unknown specifier is reported as [`FormatError::InvalidPattern`] rather
/// than panicking inside `Display`.
pub fn format_timestamp_with(
    ts: &DateTime<Utc>,
    pattern: &str,
    offset: Option<FixedOffset>,
) -> Result<String, FormatError> {
    let items = checked_items(pattern)?;
    let out = match offset {
        Some(tz) => ts
            .with_timezone(&tz)
            .format_with_items(items.into_iter())
            .to_string(),
        None => ts.format_with_items(items.into_iter()).to_string(),
    };
    Ok(out)
}

/// Parse any recognised timestamp layout into UTC.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, FormatError> {
    let s = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for pattern in NAIVE_DATETIME_PATTERNS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, pattern) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, DATE_PATTERN) {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(FormatError::Unrecognized {
        input: input.to_string(),
    })
}

/// Parse with an explicit pattern. Patterns carrying an offset (`%z`, `%:z`)
/// keep it; everything else is taken as UTC. Date-only patterns give midnight.
pub fn parse_timestamp_with(input: &str, pattern: &str) -> Result<DateTime<Utc>, FormatError> {
    checked_items(pattern)?;
    let mismatch = || FormatError::Mismatch {
        input: input.to_string(),
        pattern: pattern.to_string(),
    };
    if let Ok(dt) = DateTime::parse_from_str(input, pattern) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, pattern) {
        return Ok(naive.and_utc());
    }
    NaiveDate::parse_from_str(input, pattern)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(mismatch)
}

/// Fractional seconds from `start` to `end` (negative if `end` is earlier).
pub fn elapsed_seconds(start: &DateTime<Utc>, end: &DateTime<Utc>) -> f64 {
    let delta = *end - *start;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

fn checked_items(pattern: &str) -> Result<Vec<Item<'_>>, FormatError> {
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|i| matches!(i, Item::Error)) {
        return Err(FormatError::InvalidPattern {
            pattern: pattern.to_string(),
        });
    }
    Ok(items)
}
