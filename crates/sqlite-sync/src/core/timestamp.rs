//! Ordering of last-modified timestamps across two databases.
//!
//! SQLite has no timestamp type, so the same column may hold epoch numbers on
//! one side and ISO-8601 text on the other. Values are normalized before they
//! are compared; pairings that cannot be ordered are reported as incomparable
//! instead of being guessed.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use super::value::SqlValue;

/// Naive text layouts accepted in addition to RFC 3339. Read as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// A timestamp normalized for comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Stamp {
    /// NULL timestamp. Older than any present value.
    Missing,
    /// Integer or real, compared numerically.
    Number(f64),
    /// Text that parsed to an instant.
    Instant(DateTime<Utc>),
    /// Text that did not parse.
    Raw(String),
    /// Blob or non-UTF-8 text. Never comparable with anything but equal bytes.
    Opaque(Vec<u8>),
}

impl Stamp {
    /// Normalize a column value.
    pub fn from_value(value: &SqlValue) -> Self {
        match value {
            SqlValue::Null => Stamp::Missing,
            SqlValue::Integer(v) => Stamp::Number(*v as f64),
            SqlValue::Real(v) => Stamp::Number(*v),
            SqlValue::Text(s) => match parse_instant(s) {
                Some(instant) => Stamp::Instant(instant),
                None => Stamp::Raw(s.clone()),
            },
            SqlValue::RawText(b) | SqlValue::Blob(b) => Stamp::Opaque(b.clone()),
        }
    }
}

/// Compare two timestamp values.
///
/// Returns `None` when the pair cannot be ordered.
pub fn compare(a: &SqlValue, b: &SqlValue) -> Option<Ordering> {
    // Two integers compare exactly, without the f64 detour.
    if let (SqlValue::Integer(x), SqlValue::Integer(y)) = (a, b) {
        return Some(x.cmp(y));
    }

    match (Stamp::from_value(a), Stamp::from_value(b)) {
        (Stamp::Missing, Stamp::Missing) => Some(Ordering::Equal),
        (Stamp::Missing, _) => Some(Ordering::Less),
        (_, Stamp::Missing) => Some(Ordering::Greater),
        (Stamp::Number(x), Stamp::Number(y)) => x.partial_cmp(&y),
        (Stamp::Instant(x), Stamp::Instant(y)) => Some(x.cmp(&y)),
        (Stamp::Number(x), Stamp::Instant(y)) => epoch_seconds(x).map(|x| x.cmp(&y)),
        (Stamp::Instant(x), Stamp::Number(y)) => epoch_seconds(y).map(|y| x.cmp(&y)),
        (Stamp::Raw(x), Stamp::Raw(y)) => Some(x.cmp(&y)),
        (Stamp::Opaque(x), Stamp::Opaque(y)) if x == y => Some(Ordering::Equal),
        _ => None,
    }
}

/// Parse a text timestamp as a UTC instant.
pub fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1_000_000_000.0).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}
