//! Publication-date normalization.
//!
//! Sources hand us dates in whatever shape they have: ISO strings with or
//! without offsets, RFC 2822 feed dates, Brazilian `dd/mm/yyyy`, bare
//! `yyyy-mm-dd`, timestamps already parsed by a library, or date segments
//! embedded in a URL path. All of them pass through [`normalize_date`],
//! which yields a single canonical [`NaiveDate`]. Nothing downstream of this
//! module ever sees a raw date.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A date value as it arrived from a source, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawDate {
    Text(String),
    Offset(DateTime<FixedOffset>),
    Utc(DateTime<Utc>),
    Date(NaiveDate),
    UnixSeconds(i64),
}

impl From<&str> for RawDate {
    fn from(s: &str) -> Self {
        RawDate::Text(s.to_string())
    }
}

impl From<String> for RawDate {
    fn from(s: String) -> Self {
        RawDate::Text(s)
    }
}

impl From<NaiveDate> for RawDate {
    fn from(d: NaiveDate) -> Self {
        RawDate::Date(d)
    }
}

impl From<DateTime<FixedOffset>> for RawDate {
    fn from(d: DateTime<FixedOffset>) -> Self {
        RawDate::Offset(d)
    }
}

impl From<DateTime<Utc>> for RawDate {
    fn from(d: DateTime<Utc>) -> Self {
        RawDate::Utc(d)
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];

// Only strips a zone that follows a time of day, so `19-06-2025` survives.
static RE_TZ_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(:\d{2}(?:\.\d+)?)\s*(?:Z|UTC|GMT|[+-]\d{2}:?\d{2})$").expect("static regex")
});
static RE_ISO_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})").expect("static regex"));

/// Normalize any raw date into a calendar date.
///
/// Timestamps keep the calendar date of their own offset: a story stamped
/// `2025-06-19T23:30:00-03:00` was published on the 19th where it was
/// written. Returns `None` when nothing date-shaped (and valid) is found.
pub fn normalize_date(raw: &RawDate) -> Option<NaiveDate> {
    match raw {
        RawDate::Date(d) => Some(*d),
        RawDate::Offset(dt) => Some(dt.date_naive()),
        RawDate::Utc(dt) => Some(dt.date_naive()),
        RawDate::UnixSeconds(secs) => DateTime::from_timestamp(*secs, 0).map(|dt| dt.date_naive()),
        RawDate::Text(s) => normalize_text_date(s),
    }
}

fn normalize_text_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.date_naive());
    }

    let bare = RE_TZ_SUFFIX.replace(s, "${1}");
    let bare = bare.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(bare, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(bare, fmt) {
            return Some(d);
        }
    }

    // Last resort: a leading ISO date followed by anything we do not know.
    let caps = RE_ISO_PREFIX.captures(s)?;
    ymd(&caps[1], &caps[2], &caps[3])
}

static URL_DATE_PATTERNS: Lazy<Vec<(Regex, DateOrder)>> = Lazy::new(|| {
    [
        (r"/(\d{4})/(\d{1,2})/(\d{1,2})(?:/|$)", DateOrder::Ymd),
        (r"/(\d{4})-(\d{1,2})-(\d{1,2})(?:/|$)", DateOrder::Ymd),
        (r"/(\d{1,2})/(\d{1,2})/(\d{4})(?:/|$)", DateOrder::Dmy),
        (r"/(\d{1,2})-(\d{1,2})-(\d{4})(?:/|$)", DateOrder::Dmy),
    ]
    .into_iter()
    .map(|(p, o)| (Regex::new(p).expect("static regex"), o))
    .collect()
});

#[derive(Debug, Clone, Copy)]
enum DateOrder {
    Ymd,
    Dmy,
}

/// Extract a date segment from a URL path (`/2025/06/19/`, `/19-06-2025/`, ...).
///
/// Impossible dates such as `/2025/13/45/` are skipped and the next pattern
/// is tried.
pub fn date_from_url(url: &str) -> Option<NaiveDate> {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    for (re, order) in URL_DATE_PATTERNS.iter() {
        for caps in re.captures_iter(&path) {
            let found = match order {
                DateOrder::Ymd => ymd(&caps[1], &caps[2], &caps[3]),
                DateOrder::Dmy => ymd(&caps[3], &caps[2], &caps[1]),
            };
            if found.is_some() {
                return found;
            }
        }
    }
    None
}

/// Whether a URL path carries a recognizable date segment.
pub fn has_date_segment(url: &str) -> bool {
    date_from_url(url).is_some()
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}
