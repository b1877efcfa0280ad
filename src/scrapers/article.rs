//! Article metadata resolution: title, body text and publication date.
//!
//! # Date fallback chain
//!
//! | Tier | Where | Confidence |
//! |------|-------|------------|
//! | 1 | `<meta>` fields and `<time datetime>` | authoritative |
//! | 2 | JSON-LD / inline JSON strings in the raw HTML | authoritative |
//! | 3 | date segment in the URL path | fallback |
//! | 4 | the day the item was seen | unresolved |
//!
//! Every tier hands its raw value to [`normalize_date`], so a resolved item
//! always carries a [`NaiveDate`] no matter what the page looked like.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::dates::{RawDate, date_from_url, normalize_date};
use crate::fetch::{FetchError, PageFetcher};
use crate::models::{Candidate, DateConfidence, ResolvedItem};
use crate::utils::{collapse_whitespace, domain_of, truncate_for_log};

/// Ordered `(attribute, value)` pairs identifying publication-date meta tags.
const DATE_META_FIELDS: &[(&str, &str)] = &[
    ("property", "article:published_time"),
    ("itemprop", "datePublished"),
    ("name", "datePublished"),
    ("property", "og:published_time"),
    ("name", "publishdate"),
    ("name", "pubdate"),
    ("name", "date"),
    ("name", "DC.date.issued"),
    ("name", "publication_date"),
];

static DATE_META_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    DATE_META_FIELDS
        .iter()
        .map(|(attr, value)| {
            Selector::parse(&format!(r#"meta[{attr}="{value}"]"#)).expect("static selector")
        })
        .collect()
});

static EMBEDDED_DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["datePublished", "dateCreated", "publishedAt", "published_time", "uploadDate"]
        .iter()
        .map(|key| Regex::new(&format!(r#""{key}"\s*:\s*"([^"]{{6,40}})""#)).expect("static regex"))
        .collect()
});

static TIME_DATETIME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time[datetime]").expect("static selector"));
static TITLE_META: Lazy<Vec<Selector>> = Lazy::new(|| {
    [r#"meta[property="og:title"]"#, r#"meta[name="twitter:title"]"#]
        .iter()
        .map(|s| Selector::parse(s).expect("static selector"))
        .collect()
});
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("static selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("static selector"));
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("static selector"));

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("no title found at {0}")]
    Parse(String),
}

/// A normalized publication date plus where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDate {
    pub date: NaiveDate,
    pub confidence: DateConfidence,
}

impl ResolvedDate {
    fn authoritative(date: NaiveDate) -> Self {
        Self { date, confidence: DateConfidence::Authoritative }
    }

    fn fallback(date: NaiveDate) -> Self {
        Self { date, confidence: DateConfidence::Fallback }
    }

    fn unresolved(today: NaiveDate) -> Self {
        Self { date: today, confidence: DateConfidence::Unresolved }
    }
}

/// Fetch a candidate's page and resolve its metadata.
#[instrument(level = "debug", skip_all, fields(url = %candidate.canonical_url))]
pub async fn resolve_article<F: PageFetcher>(
    fetcher: &F,
    candidate: Candidate,
    today: NaiveDate,
) -> Result<ResolvedItem, ResolveError> {
    let page = fetcher.fetch(&candidate.canonical_url).await?;
    resolve_from_html(candidate, &page.body, today)
}

/// Resolve metadata from an already fetched page body.
pub fn resolve_from_html(
    candidate: Candidate,
    html: &str,
    today: NaiveDate,
) -> Result<ResolvedItem, ResolveError> {
    let document = Html::parse_document(html);

    let title = extract_title(&document)
        .or_else(|| Some(candidate.raw_title.clone()).filter(|t| !t.trim().is_empty()))
        .ok_or_else(|| ResolveError::Parse(candidate.canonical_url.clone()))?;
    let text = extract_text(&document);
    let date = resolve_page_date(&document, html, &candidate.canonical_url, today);
    debug!(title = %truncate_for_log(&title, 120), date = %date.date, confidence = ?date.confidence, "Resolved article");

    Ok(build_item(candidate, title, text, date))
}

/// Resolve a feed-provided candidate without fetching the article.
///
/// The feed's date goes through the same normalization as page dates; when it
/// is missing or garbage we fall through to the URL and then to `today`.
pub fn resolve_from_feed(candidate: Candidate, today: NaiveDate) -> ResolvedItem {
    let date = candidate
        .date_hint
        .as_ref()
        .and_then(normalize_date)
        .map(ResolvedDate::authoritative)
        .or_else(|| date_from_url(&candidate.canonical_url).map(ResolvedDate::fallback))
        .unwrap_or(ResolvedDate::unresolved(today));
    let title = collapse_whitespace(&candidate.raw_title);
    let text = collapse_whitespace(&candidate.raw_text);
    build_item(candidate, title, text, date)
}

fn build_item(candidate: Candidate, title: String, text: String, date: ResolvedDate) -> ResolvedItem {
    let domain = candidate
        .publisher_domain
        .clone()
        .or_else(|| domain_of(&candidate.canonical_url))
        .unwrap_or_default();
    ResolvedItem {
        canonical_url: candidate.canonical_url,
        source_id: candidate.source_id,
        section: candidate.section,
        title,
        text,
        discovered_at: candidate.discovered_at,
        publication_date: date.date,
        date_confidence: date.confidence,
        domain,
    }
}

/// Run the date fallback chain against a parsed page.
pub fn resolve_page_date(document: &Html, raw_html: &str, url: &str, today: NaiveDate) -> ResolvedDate {
    meta_date(document)
        .or_else(|| embedded_date(raw_html))
        .map(ResolvedDate::authoritative)
        .or_else(|| date_from_url(url).map(ResolvedDate::fallback))
        .unwrap_or(ResolvedDate::unresolved(today))
}

fn meta_date(document: &Html) -> Option<NaiveDate> {
    let from_meta = DATE_META_SELECTORS.iter().find_map(|sel| {
        document
            .select(sel)
            .filter_map(|m| m.value().attr("content"))
            .find_map(|content| normalize_date(&RawDate::from(content)))
    });
    from_meta.or_else(|| {
        document
            .select(&TIME_DATETIME)
            .filter_map(|t| t.value().attr("datetime"))
            .find_map(|dt| normalize_date(&RawDate::from(dt)))
    })
}

fn embedded_date(raw_html: &str) -> Option<NaiveDate> {
    EMBEDDED_DATE_PATTERNS.iter().find_map(|re| {
        re.captures_iter(raw_html)
            .find_map(|caps| normalize_date(&RawDate::from(&caps[1])))
    })
}

fn extract_title(document: &Html) -> Option<String> {
    let from_meta = TITLE_META.iter().find_map(|sel| {
        document
            .select(sel)
            .filter_map(|m| m.value().attr("content"))
            .map(collapse_whitespace)
            .find(|t| !t.is_empty())
    });
    from_meta.or_else(|| {
        [&*H1, &*TITLE].into_iter().find_map(|sel| {
            document
                .select(sel)
                .map(|e| collapse_whitespace(&e.text().collect::<Vec<_>>().join(" ")))
                .find(|t| !t.is_empty())
        })
    })
}

/// Visible body text: every text node outside `script`, `style` and `noscript`.
pub fn extract_text(document: &Html) -> String {
    let Some(body) = document.select(&BODY).next() else {
        return String::new();
    };
    let mut parts: Vec<&str> = Vec::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript"))
        });
        if !hidden {
            parts.push(text);
        }
    }
    collapse_whitespace(&parts.join(" "))
}
