//! Google News RSS adapter.
//!
//! One search feed per keyword. Every hit becomes a [`Candidate`] with the
//! aggregator source id, the publisher name as its section and the feed's
//! `pubDate` kept as a raw hint for the date normalizer.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use scraper::Html;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::dates::RawDate;
use crate::fetch::{FetchError, PageFetcher};
use crate::models::{AGGREGATOR_SOURCE_ID, Candidate};
use crate::utils::{canonicalize_url, collapse_whitespace, domain_of};

/// Section used when a feed item names no publisher.
pub const GENERAL_SECTION: &str = "General";

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unreadable feed for {keyword:?}: {message}")]
    Feed { keyword: String, message: String },
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    #[serde(default)]
    description: String,
    source: Option<FeedSource>,
}

#[derive(Debug, Deserialize)]
struct FeedSource {
    #[serde(rename = "@url")]
    url: Option<String>,
    #[serde(rename = "$text", default)]
    name: String,
}

/// Query settings for the aggregator.
#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    pub base_url: String,
    pub hl: String,
    pub gl: String,
    pub ceid: String,
    pub recency_days: u32,
    pub max_links: usize,
    pub concurrency: usize,
}

/// Combined result of a keyword batch.
#[derive(Debug, Default)]
pub struct AggregatorHarvest {
    /// Candidates across all keywords, first occurrence of each URL kept.
    pub candidates: Vec<Candidate>,
    pub failed_keywords: Vec<String>,
    pub blocked: bool,
}

/// Build the search feed URL for one keyword.
pub fn search_url(keyword: &str, opts: &AggregatorOptions) -> String {
    let query = format!("{keyword} when:{}d", opts.recency_days);
    format!(
        "{}?q={}&hl={}&gl={}&ceid={}",
        opts.base_url,
        urlencoding::encode(&query),
        urlencoding::encode(&opts.hl),
        urlencoding::encode(&opts.gl),
        urlencoding::encode(&opts.ceid),
    )
}

/// Query every keyword and merge the hits.
///
/// A failing keyword is logged and listed in
/// [`AggregatorHarvest::failed_keywords`]; the rest of the batch carries on.
#[instrument(level = "info", skip_all, fields(keywords = keywords.len()))]
pub async fn harvest_keywords<F: PageFetcher>(
    fetcher: &F,
    keywords: &[String],
    opts: &AggregatorOptions,
    now: DateTime<Utc>,
) -> AggregatorHarvest {
    let outcomes: Vec<(String, Result<Vec<Candidate>, AggregatorError>)> = stream::iter(keywords)
        .map(move |kw| async move { (kw.clone(), search_keyword(fetcher, kw, opts, now).await) })
        .buffered(opts.concurrency.max(1))
        .collect()
        .await;

    let mut harvest = AggregatorHarvest::default();
    let mut merged = Vec::new();
    for (keyword, outcome) in outcomes {
        match outcome {
            Ok(candidates) => merged.extend(candidates),
            Err(e) => {
                warn!(%keyword, error = %e, "Aggregator query failed; skipping keyword");
                if matches!(&e, AggregatorError::Fetch(f) if f.is_blocked()) {
                    harvest.blocked = true;
                }
                harvest.failed_keywords.push(keyword);
            }
        }
    }
    harvest.candidates = merged
        .into_iter()
        .unique_by(|c| c.canonical_url.clone())
        .collect();

    info!(
        candidates = harvest.candidates.len(),
        failed = harvest.failed_keywords.len(),
        "Aggregator batch finished"
    );
    harvest
}

/// Query the aggregator for one keyword.
#[instrument(level = "debug", skip(fetcher, opts, now))]
pub async fn search_keyword<F: PageFetcher>(
    fetcher: &F,
    keyword: &str,
    opts: &AggregatorOptions,
    now: DateTime<Utc>,
) -> Result<Vec<Candidate>, AggregatorError> {
    let page = fetcher.fetch(&search_url(keyword, opts)).await?;
    let candidates = parse_feed(&page.body, keyword, opts.max_links, now)?;
    debug!(count = candidates.len(), "Aggregator hits");
    Ok(candidates)
}

/// Turn an RSS document into candidates, capped at `max_links`.
pub fn parse_feed(
    xml: &str,
    keyword: &str,
    max_links: usize,
    now: DateTime<Utc>,
) -> Result<Vec<Candidate>, AggregatorError> {
    let rss: Rss = quick_xml::de::from_str(xml).map_err(|e| AggregatorError::Feed {
        keyword: keyword.to_string(),
        message: e.to_string(),
    })?;

    Ok(rss
        .channel
        .items
        .into_iter()
        .filter_map(|item| to_candidate(item, now))
        .unique_by(|c| c.canonical_url.clone())
        .take(max_links)
        .collect())
}

fn to_candidate(item: FeedItem, now: DateTime<Utc>) -> Option<Candidate> {
    let canonical_url = canonicalize_url(item.link.trim(), None)?;
    let (section, publisher_domain) = match item.source {
        Some(source) => {
            let name = collapse_whitespace(&source.name);
            let section = if name.is_empty() { GENERAL_SECTION.to_string() } else { name };
            (section, source.url.as_deref().and_then(domain_of))
        }
        None => (GENERAL_SECTION.to_string(), None),
    };

    Some(Candidate {
        canonical_url,
        source_id: AGGREGATOR_SOURCE_ID.to_string(),
        section,
        raw_title: collapse_whitespace(&item.title),
        raw_text: strip_html(&item.description),
        discovered_at: now,
        date_hint: item.pub_date.map(RawDate::from),
        publisher_domain,
    })
}

/// Feed descriptions carry escaped HTML snippets; keep only their text.
fn strip_html(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    collapse_whitespace(&parsed.root_element().text().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{Canned, StaticFetcher};
    use crate::scrapers::article::resolve_from_feed;
    use chrono::NaiveDate;

    fn opts() -> AggregatorOptions {
        AggregatorOptions {
            base_url: "https://news.google.com/rss/search".into(),
            hl: "pt-BR".into(),
            gl: "BR".into(),
            ceid: "BR:pt-419".into(),
            recency_days: 3,
            max_links: 20,
            concurrency: 2,
        }
    }

    fn feed(items: &[(&str, &str, &str)]) -> String {
        let body: String = items
            .iter()
            .map(|(title, link, date)| {
                format!(
                    r##"<item><title>{title}</title><link>{link}</link><guid isPermaLink="false">x</guid>
                    <pubDate>{date}</pubDate>
                    <description>&lt;a href="{link}"&gt;{title}&lt;/a&gt;&amp;nbsp;&lt;font color="#6f6f6f"&gt;Folha&lt;/font&gt;</description>
                    <source url="https://www1.folha.uol.com.br">Folha de S.Paulo</source></item>"##
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel>
            <generator>NFE/5.0</generator><title>"STF" - Google Notícias</title>
            <link>https://news.google.com/search?q=STF</link><language>pt-BR</language>
            {body}</channel></rss>"#
        )
    }

    #[test]
    fn test_search_url_encodes_query() {
        let url = search_url("reforma tributária", &opts());
        assert!(url.starts_with("https://news.google.com/rss/search?q=reforma%20tribut%C3%A1ria%20when%3A3d"));
        assert!(url.ends_with("&hl=pt-BR&gl=BR&ceid=BR%3Apt-419"));
    }

    #[test]
    fn test_parse_feed_builds_candidates() {
        let xml = feed(&[(
            "STF decide X - Folha de S.Paulo",
            "https://news.google.com/rss/articles/CBMiabc?oc=5",
            "Thu, 19 Jun 2025 13:00:00 GMT",
        )]);
        let items = parse_feed(&xml, "STF", 20, Utc::now()).unwrap();
        assert_eq!(items.len(), 1);
        let c = &items[0];
        assert_eq!(c.source_id, AGGREGATOR_SOURCE_ID);
        assert_eq!(c.section, "Folha de S.Paulo");
        assert_eq!(c.publisher_domain.as_deref(), Some("www1.folha.uol.com.br"));
        assert_eq!(c.raw_text, "STF decide X - Folha de S.Paulo Folha");
        assert_eq!(c.date_hint, Some(RawDate::from("Thu, 19 Jun 2025 13:00:00 GMT")));
    }

    #[test]
    fn test_missing_source_is_general() {
        let xml = r#"<rss><channel><item><title>T</title><link>https://a.com/x</link></item></channel></rss>"#;
        let items = parse_feed(xml, "T", 20, Utc::now()).unwrap();
        assert_eq!(items[0].section, GENERAL_SECTION);
        assert_eq!(items[0].date_hint, None);
    }

    #[test]
    fn test_plain_date_string_resolves() {
        let xml = feed(&[("STF decide X", "https://news.google.com/rss/articles/a", "2025-06-19")]);
        let items = parse_feed(&xml, "STF", 20, Utc::now()).unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 6, 20).unwrap();
        let item = resolve_from_feed(items[0].clone(), today);
        assert_eq!(item.publication_date, NaiveDate::from_ymd_opt(2025, 6, 19).unwrap());
    }

    #[test]
    fn test_parse_feed_rejects_garbage() {
        assert!(matches!(
            parse_feed("not xml at all <<", "STF", 20, Utc::now()),
            Err(AggregatorError::Feed { .. })
        ));
    }

    #[tokio::test]
    async fn test_batch_isolates_failures_and_merges() {
        let o = opts();
        let stf = feed(&[
            ("A", "https://news.google.com/rss/articles/a", "Thu, 19 Jun 2025 13:00:00 GMT"),
            ("B", "https://news.google.com/rss/articles/b", "Thu, 19 Jun 2025 14:00:00 GMT"),
        ]);
        let congresso = feed(&[
            ("B", "https://news.google.com/rss/articles/b", "Thu, 19 Jun 2025 14:00:00 GMT"),
            ("C", "https://news.google.com/rss/articles/c", "Thu, 19 Jun 2025 15:00:00 GMT"),
        ]);
        let fetcher = StaticFetcher::new()
            .page(&search_url("STF", &o), stf)
            .canned(&search_url("Lula", &o), Canned::Timeout)
            .page(&search_url("Congresso", &o), congresso);
        let keywords: Vec<String> = ["STF", "Lula", "Congresso"].iter().map(|s| s.to_string()).collect();

        let h = harvest_keywords(&fetcher, &keywords, &o, Utc::now()).await;
        let urls: Vec<&str> = h.candidates.iter().map(|c| c.canonical_url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://news.google.com/rss/articles/a",
                "https://news.google.com/rss/articles/b",
                "https://news.google.com/rss/articles/c",
            ]
        );
        assert_eq!(h.failed_keywords, vec!["Lula".to_string()]);
        assert!(!h.blocked);
    }

    #[tokio::test]
    async fn test_batch_flags_blocked() {
        let o = opts();
        let fetcher = StaticFetcher::new().canned(&search_url("STF", &o), Canned::Status(500));
        let h = harvest_keywords(&fetcher, &["STF".to_string()], &o, Utc::now()).await;
        assert_eq!(h.failed_keywords.len(), 1);
        assert!(!h.blocked);

        let fetcher = StaticFetcher::new().canned(&search_url("STF", &o), Canned::Blocked);
        let h = harvest_keywords(&fetcher, &["STF".to_string()], &o, Utc::now()).await;
        assert!(h.blocked);
    }
}
