//! Data models flowing through a scan cycle.
//!
//! - [`Source`] and [`Section`]: where links come from, refreshed by the
//!   section discoverer.
//! - [`Candidate`]: a harvested link, before metadata is confirmed.
//! - [`ResolvedItem`]: a candidate with a concrete publication date and domain.
//! - [`Alert`]: a resolved item that matched keywords and survived dedup.
//! - [`HistoryEntry`]: what we remember about an alert once it was delivered.
//!
//! Candidates, resolved items and alerts only live within one cycle.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::dates::RawDate;

/// Source id used for every candidate coming from the news aggregator.
pub const AGGREGATOR_SOURCE_ID: &str = "aggregator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Site,
    Aggregator,
}

/// A configured place we harvest from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Domain for sites, [`AGGREGATOR_SOURCE_ID`] for the aggregator.
    pub id: String,
    pub kind: SourceKind,
    pub root_url: String,
    pub discovered_sections: Vec<Section>,
    pub last_section_discovery: Option<DateTime<Utc>>,
}

/// A sub-section of a site (politics, economy, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub url: String,
    pub discovered_at: DateTime<Utc>,
}

/// A freshly harvested link with no confirmed metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub canonical_url: String,
    pub source_id: String,
    pub section: String,
    pub raw_title: String,
    pub raw_text: String,
    pub discovered_at: DateTime<Utc>,
    /// Date the source already told us about (aggregator feeds). Still raw:
    /// it must go through [`crate::dates::normalize_date`].
    pub date_hint: Option<RawDate>,
    /// Publisher domain when it differs from the link's host.
    pub publisher_domain: Option<String>,
}

/// Where a resolved publication date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateConfidence {
    /// Structured metadata: meta tags, embedded JSON-LD, feed dates.
    Authoritative,
    /// Heuristic, e.g. a date segment in the URL path.
    Fallback,
    /// Nothing found; the date is the day the item was seen.
    Unresolved,
}

/// A candidate after metadata resolution. Always carries a concrete date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedItem {
    pub canonical_url: String,
    pub source_id: String,
    pub section: String,
    pub title: String,
    #[serde(skip)]
    pub text: String,
    pub discovered_at: DateTime<Utc>,
    pub publication_date: NaiveDate,
    pub date_confidence: DateConfidence,
    pub domain: String,
}

/// A resolved item that matched at least one keyword and passed all filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(flatten)]
    pub item: ResolvedItem,
    pub matched_keywords: BTreeSet<String>,
    /// Human-friendly outlet name, e.g. `G1` or `FOLHA`.
    pub source_label: String,
}

impl Alert {
    pub fn new(item: ResolvedItem, matched_keywords: BTreeSet<String>) -> Self {
        let source_label = source_label(&item.domain);
        Self {
            item,
            matched_keywords,
            source_label,
        }
    }
}

/// A delivered alert, as remembered across cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub canonical_url: String,
    pub domain: String,
    pub title: String,
    pub notified_at: DateTime<Utc>,
    pub publication_date: NaiveDate,
    pub section: String,
}

impl HistoryEntry {
    pub fn from_alert(alert: &Alert, notified_at: DateTime<Utc>) -> Self {
        Self {
            canonical_url: alert.item.canonical_url.clone(),
            domain: alert.item.domain.clone(),
            title: alert.item.title.clone(),
            notified_at,
            publication_date: alert.item.publication_date,
            section: alert.item.section.clone(),
        }
    }
}

const KNOWN_OUTLETS: &[(&str, &str)] = &[
    ("g1.globo.com", "G1"),
    ("oglobo.globo.com", "O GLOBO"),
    ("folha.uol.com.br", "FOLHA"),
    ("www1.folha.uol.com.br", "FOLHA"),
    ("estadao.com.br", "ESTADÃO"),
    ("veja.abril.com.br", "VEJA"),
    ("noticias.uol.com.br", "UOL"),
    ("uol.com.br", "UOL"),
    ("cnnbrasil.com.br", "CNN BRASIL"),
    ("cnn.com.br", "CNN BRASIL"),
    ("oeste.com.br", "OESTE"),
];

/// Friendly outlet label for a domain.
///
/// Known outlets get their usual name; anything else falls back to the
/// first host label, uppercased (`poder360.com.br` -> `PODER360`).
pub fn source_label(domain: &str) -> String {
    let domain = domain.strip_prefix("www.").unwrap_or(domain);
    if let Some((_, label)) = KNOWN_OUTLETS.iter().find(|(d, _)| *d == domain) {
        return (*label).to_string();
    }
    domain
        .split('.')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(domain)
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> ResolvedItem {
        ResolvedItem {
            canonical_url: "https://g1.globo.com/politica/noticia/2025/06/19/stf.ghtml".into(),
            source_id: "g1.globo.com".into(),
            section: "politica".into(),
            title: "STF decide X".into(),
            text: "corpo".into(),
            discovered_at: Utc::now(),
            publication_date: NaiveDate::from_ymd_opt(2025, 6, 19).unwrap(),
            date_confidence: DateConfidence::Authoritative,
            domain: "g1.globo.com".into(),
        }
    }

    #[test]
    fn test_source_label_known_and_fallback() {
        assert_eq!(source_label("g1.globo.com"), "G1");
        assert_eq!(source_label("www.oeste.com.br"), "OESTE");
        assert_eq!(source_label("poder360.com.br"), "PODER360");
    }

    #[test]
    fn test_alert_serialization_flattens_item() {
        let alert = Alert::new(item(), BTreeSet::from(["STF".to_string()]));
        let json = serde_json::to_string(&alert).unwrap();
        assert!(json.contains("\"canonical_url\""));
        assert!(json.contains("\"date_confidence\":\"authoritative\""));
        assert!(json.contains("\"source_label\":\"G1\""));
        assert!(!json.contains("corpo"));
    }

    #[test]
    fn test_history_entry_from_alert() {
        let alert = Alert::new(item(), BTreeSet::new());
        let at = Utc::now();
        let entry = HistoryEntry::from_alert(&alert, at);
        assert_eq!(entry.canonical_url, alert.item.canonical_url);
        assert_eq!(entry.domain, "g1.globo.com");
        assert_eq!(entry.notified_at, at);
        assert_eq!(entry.section, "politica");
    }
}
