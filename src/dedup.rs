//! Duplicate suppression against History and the current cycle.
//!
//! A candidate is a duplicate when its URL was already seen, or when an item
//! on the *same domain* has a similar enough title. Different outlets
//! covering the same story are never collapsed into one alert.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::history::History;
use crate::models::Alert;
use crate::utils::collapse_whitespace;

/// A title similarity score in `[0, 1]`.
pub trait TitleSimilarity: fmt::Debug + Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Token-set overlap coefficient: `|A∩B| / min(|A|, |B|)`.
///
/// Very short titles make the overlap coefficient too eager (a two-word
/// title is "contained" in half the headlines of the day), so when the
/// shorter side has fewer than [`TokenOverlap::MIN_TOKENS`] tokens the
/// Jaccard index is used instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenOverlap;

impl TokenOverlap {
    pub const MIN_TOKENS: usize = 3;
}

fn tokens(s: &str) -> HashSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl TitleSimilarity for TokenOverlap {
    fn score(&self, a: &str, b: &str) -> f64 {
        let (ta, tb) = (tokens(a), tokens(b));
        let shorter = ta.len().min(tb.len());
        if shorter == 0 {
            return 0.0;
        }
        let common = ta.intersection(&tb).count() as f64;
        if shorter < Self::MIN_TOKENS {
            common / ta.union(&tb).count() as f64
        } else {
            common / shorter as f64
        }
    }
}

/// Normalized Levenshtein similarity on lowercased titles.
#[derive(Debug, Clone, Copy, Default)]
pub struct Levenshtein;

impl TitleSimilarity for Levenshtein {
    fn score(&self, a: &str, b: &str) -> f64 {
        let (a, b) = (collapse_whitespace(&a.to_lowercase()), collapse_whitespace(&b.to_lowercase()));
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        strsim::normalized_levenshtein(&a, &b)
    }
}

/// Configurable choice of [`TitleSimilarity`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityKind {
    #[default]
    TokenOverlap,
    Levenshtein,
}

impl SimilarityKind {
    pub fn build(self) -> Box<dyn TitleSimilarity> {
        match self {
            SimilarityKind::TokenOverlap => Box::new(TokenOverlap),
            SimilarityKind::Levenshtein => Box::new(Levenshtein),
        }
    }
}

/// Outcome of a dedup check.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Unique,
    /// The canonical URL is in History or was accepted earlier this cycle.
    KnownUrl,
    /// A same-domain item has a title scoring at or above the threshold.
    SimilarTitle { matched_url: String, score: f64 },
}

impl Decision {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, Decision::Unique)
    }
}

#[derive(Debug)]
pub struct DedupEngine {
    similarity: Box<dyn TitleSimilarity>,
    threshold: f64,
}

impl DedupEngine {
    pub fn new(similarity: Box<dyn TitleSimilarity>, threshold: f64) -> Self {
        Self { similarity, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Decide whether `alert` duplicates History or an alert already accepted
    /// this cycle. Never writes anything.
    pub fn check(&self, alert: &Alert, history: &History, accepted: &[Alert]) -> Decision {
        let url = &alert.item.canonical_url;
        if history.contains(url) || accepted.iter().any(|a| &a.item.canonical_url == url) {
            return Decision::KnownUrl;
        }

        let domain = alert.item.domain.as_str();
        let seen = history
            .entries_for_domain(domain)
            .map(|e| (e.canonical_url.as_str(), e.title.as_str()))
            .chain(
                accepted
                    .iter()
                    .filter(|a| a.item.domain == domain)
                    .map(|a| (a.item.canonical_url.as_str(), a.item.title.as_str())),
            );

        for (other_url, other_title) in seen {
            let score = self.similarity.score(&alert.item.title, other_title);
            if score >= self.threshold {
                return Decision::SimilarTitle {
                    matched_url: other_url.to_string(),
                    score,
                };
            }
        }
        Decision::Unique
    }
}
