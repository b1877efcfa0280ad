//! Relevance and recency filters applied to resolved items.

use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use itertools::Itertools;
use regex::Regex;

use crate::models::{DateConfidence, ResolvedItem};

/// Whole-word, case-insensitive keyword matcher.
///
/// Word boundaries are Unicode-aware: `ação` does not match inside
/// `ações`, and `STF` does not match inside `STFX`.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    patterns: Vec<(String, Regex)>,
}

impl KeywordMatcher {
    /// Compile `keywords` once. Blank entries and case-insensitive repeats
    /// are dropped; the first spelling wins.
    pub fn new<I, S>(keywords: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .unique_by(|k| k.to_lowercase())
            .map(|k| {
                let re = Regex::new(&format!(r"(?i)(?:^|\W){}(?:\W|$)", regex::escape(&k)))?;
                Ok((k, re))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { patterns })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Keywords found in the title or body, in their configured spelling.
    pub fn matches(&self, title: &str, text: &str) -> BTreeSet<String> {
        self.patterns
            .iter()
            .filter(|(_, re)| re.is_match(title) || re.is_match(text))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

/// Calendar date of `now` at a fixed UTC offset.
pub fn today_at_offset(now: DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDate {
    match FixedOffset::east_opt(utc_offset_minutes * 60) {
        Some(offset) => now.with_timezone(&offset).date_naive(),
        None => now.date_naive(),
    }
}

/// Keep items published at most `days` days before `today`.
///
/// Unresolved dates are kept: they stand for "seen today". Future dates are
/// kept as well.
pub fn within_window(item: &ResolvedItem, today: NaiveDate, days: u32) -> bool {
    if item.date_confidence == DateConfidence::Unresolved {
        return true;
    }
    (today - item.publication_date).num_days() <= i64::from(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn item(date: NaiveDate, confidence: DateConfidence) -> ResolvedItem {
        ResolvedItem {
            canonical_url: "https://g1.globo.com/politica/noticia/x.ghtml".into(),
            source_id: "g1.globo.com".into(),
            section: "politica".into(),
            title: "T".into(),
            text: String::new(),
            discovered_at: Utc::now(),
            publication_date: date,
            date_confidence: confidence,
            domain: "g1.globo.com".into(),
        }
    }

    #[test]
    fn test_whole_word_case_insensitive() {
        let m = KeywordMatcher::new(["STF", "Lula"]).unwrap();
        assert_eq!(
            m.matches("stf julga recurso", "O presidente LULA disse"),
            BTreeSet::from(["STF".to_string(), "Lula".to_string()])
        );
        assert!(m.matches("STFX anuncia", "Lulalândia").is_empty());
    }

    #[test]
    fn test_unicode_boundaries() {
        let m = KeywordMatcher::new(["ação"]).unwrap();
        assert_eq!(m.matches("Ação do governo", "").len(), 1);
        assert!(m.matches("ações do governo", "").is_empty());
        assert!(m.matches("reação", "").is_empty());
    }

    #[test]
    fn test_punctuated_keyword() {
        let m = KeywordMatcher::new(["PL 2630", "C++"]).unwrap();
        assert_eq!(m.matches("Câmara vota PL 2630.", "").len(), 1);
        assert_eq!(m.matches("", "escrito em C++, o sistema").len(), 1);
    }

    #[test]
    fn test_empty_inputs_and_blank_keywords() {
        let m = KeywordMatcher::new(["", "  ", "STF", "stf"]).unwrap();
        assert_eq!(m.len(), 1);
        assert!(m.matches("", "").is_empty());
        assert!(KeywordMatcher::new(Vec::<String>::new()).unwrap().is_empty());
    }

    #[test]
    fn test_window_boundary() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 20).unwrap();
        let three = item(today - Duration::days(3), DateConfidence::Authoritative);
        let four = item(today - Duration::days(4), DateConfidence::Authoritative);
        assert!(within_window(&three, today, 3));
        assert!(!within_window(&four, today, 3));
    }

    #[test]
    fn test_window_keeps_unresolved_and_future() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 20).unwrap();
        let old_unresolved = item(today - Duration::days(30), DateConfidence::Unresolved);
        let future = item(today + Duration::days(1), DateConfidence::Fallback);
        assert!(within_window(&old_unresolved, today, 3));
        assert!(within_window(&future, today, 3));
    }

    #[test]
    fn test_today_at_offset() {
        let now = Utc.with_ymd_and_hms(2025, 6, 20, 1, 30, 0).unwrap();
        assert_eq!(today_at_offset(now, 0), NaiveDate::from_ymd_opt(2025, 6, 20).unwrap());
        assert_eq!(today_at_offset(now, -180), NaiveDate::from_ymd_opt(2025, 6, 19).unwrap());
    }
}
