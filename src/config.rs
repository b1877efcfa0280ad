//! Engine configuration, loaded from YAML.
//!
//! Every field has a default, so a config file only needs `sites` and
//! `keywords`:
//!
//! ```yaml
//! sites:
//!   - url: https://g1.globo.com/
//!   - url: https://www.oeste.com.br/
//!     enabled: false
//! keywords: [STF, Lula, "reforma tributária"]
//! aggregator:
//!   enabled: true
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::dedup::SimilarityKind;
use crate::fetch::DEFAULT_USER_AGENT;
use crate::models::{AGGREGATOR_SOURCE_ID, Source, SourceKind};
use crate::scrapers::aggregator::AggregatorOptions;
use crate::utils::domain_of;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub url: String,
    #[serde(default = "yes")]
    pub enabled: bool,
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub enabled: bool,
    /// Search terms; empty means "use the engine keywords".
    pub keywords: Vec<String>,
    pub hl: String,
    pub gl: String,
    pub ceid: String,
    pub base_url: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keywords: Vec::new(),
            hl: "pt-BR".into(),
            gl: "BR".into(),
            ceid: "BR:pt-419".into(),
            base_url: "https://news.google.com/rss/search".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sites: Vec<SiteConfig>,
    pub keywords: Vec<String>,
    pub aggregator: AggregatorConfig,
    pub section_markers: Vec<String>,
    pub max_sections: usize,
    pub section_ttl_days: i64,
    pub max_links_per_page: usize,
    pub request_timeout_secs: u64,
    pub recency_days: u32,
    pub similarity: SimilarityKind,
    pub similarity_threshold: f64,
    pub history_capacity: usize,
    pub history_retention_days: i64,
    pub worker_count: usize,
    pub fetch_concurrency: usize,
    pub utc_offset_minutes: i32,
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sites: Vec::new(),
            keywords: Vec::new(),
            aggregator: AggregatorConfig::default(),
            section_markers: ["politica", "economia", "brasil", "mundo", "poder", "mercado"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_sections: 6,
            section_ttl_days: 7,
            max_links_per_page: 20,
            request_timeout_secs: 15,
            recency_days: 3,
            similarity: SimilarityKind::TokenOverlap,
            similarity_threshold: 0.90,
            history_capacity: 1000,
            history_retention_days: 30,
            worker_count: 4,
            fetch_concurrency: 4,
            utc_offset_minutes: 0,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML config file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Reject configurations that can never produce a useful cycle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return invalid("no keywords configured".into());
        }
        for site in &self.sites {
            match Url::parse(&site.url) {
                Ok(u) if matches!(u.scheme(), "http" | "https") && u.host_str().is_some() => {}
                _ => return invalid(format!("site url {:?} is not an absolute http(s) URL", site.url)),
            }
        }
        // Sources, section cache entries and stats are keyed by domain.
        let mut domains = HashSet::new();
        for site in self.sites.iter().filter(|s| s.enabled) {
            if let Some(domain) = domain_of(&site.url) {
                if !domains.insert(domain.clone()) {
                    return invalid(format!("more than one enabled site on domain {domain}"));
                }
            }
        }
        if self.sites.iter().all(|s| !s.enabled) && !self.aggregator.enabled {
            return invalid("no enabled sources: enable a site or the aggregator".into());
        }
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return invalid(format!(
                "similarity_threshold must be in (0, 1], got {}",
                self.similarity_threshold
            ));
        }
        let limits = [
            ("max_sections", self.max_sections),
            ("max_links_per_page", self.max_links_per_page),
            ("history_capacity", self.history_capacity),
            ("worker_count", self.worker_count),
            ("fetch_concurrency", self.fetch_concurrency),
            ("request_timeout_secs", self.request_timeout_secs as usize),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, v)| *v == 0) {
            return invalid(format!("{name} must be greater than zero"));
        }
        if self.section_ttl_days < 0 || self.history_retention_days < 0 {
            return invalid("day counts must not be negative".into());
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn section_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.section_ttl_days)
    }

    pub fn history_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.history_retention_days)
    }

    /// Configured sources in order: enabled sites, then the aggregator.
    ///
    /// Root URLs come back in parsed form (`https://g1.globo.com` becomes
    /// `https://g1.globo.com/`), matching the section URLs derived from them.
    pub fn sources(&self) -> Vec<Source> {
        let sites = self.sites.iter().filter(|s| s.enabled).filter_map(|s| {
            let root = Url::parse(&s.url).ok()?;
            Some(Source {
                id: domain_of(root.as_str())?,
                kind: SourceKind::Site,
                root_url: root.to_string(),
                discovered_sections: Vec::new(),
                last_section_discovery: None,
            })
        });
        let aggregator = self.aggregator.enabled.then(|| Source {
            id: AGGREGATOR_SOURCE_ID.to_string(),
            kind: SourceKind::Aggregator,
            root_url: self.aggregator.base_url.clone(),
            discovered_sections: Vec::new(),
            last_section_discovery: None,
        });
        sites.chain(aggregator).collect()
    }

    /// Terms sent to the aggregator.
    pub fn aggregator_keywords(&self) -> &[String] {
        if self.aggregator.keywords.is_empty() {
            &self.keywords
        } else {
            &self.aggregator.keywords
        }
    }

    pub fn aggregator_options(&self) -> AggregatorOptions {
        AggregatorOptions {
            base_url: self.aggregator.base_url.clone(),
            hl: self.aggregator.hl.clone(),
            gl: self.aggregator.gl.clone(),
            ceid: self.aggregator.ceid.clone(),
            recency_days: self.recency_days,
            max_links: self.max_links_per_page,
            concurrency: self.fetch_concurrency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
sites:
  - url: https://g1.globo.com/
  - url: https://www.oeste.com.br/
    enabled: false
keywords: [STF, Lula]
"#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let c = EngineConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(c.max_sections, 6);
        assert_eq!(c.recency_days, 3);
        assert_eq!(c.similarity, SimilarityKind::TokenOverlap);
        assert_eq!(c.similarity_threshold, 0.90);
        assert_eq!(c.history_capacity, 1000);
        assert_eq!(c.section_markers.len(), 6);
        assert!(c.aggregator.enabled);
        assert_eq!(c.aggregator_keywords(), &["STF".to_string(), "Lula".to_string()][..]);
    }

    #[test]
    fn test_sources_keep_order_and_skip_disabled() {
        let c = EngineConfig::from_yaml(MINIMAL).unwrap();
        let sources = c.sources();
        let ids: Vec<&str> = sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["g1.globo.com", AGGREGATOR_SOURCE_ID]);
        assert_eq!(sources[1].kind, SourceKind::Aggregator);
    }

    #[test]
    fn test_site_roots_are_normalized() {
        let c = EngineConfig::from_yaml("keywords: [STF]\nsites: [{url: 'https://g1.globo.com'}]").unwrap();
        assert_eq!(c.sources()[0].root_url, "https://g1.globo.com/");
    }

    #[test]
    fn test_two_enabled_sites_on_one_domain_are_rejected() {
        let yaml = r#"
keywords: [STF]
sites:
  - url: https://g1.globo.com/
  - url: https://g1.globo.com/politica/
"#;
        assert!(matches!(EngineConfig::from_yaml(yaml), Err(ConfigError::Invalid(_))));

        let disabled = format!("{yaml}    enabled: false\n");
        assert!(EngineConfig::from_yaml(&disabled).is_ok());
    }

    #[test]
    fn test_overrides() {
        let yaml = r#"
keywords: [STF]
sites: [{url: "https://g1.globo.com/"}]
similarity: levenshtein
similarity_threshold: 0.8
aggregator: {enabled: false, hl: en-US}
"#;
        let c = EngineConfig::from_yaml(yaml).unwrap();
        assert_eq!(c.similarity, SimilarityKind::Levenshtein);
        assert_eq!(c.similarity_threshold, 0.8);
        assert!(!c.aggregator.enabled);
        assert_eq!(c.aggregator.gl, "BR");
    }

    #[test]
    fn test_hard_failures() {
        let cases = [
            "sites: [{url: 'https://g1.globo.com/'}]",
            "keywords: ['  ']\nsites: [{url: 'https://g1.globo.com/'}]",
            "keywords: [STF]\naggregator: {enabled: false}",
            "keywords: [STF]\nsites: [{url: 'g1.globo.com'}]",
            "keywords: [STF]\nsimilarity_threshold: 1.5",
            "keywords: [STF]\nsimilarity_threshold: 0",
            "keywords: [STF]\nworker_count: 0",
        ];
        for yaml in cases {
            assert!(
                matches!(EngineConfig::from_yaml(yaml), Err(ConfigError::Invalid(_))),
                "expected invalid: {yaml}"
            );
        }
        assert!(matches!(EngineConfig::from_yaml("keywords: {"), Err(ConfigError::Yaml(_))));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = EngineConfig::load("/nonexistent/news_sentry.yaml").await.unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
