//! Section discovery for site roots.
//!
//! A site's home page links to its sections (`/politica/`, `/economia/`, ...).
//! We look for configured path markers among those links and cache the result
//! per domain for a TTL, because section layouts change rarely and fetching
//! the root every cycle wastes the fetch budget.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::fetch::{FetchError, PageFetcher};
use crate::models::Section;

static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));

/// Name given to the site root in every section list.
pub const ROOT_SECTION: &str = "principal";

/// Sections remembered for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSections {
    pub sections: Vec<Section>,
    pub discovered_at: DateTime<Utc>,
}

impl CachedSections {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.discovered_at
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) < ttl
    }
}

/// Domain-keyed, time-bounded memo of discovered sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionCache {
    entries: HashMap<String, CachedSections>,
}

impl SectionCache {
    pub fn get(&self, domain: &str) -> Option<&CachedSections> {
        self.entries.get(domain)
    }

    pub fn insert(&mut self, domain: impl Into<String>, entry: CachedSections) {
        self.entries.insert(domain.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Settings for one discovery pass.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions<'a> {
    pub markers: &'a [String],
    pub max_sections: usize,
    pub ttl: Duration,
}

/// Result of [`discover_sections`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub sections: Vec<Section>,
    /// New cache entry to store, when a fresh discovery succeeded.
    pub refreshed: Option<CachedSections>,
    /// The root page could not be fetched; sections came from fallback.
    pub failure: Option<DiscoveryFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryFailure {
    Blocked,
    Unreachable,
}

/// Find the sections of `root_url`, using `cached` while it is fresh.
///
/// Never fails: on any error it returns the stale cached sections if there
/// are some, otherwise just the root. Failed attempts are not cached, so the
/// next cycle tries again.
#[instrument(level = "info", skip_all, fields(root = %root_url))]
pub async fn discover_sections<F: PageFetcher>(
    fetcher: &F,
    root_url: &str,
    cached: Option<&CachedSections>,
    opts: &DiscoveryOptions<'_>,
    now: DateTime<Utc>,
) -> Discovery {
    if let Some(entry) = cached.filter(|c| c.is_fresh(now, opts.ttl)) {
        debug!(count = entry.sections.len(), "Using cached sections");
        return Discovery {
            sections: entry.sections.clone(),
            refreshed: None,
            failure: None,
        };
    }

    let fallback = |failure| Discovery {
        sections: cached
            .map(|c| c.sections.clone())
            .unwrap_or_else(|| vec![root_section(root_url, now)]),
        refreshed: None,
        failure: Some(failure),
    };

    let page = match fetcher.fetch(root_url).await {
        Ok(page) => page,
        Err(e) => {
            warn!(error = %e, "Section discovery failed; falling back");
            let failure = match e {
                FetchError::Blocked { .. } => DiscoveryFailure::Blocked,
                _ => DiscoveryFailure::Unreachable,
            };
            return fallback(failure);
        }
    };

    let Ok(base) = Url::parse(root_url) else {
        warn!("Root URL does not parse; falling back");
        return fallback(DiscoveryFailure::Unreachable);
    };
    let sections = extract_sections(&page.body, &base, opts, now);
    info!(count = sections.len(), "Discovered sections");

    Discovery {
        refreshed: Some(CachedSections {
            sections: sections.clone(),
            discovered_at: now,
        }),
        sections,
        failure: None,
    }
}

fn root_section(root_url: &str, now: DateTime<Utc>) -> Section {
    Section {
        name: ROOT_SECTION.to_string(),
        url: root_url.to_string(),
        discovered_at: now,
    }
}

/// Pick section URLs out of a root page. The root always comes first.
pub fn extract_sections(
    html: &str,
    base: &Url,
    opts: &DiscoveryOptions<'_>,
    now: DateTime<Utc>,
) -> Vec<Section> {
    let document = Html::parse_document(html);
    let host = base.host_str().unwrap_or_default();

    let found = document
        .select(&ANCHORS)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .filter(|u| u.host_str() == Some(host))
        .filter_map(|u| {
            let first = u.path_segments()?.find(|s| !s.is_empty())?.to_lowercase();
            let marker = opts.markers.iter().find(|m| m.eq_ignore_ascii_case(&first))?;
            let mut section_url = u.clone();
            section_url.set_path(&format!("/{first}/"));
            section_url.set_query(None);
            section_url.set_fragment(None);
            Some(Section {
                name: marker.to_lowercase(),
                url: section_url.to_string(),
                discovered_at: now,
            })
        })
        .unique_by(|s| s.url.clone());

    std::iter::once(root_section(base.as_str(), now))
        .chain(found)
        .take(opts.max_sections.max(1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{Canned, StaticFetcher};

    const ROOT: &str = "https://www.oeste.com.br/";

    fn markers() -> Vec<String> {
        ["politica", "economia", "mundo"].iter().map(|s| s.to_string()).collect()
    }

    fn home() -> String {
        r#"<html><body>
            <a href="/politica/">Política</a>
            <a href="/politica/stf-decide-algo-importante/">matéria</a>
            <a href="https://www.oeste.com.br/economia">Economia</a>
            <a href="/Mundo/#top">Mundo</a>
            <a href="/esportes/">Esportes</a>
            <a href="https://outro.com.br/politica/">fora</a>
        </body></html>"#
            .to_string()
    }

    #[tokio::test]
    async fn test_discovers_marker_sections_after_root() {
        let fetcher = StaticFetcher::new().page(ROOT, home());
        let markers = markers();
        let opts = DiscoveryOptions { markers: &markers, max_sections: 6, ttl: Duration::days(7) };
        let now = Utc::now();

        let d = discover_sections(&fetcher, ROOT, None, &opts, now).await;
        let urls: Vec<&str> = d.sections.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.oeste.com.br/",
                "https://www.oeste.com.br/politica/",
                "https://www.oeste.com.br/economia/",
                "https://www.oeste.com.br/mundo/",
            ]
        );
        assert_eq!(d.sections[0].name, ROOT_SECTION);
        assert_eq!(d.sections[1].name, "politica");
        assert!(d.refreshed.is_some());
        assert!(d.failure.is_none());
    }

    #[tokio::test]
    async fn test_cap_includes_root() {
        let fetcher = StaticFetcher::new().page(ROOT, home());
        let markers = markers();
        let opts = DiscoveryOptions { markers: &markers, max_sections: 2, ttl: Duration::days(7) };
        let d = discover_sections(&fetcher, ROOT, None, &opts, Utc::now()).await;
        assert_eq!(d.sections.len(), 2);
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_fetch() {
        let fetcher = StaticFetcher::new().page(ROOT, home());
        let markers = markers();
        let opts = DiscoveryOptions { markers: &markers, max_sections: 6, ttl: Duration::days(7) };
        let now = Utc::now();
        let cached = CachedSections {
            sections: vec![root_section(ROOT, now)],
            discovered_at: now - Duration::days(6),
        };
        let d = discover_sections(&fetcher, ROOT, Some(&cached), &opts, now).await;
        assert_eq!(d.sections.len(), 1);
        assert!(d.refreshed.is_none());
        assert_eq!(fetcher.hit_count(ROOT), 0);
    }

    #[tokio::test]
    async fn test_stale_cache_is_refreshed() {
        let fetcher = StaticFetcher::new().page(ROOT, home());
        let markers = markers();
        let opts = DiscoveryOptions { markers: &markers, max_sections: 6, ttl: Duration::days(7) };
        let now = Utc::now();
        let cached = CachedSections {
            sections: vec![root_section(ROOT, now)],
            discovered_at: now - Duration::days(8),
        };
        let d = discover_sections(&fetcher, ROOT, Some(&cached), &opts, now).await;
        assert_eq!(d.sections.len(), 4);
        assert_eq!(d.refreshed.map(|r| r.discovered_at), Some(now));
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_root() {
        let fetcher = StaticFetcher::new().canned(ROOT, Canned::Timeout);
        let markers = markers();
        let opts = DiscoveryOptions { markers: &markers, max_sections: 6, ttl: Duration::days(7) };
        let d = discover_sections(&fetcher, ROOT, None, &opts, Utc::now()).await;
        assert_eq!(d.sections.len(), 1);
        assert_eq!(d.sections[0].url, ROOT);
        assert!(d.refreshed.is_none());
        assert_eq!(d.failure, Some(DiscoveryFailure::Unreachable));
    }

    #[tokio::test]
    async fn test_blocked_root_uses_stale_cache() {
        let fetcher = StaticFetcher::new().canned(ROOT, Canned::Blocked);
        let markers = markers();
        let opts = DiscoveryOptions { markers: &markers, max_sections: 6, ttl: Duration::days(7) };
        let now = Utc::now();
        let stale = CachedSections {
            sections: vec![
                root_section(ROOT, now),
                Section {
                    name: "politica".into(),
                    url: "https://www.oeste.com.br/politica/".into(),
                    discovered_at: now - Duration::days(30),
                },
            ],
            discovered_at: now - Duration::days(30),
        };
        let d = discover_sections(&fetcher, ROOT, Some(&stale), &opts, now).await;
        assert_eq!(d.sections.len(), 2);
        assert_eq!(d.failure, Some(DiscoveryFailure::Blocked));
    }
}
