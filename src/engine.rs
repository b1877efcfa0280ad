//! The scan cycle.
//!
//! ```text
//!  sites ──► sections ──► links ──► resolve ─┐
//!                                            ├─► window ─► keywords ─► dedup ─► alerts
//!  aggregator ──► feed hits ──► resolve ─────┘
//! ```
//!
//! Each source runs in its own failure domain: whatever goes wrong inside it
//! ends up in its [`SourceStats`], never in another source's results. Sources
//! are driven with `buffered(worker_count)` on the calling task, so results
//! come back in configured order.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::{ConfigError, EngineConfig};
use crate::dedup::{DedupEngine, Decision};
use crate::fetch::PageFetcher;
use crate::filters::{KeywordMatcher, today_at_offset, within_window};
use crate::history::History;
use crate::models::{Alert, Candidate, ResolvedItem, Source, SourceKind};
use crate::scrapers::aggregator::harvest_keywords;
use crate::scrapers::article::{ResolveError, resolve_article, resolve_from_feed};
use crate::scrapers::links::{Harvest, harvest_links};
use crate::scrapers::sections::{
    CachedSections, DiscoveryFailure, DiscoveryOptions, SectionCache, discover_sections,
};

/// Per-source counters for one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub id: String,
    pub kind: SourceKind,
    pub sections: usize,
    /// Unique links (or feed hits) harvested.
    pub links: usize,
    /// Links skipped because History already has them.
    pub known: usize,
    pub resolved: usize,
    pub fetch_failures: usize,
    pub parse_failures: usize,
    pub blocked: bool,
    pub degraded: bool,
}

impl SourceStats {
    fn new(source: &Source) -> Self {
        Self {
            id: source.id.clone(),
            kind: source.kind,
            sections: 0,
            links: 0,
            known: 0,
            resolved: 0,
            fetch_failures: 0,
            parse_failures: 0,
            blocked: false,
            degraded: false,
        }
    }
}

/// Counters for a whole cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStats {
    pub ran_at: DateTime<Utc>,
    pub sources: Vec<SourceStats>,
    pub resolved: usize,
    /// Outside the recency window.
    pub stale: usize,
    /// Matched at least one keyword.
    pub matched: usize,
    /// Known URLs plus similar-title rejections.
    pub deduplicated: usize,
    /// Alerts handed to the caller for delivery. Confirmed deliveries are
    /// counted by [`crate::notify::DeliveryReport`].
    pub delivered: usize,
    pub fetch_failures: usize,
    pub parse_failures: usize,
    pub failed_keywords: Vec<String>,
}

impl CycleStats {
    pub fn blocked_sources(&self) -> Vec<&str> {
        self.sources.iter().filter(|s| s.blocked).map(|s| s.id.as_str()).collect()
    }

    pub fn degraded_sources(&self) -> Vec<&str> {
        self.sources.iter().filter(|s| s.degraded).map(|s| s.id.as_str()).collect()
    }

    pub fn source(&self, id: &str) -> Option<&SourceStats> {
        self.sources.iter().find(|s| s.id == id)
    }
}

/// What [`Engine::run_cycle`] returns.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub alerts: Vec<Alert>,
    pub stats: CycleStats,
}

/// Diagnostic view of one source, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDiagnostics {
    pub id: String,
    pub kind: SourceKind,
    pub sections: Vec<String>,
    /// Age of the cached section list in hours, if there is one.
    pub section_cache_age_hours: Option<i64>,
    pub blocked: bool,
    pub degraded: bool,
    pub last_links: Option<usize>,
}

struct SourceOutcome {
    stats: SourceStats,
    items: Vec<ResolvedItem>,
    refreshed: Option<CachedSections>,
    failed_keywords: Vec<String>,
}

impl SourceOutcome {
    fn new(source: &Source) -> Self {
        Self {
            stats: SourceStats::new(source),
            items: Vec::new(),
            refreshed: None,
            failed_keywords: Vec::new(),
        }
    }
}

/// The discovery and dedup engine.
///
/// Owns the section cache and the last cycle's stats. History is owned by
/// the caller: a cycle only reads it.
pub struct Engine<F> {
    fetcher: F,
    config: EngineConfig,
    sources: Vec<Source>,
    matcher: KeywordMatcher,
    dedup: DedupEngine,
    section_cache: SectionCache,
    last_stats: Option<CycleStats>,
}

impl<F: PageFetcher> Engine<F> {
    /// Build an engine; fails only for an invalid configuration.
    pub fn new(config: EngineConfig, fetcher: F) -> Result<Self, ConfigError> {
        config.validate()?;
        let matcher = KeywordMatcher::new(&config.keywords)
            .map_err(|e| ConfigError::Invalid(format!("keyword pattern: {e}")))?;
        let dedup = DedupEngine::new(config.similarity.build(), config.similarity_threshold);
        Ok(Self {
            fetcher,
            sources: config.sources(),
            matcher,
            dedup,
            section_cache: SectionCache::default(),
            last_stats: None,
            config,
        })
    }

    /// Restore state saved by a previous run.
    pub fn restore(&mut self, section_cache: SectionCache, last_stats: Option<CycleStats>) {
        self.section_cache = section_cache;
        self.last_stats = last_stats;
        self.sync_sources_with_cache();
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn section_cache(&self) -> &SectionCache {
        &self.section_cache
    }

    pub fn last_stats(&self) -> Option<&CycleStats> {
        self.last_stats.as_ref()
    }

    /// Run one discovery cycle and return the alerts that survived every
    /// filter. History is read, never written.
    #[instrument(level = "info", skip_all, fields(sources = self.sources.len()))]
    pub async fn run_cycle(&mut self, history: &History, now: DateTime<Utc>) -> CycleReport {
        let today = today_at_offset(now, self.config.utc_offset_minutes);

        let outcomes: Vec<(String, SourceOutcome)> = {
            let this = &*self;
            stream::iter(this.sources.iter())
                .map(move |source| async move {
                    (source.id.clone(), this.run_source(source, history, today, now).await)
                })
                .buffered(this.config.worker_count.max(1))
                .collect()
                .await
        };

        let mut stats = CycleStats {
            ran_at: now,
            sources: Vec::with_capacity(outcomes.len()),
            resolved: 0,
            stale: 0,
            matched: 0,
            deduplicated: 0,
            delivered: 0,
            fetch_failures: 0,
            parse_failures: 0,
            failed_keywords: Vec::new(),
        };
        let mut items = Vec::new();
        for (id, outcome) in outcomes {
            if let Some(entry) = outcome.refreshed {
                self.section_cache.insert(id, entry);
            }
            stats.resolved += outcome.stats.resolved;
            stats.deduplicated += outcome.stats.known;
            stats.fetch_failures += outcome.stats.fetch_failures;
            stats.parse_failures += outcome.stats.parse_failures;
            stats.failed_keywords.extend(outcome.failed_keywords);
            stats.sources.push(outcome.stats);
            items.extend(outcome.items);
        }
        self.sync_sources_with_cache();

        let alerts = self.select_alerts(items, history, today, &mut stats);
        stats.delivered = alerts.len();

        info!(
            alerts = stats.delivered,
            resolved = stats.resolved,
            stale = stats.stale,
            matched = stats.matched,
            deduplicated = stats.deduplicated,
            fetch_failures = stats.fetch_failures,
            blocked = ?stats.blocked_sources(),
            degraded = ?stats.degraded_sources(),
            "Cycle finished"
        );
        self.last_stats = Some(stats.clone());
        CycleReport { alerts, stats }
    }

    /// Window, then keywords, then dedup against History and earlier alerts
    /// of the same cycle.
    fn select_alerts(
        &self,
        items: Vec<ResolvedItem>,
        history: &History,
        today: NaiveDate,
        stats: &mut CycleStats,
    ) -> Vec<Alert> {
        let mut accepted: Vec<Alert> = Vec::new();
        for item in items {
            if !within_window(&item, today, self.config.recency_days) {
                stats.stale += 1;
                continue;
            }
            let keywords = self.matcher.matches(&item.title, &item.text);
            if keywords.is_empty() {
                continue;
            }
            stats.matched += 1;

            let alert = Alert::new(item, keywords);
            match self.dedup.check(&alert, history, &accepted) {
                Decision::Unique => accepted.push(alert),
                decision => {
                    debug!(url = %alert.item.canonical_url, ?decision, "Duplicate suppressed");
                    stats.deduplicated += 1;
                }
            }
        }
        accepted
    }

    async fn run_source(
        &self,
        source: &Source,
        history: &History,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> SourceOutcome {
        match source.kind {
            SourceKind::Site => self.run_site(source, history, today, now).await,
            SourceKind::Aggregator => self.run_aggregator(source, history, today, now).await,
        }
    }

    #[instrument(level = "info", skip_all, fields(source = %source.id))]
    async fn run_site(
        &self,
        source: &Source,
        history: &History,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> SourceOutcome {
        let mut out = SourceOutcome::new(source);
        let opts = DiscoveryOptions {
            markers: &self.config.section_markers,
            max_sections: self.config.max_sections,
            ttl: self.config.section_ttl(),
        };
        let discovery = discover_sections(
            &self.fetcher,
            &source.root_url,
            self.section_cache.get(&source.id),
            &opts,
            now,
        )
        .await;
        out.refreshed = discovery.refreshed;

        let mut sections = discovery.sections;
        match discovery.failure {
            Some(DiscoveryFailure::Blocked) => {
                warn!("Root page blocked; skipping source this cycle");
                out.stats.blocked = true;
                return out;
            }
            Some(DiscoveryFailure::Unreachable) => {
                // The root was just tried; only stale sections are left to harvest.
                out.stats.degraded = true;
                sections.retain(|s| s.url != source.root_url);
            }
            None => {}
        }
        out.stats.sections = sections.len();

        let mut seen = HashSet::new();
        let mut links: Vec<(String, String)> = Vec::new();
        for section in &sections {
            match harvest_links(&self.fetcher, &section.url, self.config.max_links_per_page).await {
                Harvest::Links(found) => {
                    for url in found {
                        if seen.insert(url.clone()) {
                            links.push((url, section.name.clone()));
                        }
                    }
                }
                Harvest::Blocked => {
                    out.stats.blocked = true;
                    break;
                }
                Harvest::Failed => out.stats.degraded = true,
            }
        }
        out.stats.links = links.len();

        let (known, fresh): (Vec<_>, Vec<_>) = links.into_iter().partition(|(url, _)| history.contains(url));
        out.stats.known = known.len();
        if out.stats.blocked && fresh.is_empty() {
            return out;
        }

        let attempted = fresh.len();
        let mut resolved = stream::iter(fresh)
            .map(move |(url, section)| {
                let candidate = Candidate {
                    canonical_url: url,
                    source_id: source.id.clone(),
                    section,
                    raw_title: String::new(),
                    raw_text: String::new(),
                    discovered_at: now,
                    date_hint: None,
                    publisher_domain: None,
                };
                resolve_article(&self.fetcher, candidate, today)
            })
            .buffered(self.config.fetch_concurrency.max(1));

        while let Some(result) = resolved.next().await {
            match result {
                Ok(item) => out.items.push(item),
                Err(ResolveError::Fetch(e)) => {
                    out.stats.fetch_failures += 1;
                    if e.is_blocked() {
                        warn!(error = %e, "Blocked while resolving articles; abandoning source");
                        out.stats.blocked = true;
                        break;
                    }
                    debug!(error = %e, "Article fetch failed");
                }
                Err(e @ ResolveError::Parse(_)) => {
                    out.stats.parse_failures += 1;
                    debug!(error = %e, "Article skipped");
                }
            }
        }
        out.stats.resolved = out.items.len();
        if attempted > 0 && out.stats.fetch_failures == attempted {
            out.stats.degraded = true;
        }

        info!(
            sections = out.stats.sections,
            links = out.stats.links,
            known = out.stats.known,
            resolved = out.stats.resolved,
            blocked = out.stats.blocked,
            degraded = out.stats.degraded,
            "Source finished"
        );
        out
    }

    #[instrument(level = "info", skip_all, fields(source = %source.id))]
    async fn run_aggregator(
        &self,
        source: &Source,
        history: &History,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> SourceOutcome {
        let mut out = SourceOutcome::new(source);
        let harvest = harvest_keywords(
            &self.fetcher,
            self.config.aggregator_keywords(),
            &self.config.aggregator_options(),
            now,
        )
        .await;

        out.stats.links = harvest.candidates.len();
        out.stats.blocked = harvest.blocked;
        out.stats.degraded = !harvest.failed_keywords.is_empty();
        out.stats.fetch_failures = harvest.failed_keywords.len();
        out.failed_keywords = harvest.failed_keywords;

        for candidate in harvest.candidates {
            if history.contains(&candidate.canonical_url) {
                out.stats.known += 1;
                continue;
            }
            out.items.push(resolve_from_feed(candidate, today));
        }
        out.stats.resolved = out.items.len();
        out
    }

    fn sync_sources_with_cache(&mut self) {
        for source in self.sources.iter_mut().filter(|s| s.kind == SourceKind::Site) {
            if let Some(entry) = self.section_cache.get(&source.id) {
                source.discovered_sections = entry.sections.clone();
                source.last_section_discovery = Some(entry.discovered_at);
            }
        }
    }

    /// Section-cache ages, block flags and last link counts per source.
    pub fn diagnostics(&self, now: DateTime<Utc>) -> Vec<SourceDiagnostics> {
        self.sources
            .iter()
            .map(|source| {
                let cached = self.section_cache.get(&source.id);
                let last = self.last_stats.as_ref().and_then(|s| s.source(&source.id));
                SourceDiagnostics {
                    id: source.id.clone(),
                    kind: source.kind,
                    sections: cached
                        .map(|c| c.sections.iter().map(|s| s.name.clone()).collect())
                        .unwrap_or_default(),
                    section_cache_age_hours: cached.map(|c| c.age(now).num_hours()),
                    blocked: last.is_some_and(|s| s.blocked),
                    degraded: last.is_some_and(|s| s.degraded),
                    last_links: last.map(|s| s.links),
                }
            })
            .collect()
    }
}
