//! Delivered-alert memory shared across cycles.
//!
//! [`History`] is the single owner of "what was already sent". The engine only
//! reads it during a cycle; [`crate::notify::deliver_alerts`] is the one place
//! that writes, and only after a delivery is confirmed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::HistoryEntry;

pub const DEFAULT_CAPACITY: usize = 1000;

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

/// Bounded map of canonical URL to [`HistoryEntry`].
///
/// When full, recording a new URL evicts the entry with the oldest
/// `notified_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    #[serde(default = "default_capacity")]
    capacity: usize,
    #[serde(default)]
    entries: HashMap<String, HistoryEntry>,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, canonical_url: &str) -> bool {
        self.entries.contains_key(canonical_url)
    }

    pub fn get(&self, canonical_url: &str) -> Option<&HistoryEntry> {
        self.entries.get(canonical_url)
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.values()
    }

    /// Entries whose item lives on `domain`.
    pub fn entries_for_domain<'a>(&'a self, domain: &'a str) -> impl Iterator<Item = &'a HistoryEntry> {
        self.entries.values().filter(move |e| e.domain == domain)
    }

    /// Store `entry`, returning the entry evicted to make room, if any.
    ///
    /// Re-recording a known URL replaces it in place and never evicts.
    pub fn record(&mut self, entry: HistoryEntry) -> Option<HistoryEntry> {
        let evicted = if !self.contains(&entry.canonical_url) && self.entries.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };
        self.entries.insert(entry.canonical_url.clone(), entry);
        evicted
    }

    /// Remove everything; returns how many entries were dropped.
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    /// Drop entries notified before `cutoff`; returns how many were dropped.
    pub fn prune_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.notified_at >= cutoff);
        before - self.entries.len()
    }

    /// Change the capacity, evicting oldest entries if the map is now over it.
    pub fn set_capacity(&mut self, capacity: usize) -> Vec<HistoryEntry> {
        self.capacity = capacity.max(1);
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            match self.evict_oldest() {
                Some(e) => evicted.push(e),
                None => break,
            }
        }
        evicted
    }

    fn evict_oldest(&mut self) -> Option<HistoryEntry> {
        let oldest = self
            .entries
            .values()
            .min_by(|a, b| {
                a.notified_at
                    .cmp(&b.notified_at)
                    .then_with(|| a.canonical_url.cmp(&b.canonical_url))
            })?
            .canonical_url
            .clone();
        self.entries.remove(&oldest)
    }
}
