//! Core type definitions for the cache system

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Answer of [`EntityCache::fetch_needed`](crate::cache::EntityCache::fetch_needed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchDecision {
    /// Neither the page nor all required properties are held
    Fetch,

    /// The authoritative page for the entity is cached
    PageCached,

    /// The page is not cached but the merged graph already holds every
    /// required property, trivially so when none are required
    GraphCovered,
}

impl FetchDecision {
    /// Whether a network round trip is needed
    pub fn needs_fetch(&self) -> bool {
        matches!(self, FetchDecision::Fetch)
    }

    /// Three-valued form: `Some(true)` fetch, `Some(false)` page cached,
    /// `None` covered by the graph
    pub fn as_tristate(&self) -> Option<bool> {
        match self {
            FetchDecision::Fetch => Some(true),
            FetchDecision::PageCached => Some(false),
            FetchDecision::GraphCovered => None,
        }
    }
}

impl fmt::Display for FetchDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchDecision::Fetch => write!(f, "fetch"),
            FetchDecision::PageCached => write!(f, "page_cached"),
            FetchDecision::GraphCovered => write!(f, "graph_covered"),
        }
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from a cached page document
    pub page_hits: u64,

    /// Lookups answered from the merged graph
    pub graph_hits: u64,

    /// Lookups that found nothing
    pub misses: u64,

    /// Pages inserted
    pub pages_added: u64,

    /// `add` calls dropped because the page was already present
    pub duplicate_adds: u64,

    /// Sweeps that ran to a decision
    pub sweeps: u64,

    /// Sweeps skipped because of loads in flight
    pub deferred_sweeps: u64,

    /// Pages removed by sweeps
    pub evicted_pages: u64,

    /// Pages currently cached
    pub pages: usize,

    /// Cached pages whose expansion failed
    pub failed_pages: usize,

    /// Statements in the merged graph
    pub triples: usize,
}

impl CacheStats {
    /// Share of lookups answered from memory, as a percentage
    pub fn hit_rate(&self) -> f64 {
        let hits = self.page_hits + self.graph_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }

    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ page_hits: {}, graph_hits: {}, misses: {}, hit_rate: {:.2}%, pages: {}, triples: {}, evicted: {} }}",
            self.page_hits,
            self.graph_hits,
            self.misses,
            self.hit_rate(),
            self.pages,
            self.triples,
            self.evicted_pages
        )
    }
}

/// Lock-free counters shared by the cache and its background tasks
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    pub page_hits: AtomicU64,
    pub graph_hits: AtomicU64,
    pub misses: AtomicU64,
    pub pages_added: AtomicU64,
    pub duplicate_adds: AtomicU64,
    pub sweeps: AtomicU64,
    pub deferred_sweeps: AtomicU64,
    pub evicted_pages: AtomicU64,
}

impl StatsRecorder {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self, pages: usize, failed_pages: usize, triples: usize) -> CacheStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CacheStats {
            page_hits: load(&self.page_hits),
            graph_hits: load(&self.graph_hits),
            misses: load(&self.misses),
            pages_added: load(&self.pages_added),
            duplicate_adds: load(&self.duplicate_adds),
            sweeps: load(&self.sweeps),
            deferred_sweeps: load(&self.deferred_sweeps),
            evicted_pages: load(&self.evicted_pages),
            pages,
            failed_pages,
            triples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_decision_tristate() {
        assert_eq!(FetchDecision::Fetch.as_tristate(), Some(true));
        assert_eq!(FetchDecision::PageCached.as_tristate(), Some(false));
        assert_eq!(FetchDecision::GraphCovered.as_tristate(), None);

        assert!(FetchDecision::Fetch.needs_fetch());
        assert!(!FetchDecision::PageCached.needs_fetch());
        assert!(!FetchDecision::GraphCovered.needs_fetch());
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            page_hits: 50,
            graph_hits: 30,
            misses: 20,
            ..Default::default()
        };

        assert_eq!(stats.hit_rate(), 80.0);
        assert_eq!(stats.miss_rate(), 20.0);
    }

    #[test]
    fn test_cache_stats_zero_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.miss_rate(), 100.0);
    }

    #[test]
    fn test_recorder_snapshot() {
        let recorder = StatsRecorder::default();
        StatsRecorder::bump(&recorder.page_hits);
        StatsRecorder::bump(&recorder.misses);
        StatsRecorder::add(&recorder.evicted_pages, 3);

        let stats = recorder.snapshot(2, 1, 10);
        assert_eq!(stats.page_hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evicted_pages, 3);
        assert_eq!(stats.pages, 2);
        assert_eq!(stats.failed_pages, 1);
        assert_eq!(stats.triples, 10);

        let display = stats.to_string();
        assert!(display.contains("page_hits: 1"));
        assert!(display.contains("hit_rate: 50.00%"));
    }
}
