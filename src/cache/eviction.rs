//! Sweep outcomes
//!
//! A sweep either evicts the pages not read within the expiration window,
//! finds nothing to do, or backs off because evicting now could drop data
//! from a load that is still merging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a sweep decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SweepOutcome {
    /// Expired pages were removed and the master graph rebuilt
    Evicted,

    /// Every page was used within the window
    NothingExpired,

    /// At least one page was still loading
    DeferredWhileLoading,

    /// A page finished merging while the replacement graph was built
    DeferredConcurrentMerge,

    /// Another sweep held the sweep guard
    AlreadyRunning,
}

impl SweepOutcome {
    /// True when the sweep backed off without deciding
    pub fn is_deferred(&self) -> bool {
        matches!(
            self,
            SweepOutcome::DeferredWhileLoading
                | SweepOutcome::DeferredConcurrentMerge
                | SweepOutcome::AlreadyRunning
        )
    }
}

impl std::fmt::Display for SweepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SweepOutcome::Evicted => write!(f, "evicted expired pages"),
            SweepOutcome::NothingExpired => write!(f, "nothing expired"),
            SweepOutcome::DeferredWhileLoading => write!(f, "deferred: pages still loading"),
            SweepOutcome::DeferredConcurrentMerge => write!(f, "deferred: concurrent merge"),
            SweepOutcome::AlreadyRunning => write!(f, "skipped: sweep already running"),
        }
    }
}

/// Result of one sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub outcome: SweepOutcome,

    /// When the sweep ran
    pub timestamp: DateTime<Utc>,

    /// Keys of the evicted pages
    pub evicted: Vec<String>,

    /// Pages left in the cache
    pub kept: usize,
}

impl SweepReport {
    pub fn new(outcome: SweepOutcome, timestamp: DateTime<Utc>) -> Self {
        Self {
            outcome,
            timestamp,
            evicted: Vec::new(),
            kept: 0,
        }
    }

    pub fn with_kept(mut self, kept: usize) -> Self {
        self.kept = kept;
        self
    }

    pub fn with_evicted(mut self, evicted: Vec<String>) -> Self {
        self.evicted = evicted;
        self
    }
}

impl std::fmt::Display for SweepReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (evicted {}, kept {})",
            self.outcome,
            self.evicted.len(),
            self.kept
        )
    }
}
