//! Allocation Recorder - per-user decision-path histogram.

use crate::record::DecisionPath;

/// Counts of which allocator branch fired, for one user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocationRecorder {
    /// Indexed by [`DecisionPath::counter_slot`]
    counts: [u64; DecisionPath::COUNTED.len()],
    cache_hits: u64,
    skipped: u64,
    num_queries: u64,
}

impl AllocationRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one allocation.
    #[inline]
    pub fn record(&mut self, path: DecisionPath) {
        self.num_queries += 1;
        match path.counter_slot() {
            Some(slot) => self.counts[slot] += 1,
            None => self.cache_hits += 1,
        }
    }

    /// Record a timeline entry that produced no allocation.
    #[inline]
    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    /// Occurrences of a path.
    pub fn count(&self, path: DecisionPath) -> u64 {
        match path.counter_slot() {
            Some(slot) => self.counts[slot],
            None => self.cache_hits,
        }
    }

    /// Counts in stats-file column order.
    pub fn step_counts(&self) -> [u64; DecisionPath::COUNTED.len()] {
        self.counts
    }

    /// Allocations written to the user's workload file.
    pub fn num_queries(&self) -> u64 {
        self.num_queries
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Allocations that came from an unconstrained random pick.
    pub fn unconstrained(&self) -> u64 {
        DecisionPath::COUNTED
            .iter()
            .filter(|p| p.is_unconstrained())
            .map(|&p| self.count(p))
            .sum()
    }
}
