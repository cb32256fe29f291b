use log::info;

/// Counters for one top-level book computation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Leaf positions evaluated. Also the logical clock for cache recency.
    pub leaves: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_stores: u64,
    pub evictions: u64,
    /// Aggregation steps that left a reachable sibling with no estimated gain.
    pub zero_estimates: u64,
}

impl RunStats {
    pub fn record_leaf(&mut self) {
        self.leaves += 1;
        if self.leaves % 1000 == 0 {
            info!("Evaluated {} leaf positions", self.leaves);
        }
    }

    pub fn log_summary(&self) {
        info!(
            "Leaves: {}, cache hits: {}, misses: {}, stores: {}, evicted: {}",
            self.leaves, self.cache_hits, self.cache_misses, self.cache_stores, self.evictions
        );

        if self.zero_estimates > 0 {
            info!("Steps with zero estimated gain: {}", self.zero_estimates);
        }
    }
}
