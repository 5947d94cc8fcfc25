//! Simulation statistics.
//!
//! Counters kept per processor and incremented inline by the execution and
//! memory paths. Reset clears them together with the architectural state.

/// Per-processor counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcStats {
    pub instructions: u64,
    pub traps: u64,
    pub itlb_hits: u64,
    pub itlb_misses: u64,
    pub dtlb_hits: u64,
    pub dtlb_misses: u64,
    pub icache_hits: u64,
    pub icache_misses: u64,
    pub dcache_hits: u64,
    pub dcache_misses: u64,
}

impl ProcStats {
    pub fn reset(&mut self) {
        *self = ProcStats::default();
    }

    /// One-line summary for the CLI exit path.
    pub fn summary(&self) -> String {
        format!(
            "instructions {}  traps {}  i$ {}/{}  d$ {}/{}  itlb {}/{}  dtlb {}/{}",
            self.instructions,
            self.traps,
            self.icache_hits,
            self.icache_hits + self.icache_misses,
            self.dcache_hits,
            self.dcache_hits + self.dcache_misses,
            self.itlb_hits,
            self.itlb_hits + self.itlb_misses,
            self.dtlb_hits,
            self.dtlb_hits + self.dtlb_misses,
        )
    }
}
