use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Compaction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Usage-ratio and TTL thresholds that drive the run process's compaction
/// check (see completion pipeline step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Fraction of the engine's context limit at/above which compaction is
    /// preemptively scheduled.
    #[serde(default = "d_ratio")]
    pub preemptive_ratio: f64,
    /// How long a pending-compaction marker remains valid before it expires
    /// unconsumed, in seconds.
    #[serde(default = "d_ttl")]
    pub pending_ttl_secs: u64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self { preemptive_ratio: d_ratio(), pending_ttl_secs: d_ttl() }
    }
}

fn d_ratio() -> f64 {
    0.9
}
fn d_ttl() -> u64 {
    12 * 3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = CompactionConfig::default();
        assert!((c.preemptive_ratio - 0.9).abs() < f64::EPSILON);
        assert_eq!(c.pending_ttl_secs, 43_200);
    }
}
