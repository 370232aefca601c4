use serde::{Deserialize, Serialize};

/// Thresholds governing the stream coalescer's flush decision (see the
/// run process's §4.6 ingestion/flush rules).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamCoalescerConfig {
    #[serde(default = "d_min_chars")]
    pub min_chars: usize,
    #[serde(default = "d_idle_ms")]
    pub idle_ms: u64,
    #[serde(default = "d_max_latency_ms")]
    pub max_latency_ms: u64,
    #[serde(default = "d_max_full_text")]
    pub max_full_text: usize,
}

impl Default for StreamCoalescerConfig {
    fn default() -> Self {
        Self {
            min_chars: d_min_chars(),
            idle_ms: d_idle_ms(),
            max_latency_ms: d_max_latency_ms(),
            max_full_text: d_max_full_text(),
        }
    }
}

fn d_min_chars() -> usize {
    48
}
fn d_idle_ms() -> u64 {
    400
}
fn d_max_latency_ms() -> u64 {
    1200
}
fn d_max_full_text() -> usize {
    100_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = StreamCoalescerConfig::default();
        assert_eq!(c.min_chars, 48);
        assert_eq!(c.idle_ms, 400);
        assert_eq!(c.max_latency_ms, 1200);
        assert_eq!(c.max_full_text, 100_000);
    }
}
