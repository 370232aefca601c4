use serde::{Deserialize, Serialize};

/// Global concurrency gate governing the scheduler's run admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "d_max_concurrent_runs")]
    pub max_concurrent_runs: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_concurrent_runs: d_max_concurrent_runs() }
    }
}

fn d_max_concurrent_runs() -> u32 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_max_concurrent_runs_is_two() {
        assert_eq!(SchedulerConfig::default().max_concurrent_runs, 2);
    }
}
