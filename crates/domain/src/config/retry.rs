use serde::{Deserialize, Serialize};

/// Governs the run process's transient-failure auto-retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: d_max_attempts() }
    }
}

fn d_max_attempts() -> u32 {
    1
}
