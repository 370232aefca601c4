use serde::{Deserialize, Serialize};

/// Idle-timer thresholds for the run process's watchdog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Idle limit before the watchdog fires, in seconds.
    #[serde(default = "d_idle_limit_secs")]
    pub idle_limit_secs: u64,
    /// How long to wait for a keepalive confirmation reply, in seconds.
    #[serde(default = "d_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self { idle_limit_secs: d_idle_limit_secs(), confirm_timeout_secs: d_confirm_timeout_secs() }
    }
}

fn d_idle_limit_secs() -> u64 {
    2 * 3600
}
fn d_confirm_timeout_secs() -> u64 {
    5 * 60
}
