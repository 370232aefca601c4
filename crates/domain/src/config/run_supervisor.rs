use serde::{Deserialize, Serialize};

/// Bounds the run supervisor's pool of concurrently live run processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSupervisorConfig {
    #[serde(default = "d_max_children")]
    pub max_children: usize,
}

impl Default for RunSupervisorConfig {
    fn default() -> Self {
        Self { max_children: d_max_children() }
    }
}

fn d_max_children() -> usize {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_500() {
        assert_eq!(RunSupervisorConfig::default().max_children, 500);
    }
}
