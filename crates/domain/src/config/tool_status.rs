use serde::{Deserialize, Serialize};

/// Thresholds governing the tool-status coalescer's action log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStatusConfig {
    #[serde(default = "d_max_actions")]
    pub max_actions: usize,
    #[serde(default = "d_msg_truncate")]
    pub msg_truncate: usize,
}

impl Default for ToolStatusConfig {
    fn default() -> Self {
        Self { max_actions: d_max_actions(), msg_truncate: d_msg_truncate() }
    }
}

fn d_max_actions() -> usize {
    40
}
fn d_msg_truncate() -> usize {
    140
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = ToolStatusConfig::default();
        assert_eq!(c.max_actions, 40);
        assert_eq!(c.msg_truncate, 140);
    }
}
