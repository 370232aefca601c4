use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent profiles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-agent defaults the orchestrator falls back to once request- and
/// session-level overrides have been exhausted.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub default_engine: Option<String>,
    #[serde(default)]
    pub default_cwd: Option<PathBuf>,
    #[serde(default)]
    pub tool_policy: ToolPolicy,
}

/// Approval requirement for a sensitive tool-policy group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalLevel {
    Always,
    Ask,
    Never,
}

/// Tool allow/deny policy — prefix-based matching, merged across
/// agent -> channel -> session -> runtime levels by the orchestrator
/// (later wins per key).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolPolicy {
    /// Tool name prefixes this agent may use. Empty or `["*"]` = unrestricted.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Tool name prefixes this agent is denied (evaluated before allow).
    #[serde(default)]
    pub deny: Vec<String>,
    /// Approval level required per sensitive group (`bash`, `write`, `process`).
    #[serde(default)]
    pub approvals: HashMap<String, ApprovalLevel>,
}

impl ToolPolicy {
    /// Check whether the given tool name is permitted by this policy.
    ///
    /// Matching is case-insensitive. Deny always wins over allow.
    pub fn allows(&self, tool_name: &str) -> bool {
        let name = tool_name.to_ascii_lowercase();

        for d in &self.deny {
            let d_lower = d.to_ascii_lowercase();
            if d_lower == "*" || name == d_lower || name.starts_with(&format!("{d_lower}.")) {
                return false;
            }
        }
        if self.allow.is_empty() || self.allow.iter().any(|a| a == "*") {
            return true;
        }
        for a in &self.allow {
            let a_lower = a.to_ascii_lowercase();
            if name == a_lower || name.starts_with(&format!("{a_lower}.")) {
                return true;
            }
        }
        false
    }

    /// Approval level for a sensitive group, defaulting to `Always` for
    /// `bash`/`write`/`process` when the peer is a group (not a DM) and no
    /// explicit override exists.
    pub fn approval_for(&self, group: &str, is_group_peer: bool) -> ApprovalLevel {
        if let Some(level) = self.approvals.get(group) {
            return *level;
        }
        if is_group_peer && matches!(group, "bash" | "write" | "process") {
            return ApprovalLevel::Always;
        }
        ApprovalLevel::Never
    }

    /// Merge `other` over `self` — later (more specific) policy wins per key.
    pub fn merge(mut self, other: &ToolPolicy) -> ToolPolicy {
        if !other.allow.is_empty() {
            self.allow = other.allow.clone();
        }
        if !other.deny.is_empty() {
            self.deny = other.deny.clone();
        }
        for (k, v) in &other.approvals {
            self.approvals.insert(k.clone(), *v);
        }
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
