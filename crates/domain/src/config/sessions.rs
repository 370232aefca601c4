use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session routing configuration — controls how inbound messages map to
/// session keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// DM scoping strategy. `per_channel_peer` is the safe default for
    /// multi-user inboxes (prevents cross-user context leakage).
    #[serde(default)]
    pub dm_scope: DmScope,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self { dm_scope: DmScope::PerChannelPeer }
    }
}

/// How DM sessions are scoped onto the `agent:<agent>:<channel>:<account>:<peer-kind>:<peer-id>`
/// template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmScope {
    /// All DMs for an agent collapse onto `agent:<agent>:main`.
    Main,
    /// One session per peer, regardless of channel/account.
    PerPeer,
    /// One session per (channel, peer) pair. Recommended default for
    /// multi-user inboxes.
    #[default]
    PerChannelPeer,
    /// One session per (channel, account, peer) triple — full isolation.
    PerAccountChannelPeer,
}
