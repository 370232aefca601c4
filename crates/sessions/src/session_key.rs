//! Session key computation.
//!
//! Key templates:
//! - `agent:<agent>:main`                                    (control-plane)
//! - `agent:<agent>:<channel>:<account>:<peer-kind>:<peer-id>` (channel session)
//! - `...:thread:<tid>`  appended when the inbound message carries a thread id
//! - `...:sub:<sid>`     appended for derived sub-sessions

use orc_domain::model::{InboundMessage, PeerKind};

/// Compute the canonical session key for an inbound message. Pure function
/// of (agent id, message, optional explicit override) — two messages with
/// the same derived key always target the same session actor.
pub fn compute_session_key(agent_id: &str, msg: &InboundMessage, explicit_override: Option<&str>) -> String {
    if let Some(key) = explicit_override {
        return key.to_string();
    }

    let peer_kind = match msg.peer.kind {
        PeerKind::Dm => "dm",
        PeerKind::Group => "group",
    };
    let mut key = format!(
        "agent:{agent_id}:{}:{}:{peer_kind}:{}",
        msg.channel, msg.account_id, msg.peer.id
    );

    if let Some(tid) = &msg.peer.thread_id {
        key.push_str(&format!(":thread:{tid}"));
    }

    key
}

/// The control-plane session key for `agent_id`, used for messages with no
/// channel origin (e.g. programmatic API submissions without a session key).
pub fn main_session_key(agent_id: &str) -> String {
    format!("agent:{agent_id}:main")
}

/// Derive a sub-session key from a parent session key, used for
/// sub-agent/derived work that must not share the parent's run slot.
pub fn sub_session_key(parent_key: &str, sub_id: &str) -> String {
    format!("{parent_key}:sub:{sub_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_domain::model::{MessageInfo, Peer, Sender};

    fn msg(channel: &str, account: &str, peer_kind: PeerKind, peer_id: &str, thread_id: Option<&str>) -> InboundMessage {
        InboundMessage {
            channel: channel.into(),
            account_id: account.into(),
            agent_id: "bot1".into(),
            peer: Peer { kind: peer_kind, id: peer_id.into(), thread_id: thread_id.map(str::to_string) },
            sender: Sender { id: peer_id.into(), display_name: None },
            message: MessageInfo {
                id: "m1".into(),
                text: "hi".into(),
                timestamp: chrono::Utc::now(),
                reply_to_id: None,
            },
            meta: Default::default(),
        }
    }

    #[test]
    fn main_key_for_control_plane() {
        assert_eq!(main_session_key("bot1"), "agent:bot1:main");
    }

    #[test]
    fn dm_channel_session() {
        let m = msg("discord", "acct1", PeerKind::Dm, "alice", None);
        assert_eq!(compute_session_key("bot1", &m, None), "agent:bot1:discord:acct1:dm:alice");
    }

    #[test]
    fn group_channel_session() {
        let m = msg("discord", "acct1", PeerKind::Group, "server42", None);
        assert_eq!(compute_session_key("bot1", &m, None), "agent:bot1:discord:acct1:group:server42");
    }

    #[test]
    fn thread_is_appended() {
        let m = msg("discord", "acct1", PeerKind::Group, "server42", Some("t9"));
        assert_eq!(
            compute_session_key("bot1", &m, None),
            "agent:bot1:discord:acct1:group:server42:thread:t9"
        );
    }

    #[test]
    fn explicit_override_wins() {
        let m = msg("discord", "acct1", PeerKind::Dm, "alice", None);
        assert_eq!(compute_session_key("bot1", &m, Some("agent:bot1:main")), "agent:bot1:main");
    }

    #[test]
    fn sub_session_key_appends_sub_suffix() {
        assert_eq!(sub_session_key("agent:bot1:main", "s1"), "agent:bot1:main:sub:s1");
    }

    #[test]
    fn same_inputs_always_derive_same_key() {
        let a = msg("discord", "acct1", PeerKind::Dm, "alice", None);
        let b = msg("discord", "acct1", PeerKind::Dm, "alice", None);
        assert_eq!(compute_session_key("bot1", &a, None), compute_session_key("bot1", &b, None));
    }
}
