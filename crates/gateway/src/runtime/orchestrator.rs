//! Resolves an inbound message into a [`Job`]: which engine runs it, which
//! model it asks for, what cwd and tool policy apply, and how it should be
//! admitted against the session's run queue.
//!
//! Resolution precedence mirrors the shape of a provider-resolution chain —
//! most-specific override wins, falling through a fixed list of defaults —
//! generalized here across engine, model, and cwd independently.

use std::sync::Arc;

use regex::Regex;

use orc_domain::config::Config;
use orc_domain::error::{Error, Result};
use orc_domain::model::{InboundMessage, Job, QueueMode, ResumeToken};
use orc_providers::EngineRegistry;
use orc_sessions::SessionMetaStore;

/// Matches "use X" / "switch to X" / "with X" in free text, case-insensitive.
/// Applied as a for-this-run-only override *after* the base precedence
/// chain, and only takes effect if `X` names a registered engine.
fn sticky_engine_re() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:use|switch to|with)\s+([a-z0-9_-]+)\b").unwrap())
}

pub struct Orchestrator {
    config: Arc<Config>,
    engines: Arc<EngineRegistry>,
    sessions: Arc<SessionMetaStore>,
}

impl Orchestrator {
    pub fn new(config: Arc<Config>, engines: Arc<EngineRegistry>, sessions: Arc<SessionMetaStore>) -> Self {
        Self { config, engines, sessions }
    }

    /// Try every registered engine's `extract_resume` against `text` and
    /// return the first match.
    fn extract_resume_token(&self, text: &str) -> Option<ResumeToken> {
        for engine_id in self.engines.list_engines() {
            if let Some(engine) = self.engines.get(&engine_id) {
                if let Some(token) = engine.extract_resume(text) {
                    return Some(token);
                }
            }
        }
        None
    }

    fn resolve_engine(
        &self,
        session_key: &str,
        agent_id: &str,
        msg: &InboundMessage,
        explicit_engine: Option<&str>,
        resume_token: Option<&ResumeToken>,
        model: Option<&str>,
    ) -> String {
        let agent = self.config.agents.get(agent_id);

        let base = resume_token
            .map(|t| t.engine.clone())
            .or_else(|| explicit_engine.map(str::to_string))
            .or_else(|| model.and_then(|m| self.engines.engine_for_model(m)).map(str::to_string))
            .or_else(|| agent.and_then(|a| a.default_engine.clone()))
            .unwrap_or_else(|| self.config.engine.default_engine.clone());

        // Sticky-engine override: "for this run only", applied after the
        // base chain, only if the matched candidate is actually registered.
        if let Some(captures) = sticky_engine_re().captures(&msg.message.text) {
            if let Some(candidate) = captures.get(1) {
                let candidate = candidate.as_str().to_ascii_lowercase();
                if self.engines.get(&candidate).is_some() {
                    tracing::debug!(session_key, candidate, "sticky-engine override matched");
                    return candidate;
                }
            }
        }

        base
    }

    fn resolve_model(&self, agent_id: &str, msg: &InboundMessage, session_key: &str, explicit_model: Option<&str>) -> Option<String> {
        let agent = self.config.agents.get(agent_id);
        explicit_model
            .map(str::to_string)
            .or_else(|| msg.meta.get("model").and_then(|v| v.as_str()).map(str::to_string))
            .or_else(|| self.sessions.get_session_meta(session_key).and_then(|m| m.last_model))
            .or_else(|| agent.and_then(|a| a.default_model.clone()))
    }

    fn resolve_cwd(&self, agent_id: &str, msg: &InboundMessage) -> Option<std::path::PathBuf> {
        let agent = self.config.agents.get(agent_id);
        msg.meta
            .get("cwd")
            .and_then(|v| v.as_str())
            .map(std::path::PathBuf::from)
            .or_else(|| agent.and_then(|a| a.default_cwd.clone()))
    }

    /// Resolve an inbound message into a [`Job`] ready for the scheduler.
    /// `channel_policy` is whatever tool policy the channel/caller attaches
    /// to the request; it is merged over the agent's own policy (more
    /// specific wins).
    pub fn resolve(
        &self,
        session_key: &str,
        agent_id: &str,
        msg: &InboundMessage,
        channel_policy: orc_domain::config::agents::ToolPolicy,
        queue_mode: QueueMode,
        explicit_engine: Option<&str>,
        explicit_model: Option<&str>,
    ) -> Result<Job> {
        let agent = self.config.agents.get(agent_id).ok_or_else(|| Error::UnknownAgent(agent_id.to_string()))?;

        let resume_token = self.extract_resume_token(&msg.message.text);
        let model = self.resolve_model(agent_id, msg, session_key, explicit_model);
        let engine_id =
            self.resolve_engine(session_key, agent_id, msg, explicit_engine, resume_token.as_ref(), model.as_deref());
        if self.engines.get(&engine_id).is_none() {
            return Err(Error::UnknownEngine(engine_id));
        }

        let cwd = self.resolve_cwd(agent_id, msg);
        let tool_policy = agent.tool_policy.clone().merge(&channel_policy);

        Ok(Job {
            run_id: uuid::Uuid::new_v4().to_string(),
            session_key: session_key.to_string(),
            text: msg.message.text.clone(),
            user_message_id: msg.message.id.clone(),
            resume_token,
            engine_hint: Some(engine_id),
            model,
            cwd,
            tool_policy,
            queue_mode: Some(queue_mode),
            meta: msg.meta.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_domain::config::agents::AgentConfig;
    use orc_domain::config::engine::EngineConfig;
    use orc_domain::model::{MessageInfo, Peer, PeerKind, Sender};
    use std::collections::HashMap;

    fn msg(text: &str) -> InboundMessage {
        InboundMessage {
            channel: "discord".into(),
            account_id: "acct1".into(),
            agent_id: "bot1".into(),
            peer: Peer { kind: PeerKind::Dm, id: "alice".into(), thread_id: None },
            sender: Sender { id: "alice".into(), display_name: None },
            message: MessageInfo { id: "m1".into(), text: text.into(), timestamp: chrono::Utc::now(), reply_to_id: None },
            meta: HashMap::new(),
        }
    }

    fn setup(cfg: Config) -> (Orchestrator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let engines = Arc::new(EngineRegistry::from_config(&cfg.engine).unwrap());
        let sessions = Arc::new(SessionMetaStore::new(dir.path()).unwrap());
        (Orchestrator::new(Arc::new(cfg), engines, sessions), dir)
    }

    #[test]
    fn resolves_to_default_engine_absent_any_override() {
        let mut cfg = Config::default();
        cfg.agents.insert("bot1".into(), AgentConfig::default());
        let (orc, _dir) = setup(cfg);
        let job = orc
            .resolve("agent:bot1:main", "bot1", &msg("hello"), Default::default(), QueueMode::Collect, None, None)
            .unwrap();
        assert_eq!(job.engine_hint.as_deref(), Some("lemon"));
    }

    #[test]
    fn unknown_agent_is_rejected() {
        let (orc, _dir) = setup(Config::default());
        let err = orc
            .resolve("agent:ghost:main", "ghost", &msg("hi"), Default::default(), QueueMode::Collect, None, None)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownAgent(_)));
    }

    #[test]
    fn explicit_engine_overrides_agent_default() {
        let mut cfg = Config::default();
        cfg.agents.insert("bot1".into(), AgentConfig::default());
        cfg.engine = EngineConfig {
            engines: vec![orc_domain::config::engine::EngineDef {
                id: "remote-1".into(),
                kind: orc_domain::config::engine::EngineKind::RemoteApi,
                command: None,
                args: vec![],
                base_url: Some("https://example.com".into()),
                auth: None,
                models: vec![],
            }],
            ..EngineConfig::default()
        };
        let (orc, _dir) = setup(cfg);
        let job = orc
            .resolve(
                "agent:bot1:main",
                "bot1",
                &msg("hello"),
                Default::default(),
                QueueMode::Collect,
                Some("remote-1"),
                None,
            )
            .unwrap();
        assert_eq!(job.engine_hint.as_deref(), Some("remote-1"));
    }

    #[test]
    fn model_implied_engine_wins_over_profile_default() {
        let mut cfg = Config::default();
        cfg.agents.insert(
            "bot1".into(),
            AgentConfig { default_model: Some("gpt-remote".into()), ..Default::default() },
        );
        cfg.engine = EngineConfig {
            engines: vec![orc_domain::config::engine::EngineDef {
                id: "remote-1".into(),
                kind: orc_domain::config::engine::EngineKind::RemoteApi,
                command: None,
                args: vec![],
                base_url: Some("https://example.com".into()),
                auth: None,
                models: vec!["gpt-remote".into()],
            }],
            ..EngineConfig::default()
        };
        let (orc, _dir) = setup(cfg);
        let job = orc
            .resolve("agent:bot1:main", "bot1", &msg("hello"), Default::default(), QueueMode::Collect, None, None)
            .unwrap();
        assert_eq!(job.engine_hint.as_deref(), Some("remote-1"));
    }

    #[test]
    fn sticky_engine_phrase_overrides_when_engine_is_registered() {
        let mut cfg = Config::default();
        cfg.agents.insert("bot1".into(), AgentConfig::default());
        let (orc, _dir) = setup(cfg);
        let job = orc
            .resolve(
                "agent:bot1:main",
                "bot1",
                &msg("please use lemon for this"),
                Default::default(),
                QueueMode::Collect,
                None,
                None,
            )
            .unwrap();
        assert_eq!(job.engine_hint.as_deref(), Some("lemon"));
    }

    #[test]
    fn unknown_resolved_engine_is_rejected() {
        let mut cfg = Config::default();
        cfg.agents.insert("bot1".into(), AgentConfig { default_engine: Some("ghost-engine".into()), ..Default::default() });
        let (orc, _dir) = setup(cfg);
        let err = orc
            .resolve("agent:bot1:main", "bot1", &msg("hi"), Default::default(), QueueMode::Collect, None, None)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownEngine(_)));
    }

    #[test]
    fn tool_policy_merges_channel_over_agent() {
        let mut cfg = Config::default();
        cfg.agents.insert(
            "bot1".into(),
            AgentConfig {
                tool_policy: orc_domain::config::agents::ToolPolicy { allow: vec!["exec".into()], ..Default::default() },
                ..Default::default()
            },
        );
        let (orc, _dir) = setup(cfg);
        let channel_policy =
            orc_domain::config::agents::ToolPolicy { deny: vec!["exec.rm".into()], ..Default::default() };
        let job = orc
            .resolve("agent:bot1:main", "bot1", &msg("hi"), channel_policy, QueueMode::Collect, None, None)
            .unwrap();
        assert!(job.tool_policy.allows("exec.read"));
        assert!(!job.tool_policy.allows("exec.rm"));
    }
}
