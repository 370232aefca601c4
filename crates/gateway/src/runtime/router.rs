//! Intake entry point. Resolves an inbound message into a job and admits it
//! against the scheduler, consulting and clearing any pending-compaction
//! marker for the session first.

use std::sync::Arc;

use orc_domain::config::agents::ToolPolicy;
use orc_domain::config::Config;
use orc_domain::error::Result;
use orc_domain::model::{InboundMessage, MessageInfo, Peer, PeerKind, QueueMode, Sender};
use orc_sessions::{compute_session_key, main_session_key, sub_session_key, SessionMetaStore};

use super::compact;
use super::orchestrator::Orchestrator;
use super::scheduler::Scheduler;

/// Outcome of a successfully admitted inbound message.
pub struct Submitted {
    pub run_id: String,
    pub session_key: String,
}

/// Resolve `msg` into a job and admit it against the scheduler.
///
/// If the session carries an unexpired pending-compaction marker, it is
/// cleared here and the job's text is prefixed with a compaction
/// instruction, so the next run for this session summarizes before
/// continuing. `session_key_override` is honored as-is (explicit caller
/// override, e.g. for programmatic submissions naming their own key).
#[allow(clippy::too_many_arguments)]
pub async fn handle_inbound(
    orchestrator: &Orchestrator,
    scheduler: &Arc<Scheduler>,
    sessions: &SessionMetaStore,
    config: &Config,
    mut msg: InboundMessage,
    session_key_override: Option<&str>,
    channel_policy: ToolPolicy,
    queue_mode: QueueMode,
    explicit_engine: Option<&str>,
    explicit_model: Option<&str>,
) -> Result<Submitted> {
    let session_key = compute_session_key(&msg.agent_id, &msg, session_key_override);

    if let Some(pending) = sessions.get_pending_compaction(&session_key) {
        if !pending.is_expired(config.compaction.pending_ttl_secs) {
            msg.message.text = format!("{}{}", compact::compaction_prompt_prefix(), msg.message.text);
        }
        sessions.clear_pending_compaction(&session_key);
    }

    let job = orchestrator.resolve(
        &session_key,
        &msg.agent_id,
        &msg,
        channel_policy,
        queue_mode,
        explicit_engine,
        explicit_model,
    )?;
    let run_id = job.run_id.clone();
    scheduler.enqueue(job);

    Ok(Submitted { run_id, session_key })
}

/// Session-selection strategy for [`send_to_agent`].
pub enum SessionSelector {
    /// Reuse the most-recently-active session for this agent, falling back
    /// to the agent's control-plane session if it has none yet.
    LatestExisting,
    /// Always start a fresh, uniquely-keyed sub-session.
    ForceNew,
    /// Target exactly this session key.
    Explicit(String),
}

/// Options accompanying a [`send_to_agent`] call.
#[allow(clippy::too_many_arguments)]
pub struct SendToAgentOpts {
    pub session: SessionSelector,
    pub channel_policy: ToolPolicy,
    pub queue_mode: QueueMode,
    pub explicit_engine: Option<String>,
    pub explicit_model: Option<String>,
}

/// Library surface for programmatic submission to an agent, bypassing the
/// channel-message shape entirely. Synthesizes a minimal `InboundMessage`
/// and resolves the target session per `opts.session`, then defers to
/// [`handle_inbound`] for the normal compaction/resolution/admission path.
pub async fn send_to_agent(
    orchestrator: &Orchestrator,
    scheduler: &Arc<Scheduler>,
    sessions: &SessionMetaStore,
    config: &Config,
    agent_id: &str,
    text: &str,
    opts: SendToAgentOpts,
) -> Result<Submitted> {
    let session_key = match opts.session {
        SessionSelector::Explicit(key) => key,
        SessionSelector::ForceNew => sub_session_key(&main_session_key(agent_id), &uuid::Uuid::new_v4().to_string()),
        SessionSelector::LatestExisting => {
            latest_existing_session(sessions, agent_id).unwrap_or_else(|| main_session_key(agent_id))
        }
    };

    let msg = InboundMessage {
        channel: "api".into(),
        account_id: "api".into(),
        agent_id: agent_id.to_string(),
        peer: Peer { kind: PeerKind::Dm, id: agent_id.to_string(), thread_id: None },
        sender: Sender { id: "api".into(), display_name: None },
        message: MessageInfo {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_string(),
            timestamp: chrono::Utc::now(),
            reply_to_id: None,
        },
        meta: Default::default(),
    };

    handle_inbound(
        orchestrator,
        scheduler,
        sessions,
        config,
        msg,
        Some(&session_key),
        opts.channel_policy,
        opts.queue_mode,
        opts.explicit_engine.as_deref(),
        opts.explicit_model.as_deref(),
    )
    .await
}

/// The most-recently-active session key belonging to `agent_id`, or `None`
/// if the agent has never had a session recorded.
fn latest_existing_session(sessions: &SessionMetaStore, agent_id: &str) -> Option<String> {
    let prefix = format!("agent:{agent_id}:");
    sessions
        .list_session_meta()
        .into_iter()
        .filter(|(key, _)| key.starts_with(&prefix))
        .max_by_key(|(_, meta)| meta.last_activity_at)
        .map(|(key, _)| key)
}
