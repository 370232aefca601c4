use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::VecDeque;

use crate::config::agents::ToolPolicy;
use crate::stream::{ActionKind, ActionPhase};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound message
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Kind of peer an inbound message arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerKind {
    Dm,
    Group,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    pub kind: PeerKind,
    pub id: String,
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageInfo {
    pub id: String,
    pub text: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub reply_to_id: Option<String>,
}

/// Immutable record delivered by a channel adapter. Created at ingress,
/// discarded once routing has produced a [`Job`] or control action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: String,
    pub account_id: String,
    pub agent_id: String,
    pub peer: Peer,
    pub sender: Sender,
    pub message: MessageInfo,
    #[serde(default)]
    pub meta: HashMap<String, serde_json::Value>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resume token
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Opaque {engine, value} pair round-tripped through outbound messages so
/// a user can reply later and continue a session on the same engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeToken {
    pub engine: String,
    pub value: String,
}

impl ResumeToken {
    pub fn format(&self) -> String {
        format!("resume:{}:{}", self.engine, self.value)
    }

    /// Parse a token previously produced by [`ResumeToken::format`].
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix("resume:")?;
        let (engine, value) = rest.split_once(':')?;
        Some(Self { engine: engine.to_string(), value: value.to_string() })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Queue modes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How a [`Job`] should be admitted against the per-session worker queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
    /// Append; dispatched strictly FIFO when the prior run completes.
    Collect,
    /// Append as the next single follow-up, replacing any previously
    /// queued-but-not-started follow-up for the same session.
    Followup,
    /// Forward into the active run as a steer instruction.
    Steer,
    /// Like `Steer` but also concatenates any queued `Collect` items.
    SteerBacklog,
    /// Cancel the active run, then enqueue as `Followup`.
    Interrupt,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A submission to a run, produced by the orchestrator and handed to the
/// scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Assigned at submission time (by the orchestrator), not by the run
    /// process, so `POST /v1/submit` can hand the caller a run id before
    /// the job has necessarily started running.
    pub run_id: String,
    pub session_key: String,
    pub text: String,
    pub user_message_id: String,
    #[serde(default)]
    pub resume_token: Option<ResumeToken>,
    #[serde(default)]
    pub engine_hint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub cwd: Option<std::path::PathBuf>,
    #[serde(default)]
    pub tool_policy: ToolPolicy,
    #[serde(default)]
    pub queue_mode: Option<QueueMode>,
    #[serde(default)]
    pub meta: HashMap<String, serde_json::Value>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run state machine & record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Created,
    Registered,
    Submitted,
    Streaming,
    Completing,
    Terminated,
    Aborted,
    Crashed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Terminated | RunState::Aborted | RunState::Crashed)
    }
}

/// Mutable state of an in-flight (or just-finished) run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub session_key: String,
    pub engine_id: String,
    pub state: RunState,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub last_activity_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub context_ratio: Option<f64>,
    pub retry_count: u32,
    pub resume_token: Option<ResumeToken>,
    pub pending_compaction: bool,
    pub ok: Option<bool>,
    pub answer_preview: Option<String>,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn new(run_id: impl Into<String>, session_key: impl Into<String>, engine_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            run_id: run_id.into(),
            session_key: session_key.into(),
            engine_id: engine_id.into(),
            state: RunState::Created,
            started_at: now,
            last_activity_at: now,
            finished_at: None,
            context_ratio: None,
            retry_count: 0,
            resume_token: None,
            pending_compaction: false,
            ok: None,
            answer_preview: None,
            error: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity_at = chrono::Utc::now();
    }

    pub fn finish(&mut self, ok: bool, answer_preview: Option<String>, error: Option<String>) {
        self.state = if ok {
            RunState::Terminated
        } else if error.as_deref().map(|e| e.to_ascii_lowercase().contains("cancelled")).unwrap_or(false) {
            RunState::Aborted
        } else {
            RunState::Crashed
        };
        self.ok = Some(ok);
        self.answer_preview = answer_preview;
        self.error = error;
        self.finished_at = Some(chrono::Utc::now());
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Action record (tool-status coalescer state)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const MAX_ACTION_MSG_CHARS: usize = 140;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: String,
    pub kind: ActionKind,
    pub title: String,
    pub phase: ActionPhase,
    pub ok: Option<bool>,
    pub message: Option<String>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub seq: u64,
}

/// Bounded, insertion-ordered collection of the most recent actions for a run.
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    order: VecDeque<String>,
    records: HashMap<String, ActionRecord>,
    next_seq: u64,
    capacity: usize,
}

impl ActionLog {
    pub fn new(capacity: usize) -> Self {
        Self { order: VecDeque::new(), records: HashMap::new(), next_seq: 0, capacity }
    }

    pub fn upsert(
        &mut self,
        id: &str,
        kind: ActionKind,
        title: &str,
        phase: ActionPhase,
        ok: Option<bool>,
        message: Option<String>,
    ) {
        let truncated = message.map(|m| truncate_chars(&m, MAX_ACTION_MSG_CHARS));
        if let Some(existing) = self.records.get_mut(id) {
            existing.kind = kind;
            existing.title = title.to_string();
            existing.phase = phase;
            existing.ok = ok;
            existing.message = truncated;
            existing.updated_at = chrono::Utc::now();
            return;
        }
        self.next_seq += 1;
        self.records.insert(
            id.to_string(),
            ActionRecord {
                id: id.to_string(),
                kind,
                title: title.to_string(),
                phase,
                ok,
                message: truncated,
                updated_at: chrono::Utc::now(),
                seq: self.next_seq,
            },
        );
        self.order.push_back(id.to_string());
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.records.remove(&evicted);
            }
        }
    }

    /// Running actions first (insertion order), then completed actions
    /// (completion order).
    pub fn render_order(&self) -> Vec<&ActionRecord> {
        let mut running: Vec<&ActionRecord> = Vec::new();
        let mut completed: Vec<&ActionRecord> = Vec::new();
        for id in &self.order {
            if let Some(rec) = self.records.get(id) {
                if rec.phase == ActionPhase::Completed {
                    completed.push(rec);
                } else {
                    running.push(rec);
                }
            }
        }
        completed.sort_by_key(|r| r.updated_at);
        running.into_iter().chain(completed).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream buffer (stream coalescer state)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default)]
pub struct StreamBuffer {
    pub full_text: String,
    pub pending: String,
    pub last_accepted_seq: u64,
    pub version: u64,
    pub finalized: bool,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }
}
