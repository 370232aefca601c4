use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::model::ResumeToken;

/// A boxed async stream, used for engine event streams.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// The kind of action an engine reports via [`EngineEvent::Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Tool,
    Command,
    FileChange,
    WebSearch,
    Subagent,
}

/// The lifecycle phase of an in-flight action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPhase {
    Started,
    Updated,
    Completed,
}

/// Token usage reported by an engine at completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// Fraction of the engine's context window consumed (0.0-1.0), when known.
    pub context_ratio: Option<f64>,
}

/// Events emitted by an engine adapter for a single run.
///
/// Protocol: exactly one `Started`, zero or more `Delta` with strictly
/// monotone `seq`, zero or more `Action`, exactly one terminal `Completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    #[serde(rename = "started")]
    Started {
        engine: String,
        resume_token: Option<ResumeToken>,
        title: Option<String>,
        meta: serde_json::Value,
    },

    #[serde(rename = "delta")]
    Delta { seq: u64, text: String },

    #[serde(rename = "action")]
    Action {
        id: String,
        kind: ActionKind,
        title: String,
        detail: Option<String>,
        phase: ActionPhase,
        ok: Option<bool>,
        message: Option<String>,
    },

    #[serde(rename = "completed")]
    Completed {
        ok: bool,
        answer: String,
        error: Option<String>,
        usage: Usage,
        resume_token: Option<ResumeToken>,
    },
}

impl EngineEvent {
    pub fn is_completed(&self) -> bool {
        matches!(self, EngineEvent::Completed { .. })
    }
}
