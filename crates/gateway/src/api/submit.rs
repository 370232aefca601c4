//! `POST /v1/submit` and `POST /v1/abort` — the programmatic job-admission
//! surface, mirroring `runtime::router::handle_inbound` over HTTP.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use orc_domain::config::agents::ToolPolicy;
use orc_domain::error::Error;
use orc_domain::model::{InboundMessage, QueueMode};

use crate::runtime::router::handle_inbound;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    #[serde(flatten)]
    pub message: InboundMessage,
    /// Caller-supplied session key, bypassing the derived key. Absent for
    /// ordinary channel traffic.
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub queue_mode: Option<QueueMode>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tool_policy: ToolPolicy,
}

pub async fn submit(State(state): State<AppState>, Json(body): Json<SubmitBody>) -> impl IntoResponse {
    let result = handle_inbound(
        &state.orchestrator,
        &state.scheduler,
        &state.sessions,
        &state.config,
        body.message,
        body.session_key.as_deref(),
        body.tool_policy,
        body.queue_mode.unwrap_or(QueueMode::Collect),
        body.engine.as_deref(),
        body.model.as_deref(),
    )
    .await;

    match result {
        Ok(submitted) => {
            Json(serde_json::json!({ "ok": true, "run_id": submitted.run_id })).into_response()
        }
        Err(e) => {
            let status = match e {
                Error::UnknownAgent(_) | Error::UnknownEngine(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(serde_json::json!({ "ok": false, "error": e.to_string() }))).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AbortBody {
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Cancel the active run addressed by `session_key` or `run_id` (at least
/// one required). Always returns `{ok: true}` — aborting a run that has
/// already finished, or naming an unknown id, is not an error.
pub async fn abort(State(state): State<AppState>, Json(body): Json<AbortBody>) -> impl IntoResponse {
    let reason = body.reason.as_deref().unwrap_or("aborted via API");

    let active = body
        .run_id
        .as_deref()
        .and_then(|id| state.runs.get_by_run_id(id))
        .or_else(|| body.session_key.as_deref().and_then(|k| state.runs.get_by_session_key(k)));

    if let Some(active) = active {
        active.cancel.cancel();
        state.run_supervisor.cancel_map().cancel(&active.run_id);
        tracing::info!(run_id = %active.run_id, reason, "run aborted via API");
    }

    Json(serde_json::json!({ "ok": true }))
}
