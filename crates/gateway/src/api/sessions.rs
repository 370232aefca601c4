//! `GET /v1/sessions` — list every session this process has resolved meta
//! for, most recently active first.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct SessionSummary {
    session_key: String,
    agent_id: String,
    last_activity: Option<chrono::DateTime<chrono::Utc>>,
}

/// Pull the `agent_id` segment out of a session key of the shape
/// `agent:<agent_id>:...`. Falls back to the full key if it doesn't match —
/// defensive against a future session-key shape, not expected in practice.
fn agent_id_from_session_key(session_key: &str) -> String {
    session_key.split(':').nth(1).unwrap_or(session_key).to_string()
}

pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let mut sessions: Vec<SessionSummary> = state
        .sessions
        .list_session_meta()
        .into_iter()
        .map(|(session_key, meta)| SessionSummary {
            agent_id: agent_id_from_session_key(&session_key),
            session_key,
            last_activity: meta.last_activity_at,
        })
        .collect();
    sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));

    Json(serde_json::json!({ "sessions": sessions }))
}
