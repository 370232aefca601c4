//! `GET /v1/runs/:run_id` — look up a single run's current record.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub async fn get_run(State(state): State<AppState>, Path(run_id): Path<String>) -> impl IntoResponse {
    match state.run_store.get(&run_id) {
        Some(run) => Json(run).into_response(),
        None => (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "run not found" }))).into_response(),
    }
}
