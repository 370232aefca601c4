//! `GET /healthz` — liveness/readiness probe (public, unauthenticated).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use chrono::{Datelike, TimeZone, Utc};

use crate::state::AppState;

/// `completed_today` counts runs whose `finished_at` falls on or after the
/// most recent UTC midnight, so the count resets at midnight UTC without
/// needing a background reset task.
fn midnight_utc_today() -> chrono::DateTime<Utc> {
    let now = Utc::now();
    Utc.with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0).single().unwrap_or(now)
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let supervisor_ok = true;
    let orchestrator_ok = !state.engines.list_engines().is_empty();
    let run_supervisor_ok = state.run_supervisor.healthy();
    let ok = supervisor_ok && orchestrator_ok && run_supervisor_ok;

    let body = serde_json::json!({
        "status": if ok { "ok" } else { "degraded" },
        "checks": {
            "supervisor": supervisor_ok,
            "orchestrator": orchestrator_ok,
            "run_supervisor": run_supervisor_ok,
        },
        "run_counts": {
            "active": state.scheduler.active_run_count(),
            "queued": state.scheduler.queued_count(),
            "completed_today": state.run_store.completed_since(midnight_utc_today()),
        },
    });

    let status = if ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(body))
}
