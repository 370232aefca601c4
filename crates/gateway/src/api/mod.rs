pub mod auth;
pub mod health;
pub mod runs;
pub mod sessions;
pub mod submit;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the configured API bearer-token middleware).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/healthz", get(health::health));

    let protected = Router::new()
        .route("/v1/submit", post(submit::submit))
        .route("/v1/abort", post(submit::abort))
        .route("/v1/sessions", get(sessions::list_sessions))
        .route("/v1/runs/:run_id", get(runs::get_run))
        .route_layer(middleware::from_fn_with_state(state, auth::require_api_token));

    public.merge(protected).layer(tower_http::trace::TraceLayer::new_for_http())
}
