pub mod auth;
pub mod debates;
pub mod events;
pub mod quality;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the `PARLEY_API_TOKEN` bearer-token middleware).
///
/// `state` is needed to wire up the auth middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/v1/health", get(health));

    let protected = Router::new()
        // Debate lifecycle
        .route("/debates", post(debates::create_debate))
        .route("/debates/:id", get(debates::get_debate))
        .route("/debates/:id/start", post(debates::start_debate))
        .route("/debates/:id/pause", post(debates::pause_debate))
        .route("/debates/:id/resume", post(debates::resume_debate))
        .route("/debates/:id/stop", post(debates::stop_debate))
        // SSE gateway
        .route("/debates/:id/events", get(events::stream_events))
        // Query API
        .route("/conversations/:id/quality", get(quality::get_quality))
        .route(
            "/conversations/:id/contradictions",
            get(quality::list_contradictions),
        )
        .route(
            "/contradictions/:id/resolve",
            post(quality::resolve_contradiction),
        )
        .route("/conversations/:id/loops", get(quality::list_loops))
        .route(
            "/conversations/:id/health-history",
            get(quality::health_history),
        )
        // Apply API auth middleware to all protected routes.
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}
