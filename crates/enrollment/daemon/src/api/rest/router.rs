//! REST API router

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{chains, events, health};
use super::state::AppState;

/// Create the REST API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(health::health_check))
        // Triggers
        .route("/events/enrollment", post(events::enrollment))
        .route("/events/completion", post(events::completion))
        .route("/events/progress", post(events::progress))
        // Chains
        .route("/chains/:id", get(chains::get_chain))
        .route("/chains/:id/rerun", post(chains::rerun_chain))
        .route("/history", get(chains::get_history))
        .route("/stats", get(chains::get_stats))
        .route("/dependencies", get(chains::get_dependencies));

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
