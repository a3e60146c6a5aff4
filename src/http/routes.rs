use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Push-to-talk control
        .route("/talk/start", post(handlers::start_talking))
        .route("/talk/stop", post(handlers::stop_talking))
        // Transcript
        .route("/transcript", get(handlers::get_transcript))
        .route("/transcript/clear", post(handlers::clear_transcript))
        // Session queries
        .route("/status", get(handlers::get_status))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
