use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::welcome))
        .route("/health", get(handlers::health_check))
        // Meet lifecycle
        .route("/meets", post(handlers::create_meet))
        .route("/meets/:code/start", post(handlers::start_meet))
        .route("/meets/:code/end", post(handlers::end_meet))
        // Conversation turns
        .route(
            "/meets/:code/conversation/open",
            post(handlers::open_conversation),
        )
        .route(
            "/meets/:code/conversation/turns",
            post(handlers::submit_user_turn),
        )
        .route(
            "/meets/:code/conversation/advance",
            post(handlers::advance_turn),
        )
        // A browser client fronts this service, so CORS stays open
        .layer(CorsLayer::permissive())
        // Tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
