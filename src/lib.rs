pub mod config;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod prompts;
pub mod rate_limit;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod upstream;
pub mod webhook;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

// creating the router with routes
pub fn build_router(state: Arc<AppState>, allowed_origins: &[String]) -> Router {
    let router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/api/demo-chat", post(handlers::demo_chat_handler))
        .route("/api/tts", post(handlers::tts_handler))
        .route("/api/signed-url", get(handlers::signed_url_handler))
        .route(
            "/api/webhooks/elevenlabs",
            post(handlers::elevenlabs_webhook_handler),
        )
        .route(
            "/api/tools/service-request",
            post(handlers::service_request_handler),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    match cors::cors_layer(allowed_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}
