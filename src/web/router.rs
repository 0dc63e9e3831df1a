//! Router configuration.

use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::middleware::create_cors_layer;
use super::ws::chat_ws_handler;
use crate::chat::ChatHub;

/// Create the chat router.
pub fn create_router(hub: Arc<ChatHub>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/ws/chat/:conversation_id", get(chat_ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins)),
        )
        .with_state(hub)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
