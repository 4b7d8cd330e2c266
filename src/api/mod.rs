//! API layer for the chat gateway.
//!
//! This module contains the HTTP handlers, request/response models, the
//! outbound event model and SSE streaming support, plus [`build_router`]
//! which assembles them with the middleware stack.

pub mod auth;
pub mod disconnect;
pub mod events;
pub mod handlers;
pub mod models;
pub mod streaming;

// Re-export commonly used types
pub use auth::{auth_middleware, Authenticator};
pub use events::{FinishReason, OutboundEvent};
pub use handlers::{
    chat, generate_title, health, health_live, health_ready, list_models, metrics_handler,
    AppState,
};
pub use models::{ChatRequest, MessagePart, Role, UiMessage};
pub use streaming::{create_sse_response, encode_event, guard_stream, GuardConfig};

use crate::core::config::CorsConfig;
use crate::core::{request_id_middleware, MetricsMiddleware};
use axum::{
    http::{HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the CORS layer from configuration.
///
/// A `*` origin allows any origin without credentials; otherwise only the
/// listed origins are allowed and credentials are permitted.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let methods: Vec<Method> = config.methods.iter().filter_map(|m| m.parse().ok()).collect();
    let headers: Vec<HeaderName> = config.headers.iter().filter_map(|h| h.parse().ok()).collect();
    let layer = CorsLayer::new()
        .allow_methods(methods)
        .allow_headers(headers)
        .expose_headers([HeaderName::from_static(crate::core::middleware::REQUEST_ID_HEADER)]);

    if config.origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

/// Build the router with all endpoints and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors);

    Router::new()
        .route("/chat", post(chat))
        .route("/models", get(list_models))
        .route("/title/generate", post(generate_title))
        .route("/health", get(health))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .route("/metrics", get(metrics_handler))
        .layer(axum::middleware::from_fn(MetricsMiddleware::track_metrics))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
