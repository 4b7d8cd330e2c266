//! HTTP request handlers for the chat gateway.
//!
//! This module contains the chat streaming endpoint plus models, health,
//! title generation and metrics.

use crate::api::auth::Authenticator;
use crate::api::models::*;
use crate::api::streaming::{create_sse_response, encode_event_stream, guard_stream, GuardConfig};
use crate::core::config::{AppConfig, ModelConfig};
use crate::core::logging::get_request_id;
use crate::core::retry::RetryPolicy;
use crate::core::{AppError, Result, StreamCancelHandle};
use crate::services::agents::failing_stream;
use crate::services::{
    Agent, AgentRegistry, HealthChecker, ProviderClient, ProviderError, TitleGenerator,
    DEFAULT_AGENT, TITLE_MAX_TOKENS,
};
use crate::transformer::{convert_history, extract_text, translate};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: Authenticator,
    pub agents: AgentRegistry,
    pub health: HealthChecker,
    pub title: TitleGenerator,
    /// Cancelled once when the server begins graceful shutdown.
    pub shutdown: StreamCancelHandle,
}

impl AppState {
    /// Wire every service against one shared provider client.
    pub fn new(config: AppConfig, shutdown: StreamCancelHandle) -> std::result::Result<Self, ProviderError> {
        let retry = RetryPolicy::from_config(&config.openai, &config.retry);
        let provider = Arc::new(ProviderClient::new(&config.openai, retry)?);

        let title_agent = Agent::new("title", config.title.model.clone(), provider.clone())
            .with_max_tokens(TITLE_MAX_TOKENS);
        let health = HealthChecker::new(
            provider.http().clone(),
            provider.base_url(),
            provider.api_key(),
            &config.health,
        );

        Ok(Self {
            auth: Authenticator::from_config(&config.auth),
            agents: AgentRegistry::builtin(provider),
            health,
            title: TitleGenerator::new(Arc::new(title_agent), &config.title),
            config: Arc::new(config),
            shutdown,
        })
    }
}

fn rejection_to_error(rejection: JsonRejection) -> AppError {
    AppError::Validation(rejection.body_text())
}

/// Stream a chat reply as UI message chunks.
///
/// Validation failures are ordinary HTTP errors. Once the agent is chosen
/// the response is committed to SSE and every later failure, including an
/// unknown agent name, arrives as an `error` frame.
#[tracing::instrument(skip(state, payload))]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = payload.map_err(rejection_to_error)?;

    let Some((last, earlier)) = request.messages.split_last() else {
        return Err(AppError::BadRequest("Messages array cannot be empty".to_string()));
    };
    if request.model.trim().is_empty() {
        return Err(AppError::Validation("model must not be empty".to_string()));
    }

    let request_id = get_request_id();
    let model = state.config.resolve_model(&request.model);
    let agent_name = request.agent.as_deref().unwrap_or(DEFAULT_AGENT);
    let prompt = extract_text(&last.parts);
    let history = convert_history(earlier);

    tracing::info!(
        request_id = %request_id,
        model = %model,
        agent = %agent_name,
        messages = request.messages.len(),
        "Starting chat stream"
    );

    let events = match state
        .agents
        .resolve(request.agent.as_deref(), &model, request.tools.as_deref())
    {
        Ok(agent) => agent.stream_events(prompt, history),
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Agent resolution failed");
            failing_stream(e)
        }
    };

    let guard = GuardConfig::new(
        Duration::from_secs(state.config.server.timeout_seconds),
        state.shutdown.clone(),
    )
    .with_request_id(request_id.as_str());
    let disconnect = guard.disconnect.clone();
    let frames = guard_stream(encode_event_stream(translate(events)), guard);

    Ok(create_sse_response(frames, disconnect, agent_name, &request_id))
}

impl From<&ModelConfig> for ModelInfo {
    fn from(model: &ModelConfig) -> Self {
        Self {
            id: model.id.clone(),
            name: model.name.clone(),
            provider: model.provider.clone(),
            description: model.description.clone(),
            context_window: model.context_window,
            supports_tools: model.supports_tools,
        }
    }
}

/// List the configured model roster.
#[tracing::instrument(skip(state))]
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.config.models.iter().map(ModelInfo::from).collect(),
    })
}

async fn health_response(state: &AppState) -> Response {
    let response = state.health.check().await;
    let status = if response.status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(response)).into_response()
}

/// Full health check; 503 when any component is unhealthy.
#[tracing::instrument(skip(state))]
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    health_response(&state).await
}

/// Liveness probe. Never touches dependencies.
pub async fn health_live() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "alive" }))
}

/// Readiness probe.
#[tracing::instrument(skip(state))]
pub async fn health_ready(State(state): State<Arc<AppState>>) -> Response {
    health_response(&state).await
}

/// Generate a conversation title. Provider failures still answer 200 with
/// `useFallback` set.
#[tracing::instrument(skip(state, payload))]
pub async fn generate_title(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<TitleRequest>, JsonRejection>,
) -> Result<Json<TitleResponse>> {
    let Json(request) = payload.map_err(rejection_to_error)?;
    request.validate().map_err(AppError::Validation)?;

    Ok(Json(
        state
            .title
            .generate(&request.user_message, &request.conversation_id)
            .await,
    ))
}

/// Prometheus metrics endpoint.
#[tracing::instrument]
pub async fn metrics_handler() -> Result<Response> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let mut response = buffer.into_response();
    let content_type = HeaderValue::from_str(encoder.format_type())
        .map_err(|e| AppError::Internal(e.to_string()))?;
    response.headers_mut().insert(CONTENT_TYPE, content_type);
    Ok(response)
}
