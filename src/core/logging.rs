//! Logging setup and per-request context.
//!
//! Request IDs live in a task-local so every log line and error body emitted
//! while serving a request can carry it without threading it through calls.

use crate::core::config::{LogFormat, LoggingConfig};
use chrono::Local;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

tokio::task_local! {
    /// Task-local storage for the current request ID.
    pub static REQUEST_ID: String;
}

tokio::task_local! {
    /// Task-local storage for the name of the API key that authenticated the request.
    pub static API_KEY_NAME: String;
}

/// Get the current request ID from context, if set.
///
/// Returns an empty string if no request ID is set.
pub fn get_request_id() -> String {
    REQUEST_ID.try_with(|id| id.clone()).unwrap_or_default()
}

/// Get the current API key name from context, if set.
///
/// Returns "anonymous" if no API key name is set.
pub fn get_api_key_name() -> String {
    API_KEY_NAME
        .try_with(|name| name.clone())
        .unwrap_or_else(|_| "anonymous".to_string())
}

/// Generate a new unique request ID using UUID v4.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Keep a client-supplied request ID only when it is a well-formed UUID.
pub fn resolve_request_id(incoming: Option<&str>) -> String {
    incoming
        .map(str::trim)
        .filter(|id| uuid::Uuid::parse_str(id).is_ok())
        .map(str::to_string)
        .unwrap_or_else(generate_request_id)
}

/// Timestamp formatter in the local timezone (respects TZ).
struct LocalTime;

impl tracing_subscriber::fmt::time::FormatTime for LocalTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Build the env filter: `RUST_LOG` if present, else the configured level.
///
/// Noisy HTTP library logs are always suppressed, even when `RUST_LOG`
/// asks for `trace`.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let base = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| format!("{},chat_sse_gateway={}", config.level, config.level));
    EnvFilter::new(format!("{},hyper=warn,h2=warn,reqwest=warn", base))
}

/// Install the global tracing subscriber.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = build_filter(config);
    let no_color = std::env::var("NO_COLOR").is_ok();

    match config.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_timer(LocalTime)
                        .with_ansi(!no_color),
                )
                .init();
        }
    }
}
