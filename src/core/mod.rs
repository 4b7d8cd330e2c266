//! Core functionality for the chat gateway.
//!
//! This module contains fundamental components used throughout the application:
//! - Configuration management
//! - Error handling and the client-facing error taxonomy
//! - Logging context and metrics
//! - HTTP middleware
//! - Cancellation and retry primitives

pub mod cancel;
pub mod config;
pub mod error;
pub mod error_types;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod retry;

// Re-export commonly used types
pub use cancel::StreamCancelHandle;
pub use config::{AppConfig, AuthMode, LogFormat};
pub use error::{AppError, ErrorResponse, Result};
pub use error_types::{truncate_error_message, ErrorCode};
pub use logging::{generate_request_id, get_request_id, init_tracing, REQUEST_ID};
pub use metrics::{get_metrics, init_metrics, record_stream_outcome, Metrics, StreamOutcome};
pub use middleware::{request_id_middleware, MetricsMiddleware};
pub use retry::{retry_with_backoff, RetryPolicy};
