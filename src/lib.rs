//! Chat SSE Gateway - streams chat replies from an OpenAI-compatible provider
//!
//! This library provides an HTTP gateway between a chat web UI and an LLM
//! provider, with features including:
//!
//! - **UI Message Streams**: provider output re-emitted as typed SSE frames
//!   (`start`, `text-delta`, `tool-input-available`, `finish`, ...)
//! - **Agents and Tools**: named agents with a bounded tool-call loop
//! - **Stream Guarding**: wall-clock timeout, client disconnect detection and
//!   a guaranteed `finish` + `[DONE]` on every exit path
//! - **Metrics & Monitoring**: Prometheus metrics for observability
//! - **Authentication**: optional API-key authentication
//!
//! # Architecture
//!
//! The codebase is organized into four layers:
//!
//! - [`core`]: Core functionality (config, errors, logging, metrics, middleware, retry)
//! - [`api`]: HTTP handlers, request/response models, outbound events and SSE output
//! - [`transformer`]: UI history conversion and the provider-to-UI stream translator
//! - [`services`]: Provider client, agents, tools, title generation and health checks
//!
//! # Configuration
//!
//! Settings come from `config.yaml` / `config.local.yaml`, `GATEWAY_*`
//! environment variables, and the well-known variables:
//! - `OPENAI_API_KEY`: provider API key (required)
//! - `OPENAI_API_BASE_URL`: provider base URL (default: https://api.openai.com/v1)

pub mod api;
pub mod core;
pub mod services;
pub mod transformer;

// Re-export commonly used types for convenience
pub use api::{build_router, AppState, ChatRequest, OutboundEvent};
pub use core::{AppConfig, AppError, Result, StreamCancelHandle};
pub use services::{AgentRegistry, ProviderClient, ProviderError};
