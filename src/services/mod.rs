//! Business logic services for the chat gateway.
//!
//! The provider client talks to the upstream API; agents and tools build on
//! it; title generation and health checks are thin consumers.

pub mod agents;
pub mod health_check;
pub mod provider;
pub mod title;
pub mod tools;

pub use agents::{Agent, AgentRegistry, ChatAgent, DEFAULT_AGENT, MAX_TOOL_STEPS};
pub use health_check::HealthChecker;
pub use provider::{ChatCompletionRequest, Delta, ProviderClient, ProviderError};
pub use title::{TitleGenerator, TITLE_MAX_TOKENS};
pub use tools::{Tool, ToolSet};
