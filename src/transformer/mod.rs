//! Conversion between UI messages, provider payloads and outbound events.
//!
//! ```text
//! UiMessage[] ──[messages::convert_history]──► ProviderMessage[]
//!                                                   │
//!                                              provider call
//!                                                   ▼
//! OutboundEvent* ◄──[translator::StreamTranslator]── ProviderEvent*
//! ```
//!
//! Provider-specific stream shapes are reduced to [`ProviderEvent`] at the
//! adapter boundary, so the translator only ever matches on this closed set.

pub mod messages;
pub mod stream;
pub mod translator;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

use crate::services::provider::ProviderError;

pub use messages::{convert_history, extract_text, extract_tool_calls, extract_tool_results};
pub use stream::{format_sse_data, format_sse_done, SseEvent, SseParser};
pub use translator::{translate, StreamTranslator, TranslatorState};

// ============================================================================
// Provider Events
// ============================================================================

/// One item of a provider's event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// Incremental assistant text.
    TextDelta(String),
    /// The model started a tool call. `args` may be a JSON-encoded string.
    ToolCall {
        id: Option<String>,
        name: String,
        args: Value,
    },
    /// A tool finished. `None` means the tool produced nothing.
    ToolResult { id: String, result: Option<Value> },
    /// Final, complete assistant text. Nothing follows it.
    RunResult { text: String },
}

/// Single-pass provider event sequence. An `Err` item is terminal.
pub type ProviderEventStream =
    Pin<Box<dyn Stream<Item = Result<ProviderEvent, ProviderError>> + Send>>;

// ============================================================================
// Provider Messages (OpenAI chat-completions wire format)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ProviderMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallSpec>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ProviderMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }
}

/// A tool call as carried in an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallSpec {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments object.
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCallSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}
