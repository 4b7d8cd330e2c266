//! Request and response models for the gateway API.
//!
//! Inbound UI messages carry a `parts` list that may include UI-only
//! lifecycle parts (step markers, reasoning, sources). Those are dropped
//! before the typed [`MessagePart`] union is parsed.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Part types that carry conversation content.
pub const CONTENT_PART_TYPES: &[&str] = &["text", "tool-call", "tool-result", "tool-invocation"];

// ============================================================================
// Chat Request Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One content part of a UI message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text { text: String },
    /// AI SDK tool call.
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
    },
    /// AI SDK tool result.
    #[serde(rename_all = "camelCase")]
    ToolResult { tool_call_id: String, result: Value },
    /// Legacy combined shape; `result` absent means the call is still pending.
    #[serde(rename_all = "camelCase")]
    ToolInvocation {
        tool_call_id: String,
        tool_name: String,
        args: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
}

/// Keep only parts whose `type` is a content type.
///
/// Non-object entries and UI lifecycle parts are dropped, never rejected.
pub fn filter_message_parts(parts: Vec<Value>) -> Vec<Value> {
    parts
        .into_iter()
        .filter(|part| {
            part.get("type")
                .and_then(Value::as_str)
                .is_some_and(|t| CONTENT_PART_TYPES.contains(&t))
        })
        .collect()
}

fn deserialize_parts<'de, D>(deserializer: D) -> Result<Vec<MessagePart>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    filter_message_parts(raw)
        .into_iter()
        .map(|part| serde_json::from_value(part).map_err(de::Error::custom))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiMessage {
    pub id: String,
    pub role: Role,
    #[serde(deserialize_with = "deserialize_parts")]
    pub parts: Vec<MessagePart>,
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<UiMessage>,
    pub model: String,
    /// Display tools to offer; none when absent or empty.
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    /// Named agent; the default chat agent when absent.
    #[serde(default)]
    pub agent: Option<String>,
}

// ============================================================================
// Models Endpoint
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub description: Option<String>,
    pub context_window: u32,
    pub supports_tools: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}

// ============================================================================
// Health Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health of one dependency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentHealth {
    pub fn healthy(latency_ms: Option<u64>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            latency_ms,
            error: None,
            message: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            error: Some(error.into()),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthChecks {
    pub openai: ComponentHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: String,
    pub checks: HealthChecks,
}

// ============================================================================
// Title Generation Models
// ============================================================================

pub const TITLE_USER_MESSAGE_MAX_CHARS: usize = 10000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleRequest {
    pub user_message: String,
    pub conversation_id: String,
}

impl TitleRequest {
    pub fn validate(&self) -> Result<(), String> {
        let len = self.user_message.chars().count();
        if len == 0 {
            return Err("userMessage must not be empty".to_string());
        }
        if len > TITLE_USER_MESSAGE_MAX_CHARS {
            return Err(format!(
                "userMessage must be at most {} characters",
                TITLE_USER_MESSAGE_MAX_CHARS
            ));
        }
        if self.conversation_id.is_empty() {
            return Err("conversationId must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TitleResponse {
    pub title: String,
    pub use_fallback: bool,
}
