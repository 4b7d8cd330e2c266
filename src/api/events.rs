//! Outbound UI message stream events.
//!
//! The closed set of frames written to the client. Each serializes to a flat
//! JSON object with a kebab-case `type` discriminator and camelCase fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Id of the single text block per generation.
pub const TEXT_BLOCK_ID: &str = "text-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundEvent {
    #[serde(rename_all = "camelCase")]
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    StartStep,
    #[serde(rename_all = "camelCase")]
    TextStart { id: String },
    #[serde(rename_all = "camelCase")]
    TextDelta { id: String, delta: String },
    #[serde(rename_all = "camelCase")]
    TextEnd { id: String },
    #[serde(rename_all = "camelCase")]
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolOutputAvailable { tool_call_id: String, output: Value },
    FinishStep,
    #[serde(rename_all = "camelCase")]
    Finish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<FinishReason>,
    },
    #[serde(rename_all = "camelCase")]
    Error { error_text: String },
}

impl OutboundEvent {
    pub fn start(message_id: impl Into<String>) -> Self {
        Self::Start {
            message_id: Some(message_id.into()),
        }
    }

    pub fn text_start() -> Self {
        Self::TextStart {
            id: TEXT_BLOCK_ID.to_string(),
        }
    }

    pub fn text_delta(delta: impl Into<String>) -> Self {
        Self::TextDelta {
            id: TEXT_BLOCK_ID.to_string(),
            delta: delta.into(),
        }
    }

    pub fn text_end() -> Self {
        Self::TextEnd {
            id: TEXT_BLOCK_ID.to_string(),
        }
    }

    pub fn finish(reason: FinishReason) -> Self {
        Self::Finish {
            finish_reason: Some(reason),
        }
    }

    pub fn error(error_text: impl Into<String>) -> Self {
        Self::Error {
            error_text: error_text.into(),
        }
    }

    /// Wire `type` value.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::StartStep => "start-step",
            Self::TextStart { .. } => "text-start",
            Self::TextDelta { .. } => "text-delta",
            Self::TextEnd { .. } => "text-end",
            Self::ToolInputAvailable { .. } => "tool-input-available",
            Self::ToolOutputAvailable { .. } => "tool-output-available",
            Self::FinishStep => "finish-step",
            Self::Finish { .. } => "finish",
            Self::Error { .. } => "error",
        }
    }

    /// A finish or error frame ends the generation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. } | Self::Error { .. })
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
