//! UI message history to provider message conversion.

use serde_json::{json, Value};

use super::{ProviderMessage, ToolCallSpec};
use crate::api::models::{MessagePart, Role, UiMessage};

/// Space-joined text of all text parts, in order.
pub fn extract_text(parts: &[MessagePart]) -> String {
    parts
        .iter()
        .filter_map(|part| match part {
            MessagePart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pending tool calls: AI SDK `tool-call` parts and legacy invocations without a result.
pub fn extract_tool_calls(parts: &[MessagePart]) -> Vec<ToolCallSpec> {
    parts
        .iter()
        .filter_map(|part| match part {
            MessagePart::ToolCall {
                tool_call_id,
                tool_name,
                args,
            } => {
                let args = args.clone().unwrap_or_else(|| json!({}));
                Some(ToolCallSpec::new(tool_call_id, tool_name, args.to_string()))
            }
            MessagePart::ToolInvocation {
                tool_call_id,
                tool_name,
                args,
                result: None,
            } => Some(ToolCallSpec::new(tool_call_id, tool_name, args.to_string())),
            _ => None,
        })
        .collect()
}

/// Completed tool results as `(tool_call_id, content)`.
///
/// AI SDK `tool-result` parts and legacy invocations carrying a result are
/// treated the same.
pub fn extract_tool_results(parts: &[MessagePart]) -> Vec<(String, String)> {
    parts
        .iter()
        .filter_map(|part| match part {
            MessagePart::ToolResult {
                tool_call_id,
                result,
            }
            | MessagePart::ToolInvocation {
                tool_call_id,
                result: Some(result),
                ..
            } => Some((tool_call_id.clone(), result_content(result))),
            _ => None,
        })
        .collect()
}

/// Strings pass through; everything else is JSON-encoded.
fn result_content(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn convert_message(message: &UiMessage) -> ProviderMessage {
    let text = extract_text(&message.parts);
    match message.role {
        Role::System => ProviderMessage::System { content: text },
        Role::User => ProviderMessage::User { content: text },
        Role::Assistant => {
            let tool_calls = extract_tool_calls(&message.parts);
            let content = if text.is_empty() && !tool_calls.is_empty() {
                None
            } else {
                Some(text)
            };
            ProviderMessage::Assistant {
                content,
                tool_calls,
            }
        }
    }
}

/// Map UI history onto provider turns.
///
/// Each assistant turn is followed by one `tool` turn per completed result
/// it carries.
pub fn convert_history(messages: &[UiMessage]) -> Vec<ProviderMessage> {
    let mut history = Vec::with_capacity(messages.len());
    for message in messages {
        history.push(convert_message(message));
        if message.role == Role::Assistant {
            history.extend(
                extract_tool_results(&message.parts)
                    .into_iter()
                    .map(|(id, content)| ProviderMessage::tool(id, content)),
            );
        }
    }
    history
}
