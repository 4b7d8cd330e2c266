//! Provider event stream to outbound UI event translation.
//!
//! [`StreamTranslator`] is a plain state machine: each provider event is fed
//! through [`StreamTranslator::on_event`] and yields zero or more outbound
//! events. [`translate`] drives it over an async provider stream.
//!
//! | state                  | input        | output                                      | next                 |
//! |------------------------|--------------|---------------------------------------------|----------------------|
//! | NotStarted             | start        | start, start-step                           | Started(text=false)  |
//! | Started(false)         | text (≠ "")  | text-start, text-delta                      | Started(true)        |
//! | Started(true)          | text (≠ "")  | text-delta                                  | Started(true)        |
//! | Started(t)             | tool call    | [text-end if t], tool-input-available       | Started(false)       |
//! | Started(t)             | tool result  | tool-output-available                       | Started(t)           |
//! | Started(t)             | run result   | [text-end if t], finish-step, finish(stop)  | Finished             |
//! | Started(t)             | error        | error                                       | Errored              |
//! | Finished / Errored     | anything     | nothing                                     | unchanged            |

use futures::{Stream, StreamExt};
use serde_json::{json, Map, Value};
use std::collections::HashSet;

use super::{ProviderEvent, ProviderEventStream};
use crate::api::events::{FinishReason, OutboundEvent};
use crate::services::provider::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslatorState {
    NotStarted,
    Started { text_open: bool },
    Finished,
    Errored,
}

/// Per-request translation session.
#[derive(Debug)]
pub struct StreamTranslator {
    message_id: String,
    state: TranslatorState,
    /// Tool calls already announced to the client.
    announced_tools: HashSet<String>,
    /// Tool calls whose output has been sent.
    completed_tools: HashSet<String>,
}

impl Default for StreamTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamTranslator {
    pub fn new() -> Self {
        Self::with_message_id(format!("msg_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn with_message_id(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            state: TranslatorState::NotStarted,
            announced_tools: HashSet::new(),
            completed_tools: HashSet::new(),
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn state(&self) -> TranslatorState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            TranslatorState::Finished | TranslatorState::Errored
        )
    }

    /// Open the session. Idempotent.
    pub fn start(&mut self) -> Vec<OutboundEvent> {
        if self.state != TranslatorState::NotStarted {
            return Vec::new();
        }
        self.state = TranslatorState::Started { text_open: false };
        vec![
            OutboundEvent::start(self.message_id.clone()),
            OutboundEvent::StartStep,
        ]
    }

    pub fn on_event(&mut self, event: ProviderEvent) -> Vec<OutboundEvent> {
        if self.is_terminal() {
            tracing::debug!(?event, "Ignoring provider event after stream end");
            return Vec::new();
        }
        let mut out = self.start();

        match event {
            ProviderEvent::TextDelta(delta) => self.on_text(delta, &mut out),
            ProviderEvent::ToolCall { id, name, args } => self.on_tool_call(id, name, args, &mut out),
            ProviderEvent::ToolResult { id, result } => self.on_tool_result(id, result, &mut out),
            ProviderEvent::RunResult { .. } => self.finish_into(&mut out),
        }
        out
    }

    /// Terminate with a single error frame. An open text block stays open.
    pub fn on_error(&mut self, error: &ProviderError) -> Vec<OutboundEvent> {
        if self.is_terminal() {
            return Vec::new();
        }
        let mut out = self.start();
        tracing::error!(
            message_id = %self.message_id,
            error = %error,
            code = %error.error_code(),
            "Provider stream failed"
        );
        out.push(OutboundEvent::error(error.user_message()));
        self.state = TranslatorState::Errored;
        out
    }

    /// Close the session when the provider stream ended without a run result.
    pub fn finish(&mut self) -> Vec<OutboundEvent> {
        if self.is_terminal() {
            return Vec::new();
        }
        let mut out = self.start();
        self.finish_into(&mut out);
        out
    }

    fn text_open(&self) -> bool {
        matches!(self.state, TranslatorState::Started { text_open: true })
    }

    fn close_text(&mut self, out: &mut Vec<OutboundEvent>) {
        if self.text_open() {
            out.push(OutboundEvent::text_end());
            self.state = TranslatorState::Started { text_open: false };
        }
    }

    fn on_text(&mut self, delta: String, out: &mut Vec<OutboundEvent>) {
        if delta.is_empty() {
            return;
        }
        if !self.text_open() {
            out.push(OutboundEvent::text_start());
            self.state = TranslatorState::Started { text_open: true };
        }
        out.push(OutboundEvent::text_delta(delta));
    }

    fn on_tool_call(
        &mut self,
        id: Option<String>,
        name: String,
        args: Value,
        out: &mut Vec<OutboundEvent>,
    ) {
        let Some(id) = id.filter(|id| !id.is_empty()) else {
            tracing::warn!(tool_name = %name, "Skipping tool call without id");
            return;
        };
        if self.announced_tools.contains(&id) {
            tracing::debug!(tool_call_id = %id, "Skipping duplicate tool call");
            return;
        }
        self.close_text(out);
        out.push(OutboundEvent::ToolInputAvailable {
            tool_call_id: id.clone(),
            tool_name: name,
            input: normalize_tool_input(args),
        });
        self.announced_tools.insert(id);
    }

    fn on_tool_result(&mut self, id: String, result: Option<Value>, out: &mut Vec<OutboundEvent>) {
        if !self.announced_tools.contains(&id) {
            tracing::warn!(tool_call_id = %id, "Dropping result for unannounced tool call");
            return;
        }
        if !self.completed_tools.insert(id.clone()) {
            tracing::debug!(tool_call_id = %id, "Skipping duplicate tool result");
            return;
        }
        out.push(OutboundEvent::ToolOutputAvailable {
            tool_call_id: id,
            output: normalize_tool_output(result),
        });
    }

    fn finish_into(&mut self, out: &mut Vec<OutboundEvent>) {
        self.close_text(out);
        out.push(OutboundEvent::FinishStep);
        out.push(OutboundEvent::finish(FinishReason::Stop));
        self.state = TranslatorState::Finished;
    }
}

/// Tool input is always an object.
///
/// JSON-encoded strings are parsed; unparseable or non-object strings become
/// `{"raw": <string>}`; any other non-object becomes `{}`.
pub fn normalize_tool_input(args: Value) -> Value {
    match args {
        Value::Object(_) => args,
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => json!({ "raw": raw }),
        },
        _ => Value::Object(Map::new()),
    }
}

/// Tool output: absent → `{"result": null}`; JSON strings are parsed;
/// other strings become `{"result": <string>}`; structured values pass through.
pub fn normalize_tool_output(result: Option<Value>) -> Value {
    match result {
        None | Some(Value::Null) => json!({ "result": null }),
        Some(Value::String(s)) => {
            serde_json::from_str::<Value>(&s).unwrap_or_else(|_| json!({ "result": s }))
        }
        Some(other) => other,
    }
}

/// Drive a translator over a provider stream.
///
/// The output always opens with `start, start-step` and ends with exactly
/// one of `finish-step, finish` or `error`.
pub fn translate(mut events: ProviderEventStream) -> impl Stream<Item = OutboundEvent> + Send {
    async_stream::stream! {
        let mut translator = StreamTranslator::new();
        for event in translator.start() {
            yield event;
        }

        while let Some(item) = events.next().await {
            let out = match item {
                Ok(event) => translator.on_event(event),
                Err(e) => translator.on_error(&e),
            };
            for event in out {
                yield event;
            }
            if translator.is_terminal() {
                break;
            }
        }

        for event in translator.finish() {
            yield event;
        }
    }
}
