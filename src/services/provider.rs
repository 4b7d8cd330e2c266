//! OpenAI-compatible chat-completions client.
//!
//! Both entry points go through [`retry_with_backoff`]. For streaming calls
//! only opening the stream is retried; once bytes flow, a failure is
//! terminal for that stream.

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::core::config::OpenAiConfig;
use crate::core::error_types::{truncate_error_message, ErrorCode};
use crate::core::metrics::get_metrics;
use crate::core::retry::{retry_with_backoff, RetryPolicy};
use crate::transformer::{ProviderMessage, SseParser, ToolCallSpec};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("provider request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed to decode provider response: {0}")]
    Decode(String),

    #[error("provider stream failed: {0}")]
    Stream(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    UnknownAgent(String),

    #[error("giving up after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Http { status, .. } => ErrorCode::from_upstream_status(*status),
            Self::Timeout => ErrorCode::Timeout,
            Self::Connect(_) | Self::Stream(_) => ErrorCode::ServiceUnavailable,
            Self::Decode(_) => ErrorCode::ValidationError,
            Self::InvalidRequest(_) | Self::UnknownAgent(_) => ErrorCode::InvalidRequest,
            Self::RetryExhausted { source, .. } => source.error_code(),
        }
    }

    /// Message safe to show the client. Upstream detail is never included.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidRequest(msg) | Self::UnknownAgent(msg) => truncate_error_message(msg),
            Self::RetryExhausted { source, .. } => source.user_message(),
            _ => self.error_code().user_message().to_string(),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_builder() {
            Self::InvalidRequest(e.to_string())
        } else {
            Self::Stream(e.to_string())
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// Function tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ProviderMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ProviderMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            max_tokens: None,
            stream: false,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// First choice of a non-streaming completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub content: String,
    pub tool_calls: Vec<ToolCallSpec>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallSpec>>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: u32,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// One increment of a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    Text(String),
    /// Fully assembled tool calls, in index order.
    ToolCalls(Vec<ToolCallSpec>),
}

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<Delta, ProviderError>> + Send>>;

/// Collects tool call fragments by index until the choice finishes.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    calls: BTreeMap<u32, PartialToolCall>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl ToolCallAccumulator {
    fn push(&mut self, deltas: Vec<ToolCallDelta>) {
        for delta in deltas {
            let entry = self.calls.entry(delta.index).or_default();
            if let Some(id) = delta.id {
                entry.id = Some(id);
            }
            if let Some(function) = delta.function {
                if let Some(name) = function.name {
                    entry.name = Some(name);
                }
                if let Some(arguments) = function.arguments {
                    entry.arguments.push_str(&arguments);
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Drain complete calls. Fragments without a name are dropped.
    fn take(&mut self) -> Vec<ToolCallSpec> {
        std::mem::take(&mut self.calls)
            .into_values()
            .filter_map(|call| {
                let name = call.name?;
                let arguments = if call.arguments.is_empty() {
                    "{}".to_string()
                } else {
                    call.arguments
                };
                Some(ToolCallSpec::new(call.id.unwrap_or_default(), name, arguments))
            })
            .collect()
    }
}

/// Pull `error.message` out of an OpenAI error body, else the raw text.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    organization: Option<String>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ProviderClient {
    pub fn new(config: &OpenAiConfig, retry: RetryPolicy) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            organization: config.organization.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
            retry,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send a request and fail on non-2xx. Only waits for the response head.
    async fn send(&self, body: &ChatCompletionRequest) -> Result<reqwest::Response, ProviderError> {
        let mut request = self
            .http
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(body);
        if let Some(org) = &self.organization {
            request = request.header("OpenAI-Organization", org);
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| ProviderError::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message: extract_error_message(&text),
            });
        }
        Ok(response)
    }

    fn observe(operation: &str, started: Instant, result: &Result<impl Sized, ProviderError>) {
        let status = match result {
            Ok(_) => "ok".to_string(),
            Err(e) => e.error_code().as_str().to_lowercase(),
        };
        get_metrics()
            .provider_latency
            .with_label_values(&[operation, status.as_str()])
            .observe(started.elapsed().as_secs_f64());
    }

    /// Non-streaming completion.
    pub async fn complete(&self, mut request: ChatCompletionRequest) -> Result<Completion, ProviderError> {
        request.stream = false;
        let started = Instant::now();

        let result = retry_with_backoff(&self.retry, "chat_completion", || async {
            let response = self.send(&request).await?;
            let body = tokio::time::timeout(self.timeout, response.json::<CompletionResponse>())
                .await
                .map_err(|_| ProviderError::Timeout)??;
            Ok::<_, ProviderError>(body)
        })
        .await;
        Self::observe("complete", started, &result);

        let choice = result?
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Decode("response has no choices".to_string()))?;

        tracing::debug!(
            model = %request.model,
            finish_reason = ?choice.finish_reason,
            tool_calls = choice.message.tool_calls.as_ref().map_or(0, Vec::len),
            "Provider completion received"
        );

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
            finish_reason: choice.finish_reason,
        })
    }

    /// Streaming completion.
    ///
    /// Text is yielded as it arrives. Tool calls are yielded once their
    /// choice finishes (or the stream ends), fully assembled.
    pub async fn stream_chat(&self, mut request: ChatCompletionRequest) -> Result<DeltaStream, ProviderError> {
        request.stream = true;
        let started = Instant::now();

        let result = retry_with_backoff(&self.retry, "chat_completion_stream", || self.send(&request)).await;
        Self::observe("stream_open", started, &result);
        let response = result?;

        tracing::debug!(model = %request.model, "Provider stream opened");

        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut parser = SseParser::new();
            let mut tool_calls = ToolCallAccumulator::default();

            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(ProviderError::from(e));
                        return;
                    }
                };
                for event in parser.parse(&chunk) {
                    if event.is_done() {
                        break 'outer;
                    }
                    let Some(data) = event.data else { continue };
                    let parsed = match serde_json::from_str::<StreamChunk>(&data) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            yield Err(ProviderError::Decode(e.to_string()));
                            return;
                        }
                    };

                    for choice in parsed.choices {
                        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                            yield Ok(Delta::Text(text));
                        }
                        tool_calls.push(choice.delta.tool_calls.unwrap_or_default());
                        if choice.finish_reason.is_some() && !tool_calls.is_empty() {
                            yield Ok(Delta::ToolCalls(tool_calls.take()));
                        }
                    }
                }
            }

            if !parser.remaining().is_empty() {
                tracing::debug!(
                    bytes = parser.remaining().len(),
                    "Discarding unterminated SSE data at end of provider stream"
                );
            }
            if !tool_calls.is_empty() {
                yield Ok(Delta::ToolCalls(tool_calls.take()));
            }
        };

        Ok(Box::pin(stream))
    }
}
