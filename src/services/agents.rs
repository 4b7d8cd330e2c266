//! Chat agents and the named-agent registry.
//!
//! An [`Agent`] is a system prompt, a provider model and a [`ToolSet`]. It
//! drives the tool loop itself: call the provider, run any requested tools,
//! feed their results back, and stop at the first response without tool
//! calls.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::services::provider::{ChatCompletionRequest, Delta, ProviderClient, ProviderError};
use crate::services::tools::{AnalyzeComplexity, CurrentContext, SearchNotes, ToolSet};
use crate::transformer::{ProviderEvent, ProviderEventStream, ProviderMessage, ToolCallSpec};

/// Upper bound on provider round-trips per run.
pub const MAX_TOOL_STEPS: usize = 8;

pub const DEFAULT_AGENT: &str = "chat";

const RESEARCH_SYSTEM_PROMPT: &str = "You are a research assistant that helps users find and synthesize information.

Your capabilities:
- Searching for relevant information
- Summarizing findings clearly
- Citing sources when available
- Asking clarifying questions when needed

Always provide accurate, well-organized responses. If you're unsure about something, say so.";

const CODE_REVIEW_SYSTEM_PROMPT: &str = "You are an expert code reviewer. Your role is to:

1. Analyze code for bugs, security issues, and performance problems
2. Suggest improvements following best practices
3. Explain your reasoning clearly
4. Be constructive and educational in feedback

When reviewing code:
- Check for common vulnerabilities (injection, XSS, etc.)
- Identify logic errors and edge cases
- Suggest cleaner, more readable alternatives
- Note any missing error handling";

const MAIN_SYSTEM_PROMPT: &str = "You are a helpful, harmless, and honest AI assistant.

Your capabilities:
- Engaging in natural, helpful conversations
- Answering questions clearly and accurately
- Helping with a wide variety of tasks
- Asking clarifying questions when needed

Always be helpful while being truthful. If you're unsure about something, say so.";

#[async_trait]
pub trait ChatAgent: Send + Sync {
    fn name(&self) -> &str;

    /// Run to completion and return the final text.
    async fn run(&self, prompt: &str, history: &[ProviderMessage]) -> Result<String, ProviderError>;

    /// Run as a single-pass event stream. An `Err` item ends the stream.
    fn stream_events(&self, prompt: String, history: Vec<ProviderMessage>) -> ProviderEventStream;
}

#[derive(Clone)]
pub struct Agent {
    name: String,
    model: String,
    system_prompt: Option<String>,
    tools: ToolSet,
    provider: Arc<ProviderClient>,
    max_tokens: Option<u32>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("tools", &self.tools)
            .finish()
    }
}

impl Agent {
    pub fn new(name: impl Into<String>, model: impl Into<String>, provider: Arc<ProviderClient>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            system_prompt: None,
            tools: ToolSet::new(),
            provider,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// System prompt, then history, then the prompt as a user turn.
    pub fn build_messages(&self, prompt: &str, history: &[ProviderMessage]) -> Vec<ProviderMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(system) = &self.system_prompt {
            messages.push(ProviderMessage::system(system.clone()));
        }
        messages.extend_from_slice(history);
        messages.push(ProviderMessage::user(prompt));
        messages
    }

    fn request(&self, messages: Vec<ProviderMessage>) -> ChatCompletionRequest {
        let mut request =
            ChatCompletionRequest::new(self.model.clone(), messages).with_tools(self.tools.definitions());
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }

    /// Execute requested tools, appending the assistant and tool turns.
    async fn run_tools(
        &self,
        text: String,
        calls: &[ToolCallSpec],
        messages: &mut Vec<ProviderMessage>,
    ) -> Vec<(String, Value)> {
        messages.push(ProviderMessage::Assistant {
            content: (!text.is_empty()).then_some(text),
            tool_calls: calls.to_vec(),
        });

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self.tools.execute(&call.function.name, &call.function.arguments).await;
            tracing::debug!(
                agent = %self.name,
                tool_name = %call.function.name,
                tool_call_id = %call.id,
                "Tool executed"
            );
            messages.push(ProviderMessage::tool(call.id.clone(), result.to_string()));
            results.push((call.id.clone(), result));
        }
        results
    }
}

/// Providers occasionally omit call ids; the follow-up tool turn needs one.
fn ensure_call_ids(calls: &mut [ToolCallSpec]) {
    for call in calls.iter_mut().filter(|c| c.id.is_empty()) {
        call.id = format!("call_{}", uuid::Uuid::new_v4().simple());
    }
}

fn step_limit_error() -> ProviderError {
    ProviderError::InvalidRequest(format!(
        "Tool call limit exceeded ({} steps). Please simplify the request.",
        MAX_TOOL_STEPS
    ))
}

#[async_trait]
impl ChatAgent for Agent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, prompt: &str, history: &[ProviderMessage]) -> Result<String, ProviderError> {
        let mut messages = self.build_messages(prompt, history);

        for _ in 0..MAX_TOOL_STEPS {
            let completion = self.provider.complete(self.request(messages.clone())).await?;
            let mut calls = completion.tool_calls;
            if calls.is_empty() {
                return Ok(completion.content);
            }
            ensure_call_ids(&mut calls);
            self.run_tools(completion.content, &calls, &mut messages).await;
        }
        Err(step_limit_error())
    }

    fn stream_events(&self, prompt: String, history: Vec<ProviderMessage>) -> ProviderEventStream {
        let agent = self.clone();

        Box::pin(async_stream::stream! {
            let mut messages = agent.build_messages(&prompt, &history);

            for step in 0..MAX_TOOL_STEPS {
                let mut deltas = match agent.provider.stream_chat(agent.request(messages.clone())).await {
                    Ok(deltas) => deltas,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                let mut text = String::new();
                let mut calls = Vec::new();
                while let Some(delta) = deltas.next().await {
                    match delta {
                        Ok(Delta::Text(chunk)) => {
                            text.push_str(&chunk);
                            yield Ok(ProviderEvent::TextDelta(chunk));
                        }
                        Ok(Delta::ToolCalls(batch)) => calls.extend(batch),
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }

                if calls.is_empty() {
                    yield Ok(ProviderEvent::RunResult { text });
                    return;
                }

                tracing::debug!(agent = %agent.name, step, tool_calls = calls.len(), "Model requested tools");
                ensure_call_ids(&mut calls);
                for call in &calls {
                    yield Ok(ProviderEvent::ToolCall {
                        id: Some(call.id.clone()),
                        name: call.function.name.clone(),
                        args: Value::String(call.function.arguments.clone()),
                    });
                }
                for (id, result) in agent.run_tools(text, &calls, &mut messages).await {
                    yield Ok(ProviderEvent::ToolResult { id, result: Some(result) });
                }
            }

            yield Err(step_limit_error());
        })
    }
}

/// Stream that fails immediately with `error`.
pub fn failing_stream(error: ProviderError) -> ProviderEventStream {
    Box::pin(futures::stream::once(async move { Err(error) }))
}

// ============================================================================
// Registry
// ============================================================================

/// Builds a named agent for a provider model.
pub type AgentFactory = fn(&str, Arc<ProviderClient>) -> Agent;

fn research_agent(model: &str, provider: Arc<ProviderClient>) -> Agent {
    Agent::new("research", model, provider)
        .with_system_prompt(RESEARCH_SYSTEM_PROMPT)
        .with_tools(ToolSet::new().with(SearchNotes))
}

fn code_review_agent(model: &str, provider: Arc<ProviderClient>) -> Agent {
    Agent::new("code_review", model, provider)
        .with_system_prompt(CODE_REVIEW_SYSTEM_PROMPT)
        .with_tools(ToolSet::new().with(AnalyzeComplexity))
}

fn main_agent(model: &str, provider: Arc<ProviderClient>) -> Agent {
    Agent::new("main", model, provider)
        .with_system_prompt(MAIN_SYSTEM_PROMPT)
        .with_tools(ToolSet::new().with(CurrentContext))
}

/// Name to factory table, built once at startup.
#[derive(Clone)]
pub struct AgentRegistry {
    factories: HashMap<&'static str, AgentFactory>,
    provider: Arc<ProviderClient>,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}

impl AgentRegistry {
    pub fn new(provider: Arc<ProviderClient>) -> Self {
        Self {
            factories: HashMap::new(),
            provider,
        }
    }

    /// The `main`, `research` and `code_review` agents.
    pub fn builtin(provider: Arc<ProviderClient>) -> Self {
        Self::new(provider)
            .register("main", main_agent)
            .register("research", research_agent)
            .register("code_review", code_review_agent)
    }

    pub fn register(mut self, name: &'static str, factory: AgentFactory) -> Self {
        self.factories.insert(name, factory);
        self
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Plain chat agent. Only the display tools named in `tools` are offered.
    pub fn default_agent(&self, model: &str, tools: Option<&[String]>) -> Agent {
        Agent::new(DEFAULT_AGENT, model, self.provider.clone())
            .with_tools(ToolSet::display_filtered(tools))
    }

    /// Pick the agent for a request. `None` selects the default chat agent.
    pub fn resolve(
        &self,
        name: Option<&str>,
        model: &str,
        tools: Option<&[String]>,
    ) -> Result<Arc<dyn ChatAgent>, ProviderError> {
        let Some(name) = name else {
            return Ok(Arc::new(self.default_agent(model, tools)));
        };

        match self.factories.get(name) {
            Some(factory) => Ok(Arc::new(factory(model, self.provider.clone()))),
            None => Err(ProviderError::UnknownAgent(format!(
                "Unknown agent: '{}'. Available agents: {}",
                name,
                self.names().join(", ")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::OpenAiConfig;
    use crate::core::retry::RetryPolicy;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn provider(base_url: &str) -> Arc<ProviderClient> {
        let config = OpenAiConfig {
            api_key: "sk-test".to_string(),
            ..Default::default()
        };
        let retry = RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        };
        Arc::new(ProviderClient::new(&config, retry).unwrap().with_base_url(base_url))
    }

    fn sse(chunks: &[Value]) -> String {
        let mut body: String = chunks.iter().map(|c| format!("data: {}\n\n", c)).collect();
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[test]
    fn test_builtin_names_sorted() {
        let registry = AgentRegistry::builtin(provider("http://localhost"));
        assert_eq!(registry.names(), vec!["code_review", "main", "research"]);
    }

    #[test]
    fn test_resolve_default_and_named() {
        let registry = AgentRegistry::builtin(provider("http://localhost"));
        assert_eq!(registry.resolve(None, "gpt-4o", None).unwrap().name(), DEFAULT_AGENT);
        assert_eq!(
            registry.resolve(Some("research"), "gpt-4o", None).unwrap().name(),
            "research"
        );
    }

    #[test]
    fn test_resolve_unknown_lists_available() {
        let registry = AgentRegistry::builtin(provider("http://localhost"));
        let err = registry.resolve(Some("pirate"), "gpt-4o", None).err().unwrap();
        assert_matches!(
            err,
            ProviderError::UnknownAgent(ref msg)
                if msg == "Unknown agent: 'pirate'. Available agents: code_review, main, research"
        );
    }

    #[test]
    fn test_default_agent_filters_display_tools() {
        let registry = AgentRegistry::builtin(provider("http://localhost"));
        let tools = vec!["generateCode".to_string()];
        let agent = registry.default_agent("gpt-4o", Some(tools.as_slice()));
        assert_eq!(agent.tools().names(), vec!["generateCode"]);
    }

    #[test]
    fn test_default_agent_without_tools_is_plain() {
        let registry = AgentRegistry::builtin(provider("http://localhost"));
        assert!(registry.default_agent("gpt-4o", None).tools().is_empty());
    }

    #[test]
    fn test_build_messages_order() {
        let agent = Agent::new("a", "m", provider("http://localhost")).with_system_prompt("sys");
        let messages = agent.build_messages("now", &[ProviderMessage::user("before")]);
        assert_eq!(
            messages,
            vec![
                ProviderMessage::system("sys"),
                ProviderMessage::user("before"),
                ProviderMessage::user("now"),
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_stream_yields_single_error() {
        let items: Vec<_> = failing_stream(ProviderError::Timeout).collect().await;
        assert_eq!(items.len(), 1);
        assert_matches!(items[0], Err(ProviderError::Timeout));
    }

    #[tokio::test]
    async fn test_run_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Rust Tips"}, "finish_reason": "stop"}]
            })))
            .mount(&server)
            .await;

        let agent = Agent::new("title", "gpt-4o-mini", provider(&server.uri()));
        assert_eq!(agent.run("hi", &[]).await.unwrap(), "Rust Tips");

        let requests = server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(sent.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn test_run_sends_max_tokens_when_capped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Short"}, "finish_reason": "stop"}]
            })))
            .mount(&server)
            .await;

        let agent = Agent::new("title", "gpt-4o-mini", provider(&server.uri())).with_max_tokens(60);
        agent.run("hi", &[]).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(sent["max_tokens"], 60);
        assert!(sent.get("tools").is_none());
    }

    #[tokio::test]
    async fn test_stream_runs_tool_loop() {
        let server = MockServer::start().await;

        // Second round-trip carries the tool turn and ends with text.
        Mock::given(method("POST"))
            .and(|req: &Request| String::from_utf8_lossy(&req.body).contains(r#""role":"tool""#))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse(&[
                json!({"choices": [{"delta": {"content": "done"}}]}),
                json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}),
            ])))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse(&[
                json!({"choices": [{"delta": {"tool_calls": [
                    {"index": 0, "id": "tc1", "function": {"name": "generateCode", "arguments": "{\"language\":\"rust\",\"code\":\"x\"}"}}
                ]}}]}),
                json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
            ])))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let agent = Agent::new(DEFAULT_AGENT, "gpt-4o", provider(&server.uri()))
            .with_tools(ToolSet::display());
        let events: Vec<ProviderEvent> = agent
            .stream_events("show code".into(), vec![])
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                ProviderEvent::ToolCall {
                    id: Some("tc1".into()),
                    name: "generateCode".into(),
                    args: json!("{\"language\":\"rust\",\"code\":\"x\"}"),
                },
                ProviderEvent::ToolResult {
                    id: "tc1".into(),
                    result: Some(json!({"type": "code", "language": "rust", "code": "x"})),
                },
                ProviderEvent::TextDelta("done".into()),
                ProviderEvent::RunResult { text: "done".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_open_error_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such model"))
            .mount(&server)
            .await;

        let agent = Agent::new(DEFAULT_AGENT, "gpt-9", provider(&server.uri()));
        let items: Vec<_> = agent.stream_events("hi".into(), vec![]).collect().await;
        assert_eq!(items.len(), 1);
        assert_matches!(items[0], Err(ProviderError::Http { status: 404, .. }));
    }
}
