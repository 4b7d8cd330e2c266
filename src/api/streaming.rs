//! Server-Sent Events (SSE) output for chat streams.
//!
//! Outbound events are encoded as `data: <json>\n\n` frames and passed
//! through [`guard_stream`], which enforces the wall-clock limit, stops on
//! client disconnect, and makes sure every other exit path ends with a
//! well-formed finish and the `[DONE]` sentinel.

use crate::api::disconnect::DisconnectStream;
use crate::api::events::OutboundEvent;
use crate::core::error::AppError;
use crate::core::error_types::STREAM_INTERRUPTED_MESSAGE;
use crate::core::metrics::{record_stream_outcome, StreamOutcome};
use crate::core::middleware::REQUEST_ID_HEADER;
use crate::core::StreamCancelHandle;
use crate::transformer::{format_sse_data, format_sse_done};
use axum::body::{Body, Bytes};
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue};
use axum::response::Response;
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::time::{Duration, Instant};

const FINISH_STEP_FRAME: &str = "data: {\"type\":\"finish-step\"}\n\n";
const FINISH_STOP_FRAME: &str = "data: {\"type\":\"finish\",\"finishReason\":\"stop\"}\n\n";

const FINISH_PREFIX: &str = "data: {\"type\":\"finish\"";
const ERROR_PREFIX: &str = "data: {\"type\":\"error\"";

/// Encode one event as an SSE data frame.
pub fn encode_event(event: &OutboundEvent) -> Result<String, serde_json::Error> {
    Ok(format_sse_data(&event.to_json_string()?))
}

/// Encode a whole event sequence and append the `[DONE]` sentinel.
pub fn encode_event_stream<S>(events: S) -> impl Stream<Item = Result<String, AppError>> + Send
where
    S: Stream<Item = OutboundEvent> + Send,
{
    events
        .map(|event| encode_event(&event).map_err(AppError::from))
        .chain(stream::once(async { Ok(format_sse_done()) }))
}

fn interrupted_frame() -> String {
    format!(
        "data: {{\"type\":\"error\",\"errorText\":\"{}\"}}\n\n",
        STREAM_INTERRUPTED_MESSAGE
    )
}

fn is_done_frame(frame: &str) -> bool {
    frame.trim_end() == "data: [DONE]"
}

/// Frames needed to close a stream cut short by timeout or shutdown.
fn closing_frames(terminal_seen: bool, done_sent: bool) -> Vec<String> {
    let mut frames = Vec::with_capacity(3);
    if !terminal_seen {
        frames.push(FINISH_STEP_FRAME.to_string());
        frames.push(FINISH_STOP_FRAME.to_string());
    }
    if !done_sent {
        frames.push(format_sse_done());
    }
    frames
}

/// Limits and signals observed by [`guard_stream`].
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Wall-clock limit for the whole stream.
    pub timeout: Duration,
    /// Cancelled when the client goes away.
    pub disconnect: StreamCancelHandle,
    /// Cancelled when the server shuts down.
    pub shutdown: StreamCancelHandle,
    pub request_id: String,
}

impl GuardConfig {
    pub fn new(timeout: Duration, shutdown: StreamCancelHandle) -> Self {
        Self {
            timeout,
            disconnect: StreamCancelHandle::new(),
            shutdown,
            request_id: String::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

enum Step {
    Frame(Option<Result<String, AppError>>),
    Disconnected,
    Shutdown,
    TimedOut,
}

/// Wrap encoded frames with the disconnect, timeout and shutdown contract.
///
/// | exit | frames written after the cut |
/// |---|---|
/// | normal end | `[DONE]` if the inner stream did not send it |
/// | disconnect | nothing |
/// | timeout, shutdown | `finish-step`, `finish(stop)` unless a finish or error was seen, then `[DONE]` |
/// | inner error | interrupted `error` frame unless a finish or error was seen, then `[DONE]` |
///
/// The disconnect handle is marked completed on every exit this function
/// observes itself.
pub fn guard_stream<S>(frames: S, config: GuardConfig) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = Result<String, AppError>> + Send + 'static,
{
    async_stream::stream! {
        let GuardConfig { timeout, disconnect, shutdown, request_id } = config;
        let started = Instant::now();
        let mut frames = Box::pin(frames);
        let mut deadline = Box::pin(tokio::time::sleep(timeout));
        let mut finish_seen = false;
        let mut error_seen = false;
        let mut done_sent = false;

        let outcome = loop {
            let step = tokio::select! {
                biased;
                _ = disconnect.cancelled() => Step::Disconnected,
                _ = shutdown.cancelled() => Step::Shutdown,
                _ = &mut deadline => Step::TimedOut,
                item = frames.next() => Step::Frame(item),
            };

            match step {
                Step::Frame(Some(Ok(frame))) => {
                    if disconnect.is_cancelled() {
                        break StreamOutcome::Disconnected;
                    }
                    if frame.starts_with(FINISH_PREFIX) {
                        finish_seen = true;
                    } else if frame.starts_with(ERROR_PREFIX) {
                        error_seen = true;
                    }
                    done_sent |= is_done_frame(&frame);
                    yield frame;
                    if done_sent {
                        break if error_seen { StreamOutcome::Error } else { StreamOutcome::Completed };
                    }
                }
                Step::Frame(Some(Err(e))) => {
                    tracing::error!(request_id = %request_id, error = %e, "Stream interrupted");
                    if !finish_seen && !error_seen {
                        yield interrupted_frame();
                    }
                    if !done_sent {
                        yield format_sse_done();
                    }
                    break StreamOutcome::Interrupted;
                }
                Step::Frame(None) => {
                    if !done_sent {
                        yield format_sse_done();
                    }
                    break if error_seen { StreamOutcome::Error } else { StreamOutcome::Completed };
                }
                Step::Disconnected => {
                    tracing::info!(request_id = %request_id, "Client disconnected, stopping stream");
                    break StreamOutcome::Disconnected;
                }
                Step::Shutdown => {
                    tracing::info!(request_id = %request_id, "Server shutting down, closing stream");
                    for frame in closing_frames(finish_seen || error_seen, done_sent) {
                        yield frame;
                    }
                    break StreamOutcome::Cancelled;
                }
                Step::TimedOut => {
                    tracing::warn!(
                        request_id = %request_id,
                        timeout_secs = timeout.as_secs(),
                        "Stream exceeded time limit"
                    );
                    for frame in closing_frames(finish_seen || error_seen, done_sent) {
                        yield frame;
                    }
                    break StreamOutcome::Timeout;
                }
            }
        };

        disconnect.mark_completed();
        let elapsed = started.elapsed();
        record_stream_outcome(outcome, elapsed.as_secs_f64());
        tracing::debug!(
            request_id = %request_id,
            outcome = outcome.as_str(),
            duration_ms = elapsed.as_millis() as u64,
            "Stream finished"
        );
    }
}

/// Build the SSE response around a guarded frame stream.
pub fn create_sse_response<S>(
    frames: S,
    cancel_handle: StreamCancelHandle,
    agent: &str,
    request_id: &str,
) -> Response
where
    S: Stream<Item = String> + Send + 'static,
{
    let body = DisconnectStream::new(
        Box::pin(frames.map(|frame| Ok::<_, Infallible>(Bytes::from(frame)))),
        cancel_handle,
        agent,
    );

    let mut response = Response::new(Body::from_stream(body));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        HeaderName::from_static("x-vercel-ai-ui-message-stream"),
        HeaderValue::from_static("v1"),
    );
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    response
}
