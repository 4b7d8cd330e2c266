use crate::core::metrics::{get_metrics, record_stream_outcome, StreamOutcome};
use crate::core::StreamCancelHandle;
use axum::body::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

/// Response body wrapper that fires its cancel handle when dropped.
///
/// hyper drops the body as soon as the client goes away, so a drop before
/// the inner stream marked the handle completed is a client disconnect.
/// The wrapper also owns the `active_streams` gauge for its lifetime.
pub struct DisconnectStream<S> {
    pub stream: S,
    pub cancel_handle: StreamCancelHandle,
    agent: String,
    started: Instant,
}

impl<S> DisconnectStream<S> {
    pub fn new(stream: S, cancel_handle: StreamCancelHandle, agent: impl Into<String>) -> Self {
        let agent = agent.into();
        get_metrics()
            .active_streams
            .with_label_values(&[agent.as_str()])
            .inc();
        Self {
            stream,
            cancel_handle,
            agent,
            started: Instant::now(),
        }
    }
}

impl<S, E> Stream for DisconnectStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl<S> Drop for DisconnectStream<S> {
    fn drop(&mut self) {
        if !self.cancel_handle.is_completed() {
            tracing::info!(
                agent = %self.agent,
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                "Client disconnected before stream completed"
            );
            record_stream_outcome(
                StreamOutcome::Disconnected,
                self.started.elapsed().as_secs_f64(),
            );
        }
        self.cancel_handle.cancel();
        get_metrics()
            .active_streams
            .with_label_values(&[self.agent.as_str()])
            .dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::convert::Infallible;

    fn body(chunks: &[&'static str]) -> impl Stream<Item = Result<Bytes, Infallible>> + Unpin {
        futures::stream::iter(
            chunks
                .iter()
                .map(|c| Ok::<_, Infallible>(Bytes::from_static(c.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_passes_chunks_through() {
        let handle = StreamCancelHandle::new();
        let stream = DisconnectStream::new(body(&["a", "b"]), handle, "test");
        let chunks: Vec<_> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec![Bytes::from("a"), Bytes::from("b")]);
    }

    #[test]
    fn test_drop_without_completion_cancels() {
        let handle = StreamCancelHandle::new();
        drop(DisconnectStream::new(body(&["a"]), handle.clone(), "test"));
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_drop_after_completion_is_not_a_disconnect() {
        let handle = StreamCancelHandle::new();
        let stream = DisconnectStream::new(body(&["a"]), handle.clone(), "test");
        handle.mark_completed();
        drop(stream);
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn test_active_streams_gauge_balanced() {
        let gauge = get_metrics()
            .active_streams
            .with_label_values(&["gauge-balance"]);
        let before = gauge.get();

        let stream = DisconnectStream::new(body(&[]), StreamCancelHandle::new(), "gauge-balance");
        assert_eq!(gauge.get(), before + 1.0);
        drop(stream);
        assert_eq!(gauge.get(), before);
    }
}
