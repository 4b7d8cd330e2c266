//! Prometheus metrics for monitoring the chat gateway.
//!
//! This module provides a centralized metrics registry for request traffic,
//! latency, live streams and how each stream ended.

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec, GaugeVec, HistogramVec,
    IntCounterVec,
};
use std::sync::OnceLock;

/// How a chat stream ended, as seen by the transport wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Error,
    Timeout,
    Cancelled,
    Disconnected,
    Interrupted,
}

impl StreamOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Disconnected => "disconnected",
            Self::Interrupted => "interrupted",
        }
    }
}

/// Container for all application metrics.
pub struct Metrics {
    /// Total number of requests by method, endpoint, and status
    pub request_count: IntCounterVec,

    /// Request duration histogram in seconds (TTFB for streams)
    pub request_duration: HistogramVec,

    /// Number of currently active requests by endpoint
    pub active_requests: GaugeVec,

    /// Number of chat streams currently being written
    pub active_streams: GaugeVec,

    /// Finished chat streams by outcome
    pub stream_outcomes: IntCounterVec,

    /// Chat stream wall-clock duration in seconds
    pub stream_duration: HistogramVec,

    /// Provider call latency in seconds by operation and status
    pub provider_latency: HistogramVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// Safe to call repeatedly; every call returns the same instance.
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let request_count = register_int_counter_vec!(
            "chat_gateway_requests_total",
            "Total number of requests",
            &["method", "endpoint", "status_code"]
        )
        .expect("Failed to register request_count metric");

        let request_duration = register_histogram_vec!(
            "chat_gateway_request_duration_seconds",
            "Request duration in seconds",
            &["method", "endpoint"],
            vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]
        )
        .expect("Failed to register request_duration metric");

        let active_requests = register_gauge_vec!(
            "chat_gateway_active_requests",
            "Number of active requests",
            &["endpoint"]
        )
        .expect("Failed to register active_requests metric");

        let active_streams = register_gauge_vec!(
            "chat_gateway_active_streams",
            "Number of chat streams currently open",
            &["agent"]
        )
        .expect("Failed to register active_streams metric");

        let stream_outcomes = register_int_counter_vec!(
            "chat_gateway_stream_outcomes_total",
            "Finished chat streams by outcome",
            &["outcome"]
        )
        .expect("Failed to register stream_outcomes metric");

        let stream_duration = register_histogram_vec!(
            "chat_gateway_stream_duration_seconds",
            "Chat stream duration in seconds",
            &["outcome"],
            vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
        )
        .expect("Failed to register stream_duration metric");

        let provider_latency = register_histogram_vec!(
            "chat_gateway_provider_latency_seconds",
            "Provider response latency in seconds",
            &["operation", "status"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]
        )
        .expect("Failed to register provider_latency metric");

        Metrics {
            request_count,
            request_duration,
            active_requests,
            active_streams,
            stream_outcomes,
            stream_duration,
            provider_latency,
        }
    })
}

/// Get the global metrics instance, initializing it on first use.
pub fn get_metrics() -> &'static Metrics {
    init_metrics()
}

/// Count a finished stream and its duration.
pub fn record_stream_outcome(outcome: StreamOutcome, duration_secs: f64) {
    let metrics = get_metrics();
    metrics
        .stream_outcomes
        .with_label_values(&[outcome.as_str()])
        .inc();
    metrics
        .stream_duration
        .with_label_values(&[outcome.as_str()])
        .observe(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let metrics = init_metrics();
        metrics
            .request_count
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let metrics2 = get_metrics();
        assert!(std::ptr::eq(metrics, metrics2));
    }

    #[test]
    fn test_request_count_metric() {
        let metrics = init_metrics();
        let labels = ["POST", "/chat-unique", "201"];

        let initial = metrics.request_count.with_label_values(&labels).get();
        metrics.request_count.with_label_values(&labels).inc();
        let after = metrics.request_count.with_label_values(&labels).get();

        assert_eq!(after, initial + 1);
    }

    #[test]
    fn test_active_streams_metric() {
        let metrics = init_metrics();
        let gauge = metrics.active_streams.with_label_values(&["test-agent"]);

        let initial = gauge.get();
        gauge.inc();
        assert_eq!(gauge.get(), initial + 1.0);
        gauge.dec();
        assert_eq!(gauge.get(), initial);
    }

    #[test]
    fn test_record_stream_outcome() {
        let metrics = init_metrics();
        let counter = metrics
            .stream_outcomes
            .with_label_values(&[StreamOutcome::Interrupted.as_str()]);

        let initial = counter.get();
        record_stream_outcome(StreamOutcome::Interrupted, 0.25);
        assert!(counter.get() > initial);
        assert!(
            metrics
                .stream_duration
                .with_label_values(&["interrupted"])
                .get_sample_count()
                > 0
        );
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(StreamOutcome::Completed.as_str(), "completed");
        assert_eq!(StreamOutcome::Disconnected.as_str(), "disconnected");
        assert_eq!(StreamOutcome::Timeout.as_str(), "timeout");
    }
}
