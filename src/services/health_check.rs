//! Health check service for the upstream provider.
//!
//! Reachability is probed with `GET {base_url}/models`, which costs no
//! tokens and verifies both connectivity and the API key.

use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use std::time::Instant;
use tokio::time::{timeout, Duration};

use crate::api::models::{ComponentHealth, HealthChecks, HealthResponse, HealthStatus};
use crate::core::config::HealthConfig;

/// Latency above which a healthy provider is reported as degraded.
pub const LATENCY_DEGRADED_MS: u64 = 2000;

#[derive(Debug, Clone)]
pub struct HealthChecker {
    client: Client,
    base_url: String,
    api_key: String,
    enabled: bool,
    timeout_secs: u64,
}

impl HealthChecker {
    pub fn new(client: Client, base_url: &str, api_key: &str, config: &HealthConfig) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            enabled: config.openai_check_enabled,
            timeout_secs: config.timeout_seconds,
        }
    }

    pub async fn check_openai(&self) -> ComponentHealth {
        if !self.enabled {
            return ComponentHealth::healthy(None).with_message("Check disabled");
        }
        if self.api_key.is_empty() {
            return ComponentHealth::unhealthy("OpenAI API key not configured");
        }

        let request = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send();

        let start_time = Instant::now();
        let result = timeout(Duration::from_secs(self.timeout_secs), request).await;
        let latency_ms = start_time.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(response)) => match response.status().as_u16() {
                200 if latency_ms > LATENCY_DEGRADED_MS => ComponentHealth {
                    status: HealthStatus::Degraded,
                    latency_ms: Some(latency_ms),
                    error: None,
                    message: Some("High latency detected".to_string()),
                },
                200 => ComponentHealth::healthy(Some(latency_ms)),
                401 => ComponentHealth::unhealthy("Invalid API key"),
                code => ComponentHealth::unhealthy(format!("Unexpected status code: {}", code)),
            },
            Ok(Err(e)) if e.is_timeout() => ComponentHealth::unhealthy("Connection timeout"),
            Ok(Err(e)) if e.is_connect() => {
                ComponentHealth::unhealthy(format!("Connection failed: {}", e))
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Unexpected error during OpenAI health check");
                ComponentHealth::unhealthy("Unexpected error during health check")
            }
            Err(_) => ComponentHealth::unhealthy("Connection timeout"),
        }
    }

    pub async fn check(&self) -> HealthResponse {
        let openai = self.check_openai().await;
        if openai.status != HealthStatus::Healthy {
            tracing::warn!(
                status = ?openai.status,
                error = ?openai.error,
                message = ?openai.message,
                "OpenAI health check not healthy"
            );
        }

        HealthResponse {
            status: overall_status([&openai]),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            checks: HealthChecks { openai },
        }
    }
}

/// Worst component status; healthy when there are none.
pub fn overall_status<'a>(checks: impl IntoIterator<Item = &'a ComponentHealth>) -> HealthStatus {
    checks
        .into_iter()
        .map(|c| c.status)
        .max()
        .unwrap_or(HealthStatus::Healthy)
}
