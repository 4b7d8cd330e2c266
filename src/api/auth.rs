//! API key authentication.
//!
//! Keys are accepted from `X-API-Key` (preferred) or `Authorization: Bearer`
//! and compared by SHA-256 digest against the configured keys.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::api::handlers::AppState;
use crate::core::config::{AuthConfig, AuthMode};
use crate::core::error::Result;
use crate::core::logging::API_KEY_NAME;
use crate::core::AppError;

/// Paths served without credentials.
const PUBLIC_PATHS: &[&str] = &["/health", "/health/live", "/health/ready", "/metrics"];

/// A configured key, stored by digest.
#[derive(Debug, Clone)]
pub struct Credential {
    pub key_hash: String,
    pub name: String,
}

/// Resolved authentication settings, built once at startup.
#[derive(Debug, Clone)]
pub struct Authenticator {
    mode: AuthMode,
    credentials: Vec<Credential>,
}

/// Hash an API key using SHA-256.
pub fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extract API key from headers; x-api-key takes priority.
fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .or_else(|| extract_bearer(headers))
}

/// Extract Bearer token from Authorization header.
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .filter(|s| !s.is_empty())
}

impl Authenticator {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            mode: config.mode,
            credentials: config
                .api_keys
                .iter()
                .map(|k| Credential {
                    key_hash: hash_key(&k.key),
                    name: k.name.clone(),
                })
                .collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mode != AuthMode::None
    }

    /// Verify the request headers.
    ///
    /// * `Ok(None)` - authentication disabled
    /// * `Ok(Some(name))` - matched key's name
    /// * `Err(AuthRequired)` - no key supplied
    /// * `Err(Unauthorized)` - key did not match
    pub fn verify(&self, headers: &HeaderMap) -> Result<Option<String>> {
        if !self.is_enabled() {
            return Ok(None);
        }

        let provided_key = extract_api_key(headers).ok_or(AppError::AuthRequired)?;
        let provided_hash = hash_key(provided_key);

        self.credentials
            .iter()
            .find(|c| c.key_hash == provided_hash)
            .map(|c| {
                tracing::debug!(credential_name = %c.name, "Authentication successful");
                Some(c.name.clone())
            })
            .ok_or(AppError::Unauthorized)
    }
}

/// Reject unauthenticated requests before they reach a handler.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    match state.auth.verify(request.headers()) {
        Ok(Some(name)) => API_KEY_NAME.scope(name, next.run(request)).await,
        Ok(None) => next.run(request).await,
        Err(e) => {
            tracing::warn!(
                path = %request.uri().path(),
                code = %e.code(),
                "Authentication failed"
            );
            e.into_response()
        }
    }
}
