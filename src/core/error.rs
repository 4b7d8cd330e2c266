//! Error types and handling for the chat gateway.
//!
//! This module provides a unified error type [`AppError`] for failures that
//! happen before a response stream commits. Each variant maps onto one
//! [`ErrorCode`] and renders as `{"detail", "code", "request_id"}`.

use crate::core::error_types::{truncate_error_message, ErrorCode};
use crate::core::logging::get_request_id;
use crate::services::provider::ProviderError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (file not found, parse errors, etc.)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Upstream provider failures
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No credentials were supplied
    #[error("Authentication required")]
    AuthRequired,

    /// Credentials were supplied but did not match
    #[error("Invalid authentication credentials")]
    Unauthorized,

    /// Client provided a structurally invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request body failed schema validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Generic internal server errors with custom message
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Structured error body returned for every synchronous failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub detail: String,
    pub code: ErrorCode,
    pub request_id: Option<String>,
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Config(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                ErrorCode::InternalError
            }
            AppError::Provider(e) => e.error_code(),
            AppError::AuthRequired => ErrorCode::AuthRequired,
            AppError::Unauthorized => ErrorCode::AuthInvalid,
            AppError::BadRequest(_) => ErrorCode::InvalidRequest,
            AppError::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Client-facing detail. Internal causes never leave the process.
    pub fn detail(&self) -> String {
        match self {
            AppError::BadRequest(msg) | AppError::Validation(msg) => truncate_error_message(msg),
            AppError::Provider(e) => e.user_message(),
            other => other.code().user_message().to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.code().http_status()
    }

    pub fn to_body(&self) -> ErrorResponse {
        let request_id = get_request_id();
        ErrorResponse {
            detail: self.detail(),
            code: self.code(),
            request_id: (!request_id.is_empty()).then_some(request_id),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = %self.code(), "Request failed");
        } else {
            tracing::debug!(error = %self, code = %self.code(), "Request rejected");
        }
        (status, Json(self.to_body())).into_response()
    }
}

/// Result type alias using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::logging::REQUEST_ID;
    use axum::body::to_bytes;

    async fn body_of(err: AppError) -> (StatusCode, ErrorResponse) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_bad_request_keeps_custom_detail() {
        let (status, body) =
            body_of(AppError::BadRequest("Messages array cannot be empty".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.detail, "Messages array cannot be empty");
        assert_eq!(body.code, ErrorCode::InvalidRequest);
        assert_eq!(body.request_id, None);
    }

    #[tokio::test]
    async fn test_validation_error_status() {
        let (status, body) = body_of(AppError::Validation("missing field `model`".into())).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.code, ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_unauthorized_status() {
        let (status, body) = body_of(AppError::Unauthorized).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.detail, "Invalid authentication credentials");
        assert_eq!(body.code, ErrorCode::AuthInvalid);
    }

    #[tokio::test]
    async fn test_auth_required_status() {
        let (status, body) = body_of(AppError::AuthRequired).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.code, ErrorCode::AuthRequired);
    }

    #[tokio::test]
    async fn test_internal_error_hides_cause() {
        let (status, body) = body_of(AppError::Internal("db password leaked".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.detail, ErrorCode::InternalError.user_message());
    }

    #[tokio::test]
    async fn test_provider_error_uses_classified_message() {
        let err = AppError::Provider(ProviderError::Http {
            status: 429,
            message: "slow down".into(),
        });
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body.code, ErrorCode::RateLimited);
        assert_eq!(body.detail, ErrorCode::RateLimited.user_message());
    }

    #[tokio::test]
    async fn test_provider_timeout_is_504() {
        let (status, body) = body_of(AppError::Provider(ProviderError::Timeout)).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body.code, ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn test_request_id_included_in_scope() {
        let (_, body) = REQUEST_ID
            .scope("req-123".to_string(), body_of(AppError::Internal("boom".into())))
            .await;
        assert_eq!(body.request_id.as_deref(), Some("req-123"));
    }

    #[tokio::test]
    async fn test_long_detail_truncated() {
        let (_, body) = body_of(AppError::BadRequest("x".repeat(800))).await;
        assert_eq!(body.detail.chars().count(), 500);
        assert!(body.detail.ends_with("..."));
    }

    #[test]
    fn test_error_display() {
        let err = AppError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = AppError::Internal("Something went wrong".to_string());
        assert_eq!(err.to_string(), "Internal server error: Something went wrong");
    }
}
