//! Shared error taxonomy for HTTP bodies and SSE error frames.
//!
//! Every failure that reaches a client is reduced to one [`ErrorCode`], and
//! only that code's fixed message (or a truncated custom message) is sent.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest error text sent to a client, in characters.
pub const MAX_ERROR_LENGTH: usize = 500;

/// Text of the SSE error frame emitted when the stream itself breaks.
pub const STREAM_INTERRUPTED_MESSAGE: &str = "Stream error: connection interrupted";

pub const ERROR_CODE_AUTH_REQUIRED: &str = "AUTH_REQUIRED";
pub const ERROR_CODE_AUTH_INVALID: &str = "AUTH_INVALID";
pub const ERROR_CODE_AUTH_EXPIRED: &str = "AUTH_EXPIRED";
pub const ERROR_CODE_INVALID_REQUEST: &str = "INVALID_REQUEST";
pub const ERROR_CODE_VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const ERROR_CODE_MODEL_NOT_FOUND: &str = "MODEL_NOT_FOUND";
pub const ERROR_CODE_RATE_LIMITED: &str = "RATE_LIMITED";
pub const ERROR_CODE_MODEL_UNAVAILABLE: &str = "MODEL_UNAVAILABLE";
pub const ERROR_CODE_PROVIDER_ERROR: &str = "PROVIDER_ERROR";
pub const ERROR_CODE_INTERNAL_ERROR: &str = "INTERNAL_ERROR";
pub const ERROR_CODE_SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
pub const ERROR_CODE_TIMEOUT: &str = "TIMEOUT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AuthRequired,
    AuthInvalid,
    AuthExpired,
    InvalidRequest,
    ValidationError,
    ModelNotFound,
    RateLimited,
    ModelUnavailable,
    ProviderError,
    InternalError,
    ServiceUnavailable,
    Timeout,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 12] = [
        Self::AuthRequired,
        Self::AuthInvalid,
        Self::AuthExpired,
        Self::InvalidRequest,
        Self::ValidationError,
        Self::ModelNotFound,
        Self::RateLimited,
        Self::ModelUnavailable,
        Self::ProviderError,
        Self::InternalError,
        Self::ServiceUnavailable,
        Self::Timeout,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthRequired => ERROR_CODE_AUTH_REQUIRED,
            Self::AuthInvalid => ERROR_CODE_AUTH_INVALID,
            Self::AuthExpired => ERROR_CODE_AUTH_EXPIRED,
            Self::InvalidRequest => ERROR_CODE_INVALID_REQUEST,
            Self::ValidationError => ERROR_CODE_VALIDATION_ERROR,
            Self::ModelNotFound => ERROR_CODE_MODEL_NOT_FOUND,
            Self::RateLimited => ERROR_CODE_RATE_LIMITED,
            Self::ModelUnavailable => ERROR_CODE_MODEL_UNAVAILABLE,
            Self::ProviderError => ERROR_CODE_PROVIDER_ERROR,
            Self::InternalError => ERROR_CODE_INTERNAL_ERROR,
            Self::ServiceUnavailable => ERROR_CODE_SERVICE_UNAVAILABLE,
            Self::Timeout => ERROR_CODE_TIMEOUT,
        }
    }

    /// Fixed message that is safe to show an end user.
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::AuthRequired => "Authentication required",
            Self::AuthInvalid => "Invalid authentication credentials",
            Self::AuthExpired => "Token has expired",
            Self::InvalidRequest => "Invalid request format",
            Self::ValidationError => "Request validation failed",
            Self::ModelNotFound => "The requested model was not found",
            Self::RateLimited => {
                "The service is experiencing high demand. Please try again in a moment."
            }
            Self::ModelUnavailable => {
                "The requested model is temporarily unavailable. Please try a different model."
            }
            Self::ProviderError => "The AI provider returned an error. Please try again.",
            Self::InternalError => "An unexpected error occurred. Our team has been notified.",
            Self::ServiceUnavailable => {
                "The service is temporarily unavailable. Please try again later."
            }
            Self::Timeout => "The request timed out. Please try again.",
        }
    }

    /// HTTP status used when the code is reported before a stream commits.
    pub const fn http_status(self) -> StatusCode {
        match self {
            Self::AuthRequired | Self::AuthInvalid | Self::AuthExpired => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ModelNotFound => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::ModelUnavailable | Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::ProviderError => StatusCode::BAD_GATEWAY,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Classify an upstream HTTP status.
    ///
    /// 401 → auth-invalid, 404 → model-not-found, 429 → rate-limited,
    /// 5xx → service-unavailable, any other 4xx → provider-error.
    pub fn from_upstream_status(status: u16) -> Self {
        match status {
            401 => Self::AuthInvalid,
            404 => Self::ModelNotFound,
            429 => Self::RateLimited,
            500..=599 => Self::ServiceUnavailable,
            400..=499 => Self::ProviderError,
            _ => Self::InternalError,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Truncate a message to [`MAX_ERROR_LENGTH`] characters, ending in `...`.
pub fn truncate_error_message(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_LENGTH {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(MAX_ERROR_LENGTH - 3).collect();
    truncated.push_str("...");
    truncated
}
