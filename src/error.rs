use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::upstream::UpstreamError;

/// Errors a handler can answer with.
///
/// Only `BadRequest` and `Unauthorized` put their message in the response
/// body. Everything else is logged here and answered with a fixed string.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("rate limit exceeded, retry in {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("{provider} returned {status}: {body}")]
    UpstreamStatus {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} did not answer in time")]
    UpstreamTimeout { provider: &'static str },

    #[error("{provider} unreachable: {detail}")]
    Unavailable {
        provider: &'static str,
        detail: String,
    },

    #[error("{0} is not configured")]
    Misconfigured(&'static str),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamStatus { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Unavailable { .. } | Self::Misconfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text the caller sees.
    pub fn public_message(&self) -> String {
        match self {
            Self::BadRequest(msg) | Self::Unauthorized(msg) => msg.clone(),
            Self::RateLimited { .. } => "Too many requests. Please try again later.".to_string(),
            Self::UpstreamStatus { .. } => "Upstream service error".to_string(),
            Self::UpstreamTimeout { .. } => "Upstream service timed out".to_string(),
            Self::Unavailable { .. } | Self::Misconfigured(_) => {
                "Service temporarily unavailable".to_string()
            }
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Status {
                provider,
                status,
                body,
            } => Self::UpstreamStatus {
                provider,
                status,
                body,
            },
            UpstreamError::Timeout { provider } => Self::UpstreamTimeout { provider },
            UpstreamError::Transport { provider, source } => Self::Unavailable {
                provider,
                detail: source.to_string(),
            },
            UpstreamError::Decode { provider, detail } => {
                Self::Internal(format!("{provider} sent an unreadable response: {detail}"))
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(format!("database: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            Self::BadRequest(_) | Self::Unauthorized(_) | Self::RateLimited { .. } => {
                tracing::warn!(status = status.as_u16(), error = %self, "request rejected");
            }
            _ => {
                tracing::error!(status = status.as_u16(), error = %self, "request failed");
            }
        }

        let mut response = (status, Json(json!({ "error": self.public_message() }))).into_response();
        if let Self::RateLimited { retry_after } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}
