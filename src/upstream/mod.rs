mod elevenlabs;
mod gemini;

pub use elevenlabs::{ElevenLabsClient, Speech};
pub use gemini::{GeminiClient, GenerationSettings};

use std::time::Instant;
use thiserror::Error;

use crate::metrics::{UPSTREAM_ERRORS, UPSTREAM_LATENCY};

/// Failure of a single upstream call. Calls are never retried.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{provider} returned HTTP {status}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} request timed out")]
    Timeout { provider: &'static str },

    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} response could not be read: {detail}")]
    Decode {
        provider: &'static str,
        detail: String,
    },
}

impl UpstreamError {
    fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Timeout { .. } => "timeout",
            Self::Transport { .. } => "transport",
            Self::Decode { .. } => "decode",
        }
    }

    pub(crate) fn from_reqwest(provider: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { provider }
        } else if err.is_decode() {
            Self::Decode {
                provider,
                detail: err.to_string(),
            }
        } else {
            Self::Transport {
                provider,
                source: err,
            }
        }
    }
}

/// Turns a non-success response into [`UpstreamError::Status`], keeping the
/// body for the server log.
pub(crate) async fn ensure_success(
    provider: &'static str,
    res: reqwest::Response,
) -> Result<reqwest::Response, UpstreamError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(UpstreamError::Status {
        provider,
        status: status.as_u16(),
        body,
    })
}

// Records latency and failures for one upstream call
pub(crate) fn observe<T>(
    provider: &'static str,
    started: Instant,
    result: &Result<T, UpstreamError>,
) {
    UPSTREAM_LATENCY
        .with_label_values(&[provider])
        .observe(started.elapsed().as_secs_f64());
    if let Err(err) = result {
        UPSTREAM_ERRORS.with_label_values(&[provider, err.kind()]).inc();
    }
}
