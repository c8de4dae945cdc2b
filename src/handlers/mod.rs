mod demo_chat;
mod health;
mod metrics;
mod signed_url;
mod tools;
mod tts;
mod webhook;

pub use demo_chat::demo_chat_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use signed_url::signed_url_handler;
pub use tools::service_request_handler;
pub use tts::tts_handler;
pub use webhook::elevenlabs_webhook_handler;

use axum::http::{HeaderName, HeaderValue};
use axum::response::Response;

use crate::metrics::RATE_LIMITED_TOTAL;
use crate::rate_limit::RateDecision;
use crate::error::ApiError;

pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

// Rejects a denied decision with 429
fn enforce(decision: RateDecision, key: &str) -> Result<(), ApiError> {
    if decision.allowed {
        return Ok(());
    }
    RATE_LIMITED_TOTAL.inc();
    tracing::warn!(client = %key, "rate limit exceeded");
    Err(ApiError::RateLimited {
        retry_after: decision.retry_after_secs(),
    })
}

fn with_remaining(mut response: Response, decision: RateDecision) -> Response {
    response
        .headers_mut()
        .insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    response
}
