use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::error::ApiError;
use crate::metrics::{REQUEST_TOTAL, WEBHOOKS_TOTAL};
use crate::models::{CallRecord, POST_CALL_TRANSCRIPTION, PostCallData, WebhookEvent};
use crate::state::AppState;
use crate::webhook::{self, SIGNATURE_HEADER};

/// Post-call webhook from ElevenLabs. The body is taken as raw bytes so the
/// signature is checked against exactly what was sent.
pub async fn elevenlabs_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    REQUEST_TOTAL.with_label_values(&["webhook"]).inc();

    let secret = state
        .webhook_secret
        .as_deref()
        .ok_or(ApiError::Misconfigured("ELEVENLABS_WEBHOOK_SECRET"))?;

    // a non-ASCII header parses as malformed rather than missing
    let signature = headers
        .get(SIGNATURE_HEADER)
        .map(|v| v.to_str().unwrap_or_default());
    if let Err(reason) = webhook::verify(signature, &body, secret, Utc::now()) {
        WEBHOOKS_TOTAL.with_label_values(&["rejected"]).inc();
        return Err(ApiError::unauthorized(reason.to_string()));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {e}")))?;

    if event.kind != POST_CALL_TRANSCRIPTION {
        WEBHOOKS_TOTAL.with_label_values(&["ignored"]).inc();
        tracing::info!(
            kind = %event.kind,
            event_timestamp = ?event.event_timestamp,
            "ignoring webhook event"
        );
        return Ok(Json(json!({ "status": "ignored", "type": event.kind })));
    }

    let event_timestamp = event.event_timestamp;
    let data: PostCallData = serde_json::from_value(event.data)
        .map_err(|e| ApiError::bad_request(format!("Invalid post-call data: {e}")))?;
    if data.conversation_id.trim().is_empty() {
        return Err(ApiError::bad_request("conversation_id is required"));
    }

    let record = CallRecord::from_post_call(data, Utc::now());
    state.store.upsert_call(&record).await?;

    WEBHOOKS_TOTAL.with_label_values(&["stored"]).inc();
    tracing::info!(
        conversation_id = %record.conversation_id,
        duration_secs = ?record.duration_secs,
        event_timestamp = ?event_timestamp,
        "call record stored"
    );
    Ok(Json(json!({
        "status": "stored",
        "conversation_id": record.conversation_id
    })))
}
