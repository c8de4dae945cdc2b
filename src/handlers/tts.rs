use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::{enforce, with_remaining};
use crate::error::ApiError;
use crate::metrics::REQUEST_TOTAL;
use crate::models::{MAX_TTS_CHARS, TtsRequest, is_valid_provider_id};
use crate::rate_limit::client_key;
use crate::state::AppState;
use crate::upstream::Speech;

pub async fn tts_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<TtsRequest>, JsonRejection>,
) -> Response {
    REQUEST_TOTAL.with_label_values(&["tts"]).inc();

    // separate namespace so speech does not eat chat quota
    let key = format!("tts:{}", client_key(&headers));
    let decision = state.limiter.check(&key);

    let result = match enforce(decision, &key) {
        Ok(()) => synthesize(&state, payload).await,
        Err(e) => Err(e),
    };
    let response = match result {
        Ok(speech) => {
            let content_type = HeaderValue::from_str(&speech.content_type)
                .unwrap_or(HeaderValue::from_static("audio/mpeg"));
            ([(header::CONTENT_TYPE, content_type)], speech.audio).into_response()
        }
        Err(e) => e.into_response(),
    };
    with_remaining(response, decision)
}

async fn synthesize(
    state: &AppState,
    payload: Result<Json<TtsRequest>, JsonRejection>,
) -> Result<Speech, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let text = request.text.trim();
    if text.is_empty() {
        return Err(ApiError::bad_request("Text is required"));
    }
    if text.chars().count() > MAX_TTS_CHARS {
        return Err(ApiError::bad_request(format!(
            "Text must be at most {MAX_TTS_CHARS} characters"
        )));
    }

    let voice_id = request
        .voice_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(state.default_voice_id.as_str());
    if !is_valid_provider_id(voice_id) {
        return Err(ApiError::bad_request("Invalid voice_id"));
    }

    let elevenlabs = state
        .elevenlabs
        .as_ref()
        .ok_or(ApiError::Misconfigured("ELEVENLABS_API_KEY"))?;

    Ok(elevenlabs.text_to_speech(voice_id, text).await?)
}
