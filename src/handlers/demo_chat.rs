use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::{enforce, with_remaining};
use crate::error::ApiError;
use crate::metrics::REQUEST_TOTAL;
use crate::models::{DemoChatRequest, DemoChatResponse};
use crate::rate_limit::client_key;
use crate::state::AppState;

pub async fn demo_chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<DemoChatRequest>, JsonRejection>,
) -> Response {
    REQUEST_TOTAL.with_label_values(&["demo_chat"]).inc();

    let key = format!("chat:{}", client_key(&headers));
    let decision = state.limiter.check(&key);

    let result = match enforce(decision, &key) {
        Ok(()) => reply(&state, payload).await,
        Err(e) => Err(e),
    };
    let response = match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response(),
    };
    with_remaining(response, decision)
}

async fn reply(
    state: &AppState,
    payload: Result<Json<DemoChatRequest>, JsonRejection>,
) -> Result<DemoChatResponse, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let message = request.validated_message().map_err(ApiError::BadRequest)?;

    let gemini = state
        .gemini
        .as_ref()
        .ok_or(ApiError::Misconfigured("GEMINI_API_KEY"))?;

    let response = gemini
        .generate(request.mode.system_prompt(), message, request.mode.settings())
        .await?;

    tracing::info!(mode = ?request.mode, chars = response.len(), "demo chat answered");
    Ok(DemoChatResponse { response })
}
