use axum::{
    Json,
    extract::{Query, State},
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::metrics::REQUEST_TOTAL;
use crate::models::{SignedUrlQuery, SignedUrlResponse, is_valid_provider_id};
use crate::state::AppState;

pub async fn signed_url_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SignedUrlQuery>,
) -> Result<Json<SignedUrlResponse>, ApiError> {
    REQUEST_TOTAL.with_label_values(&["signed_url"]).inc();

    let agent_id = query
        .agent_id
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .or(state.default_agent_id.as_deref())
        .ok_or_else(|| ApiError::bad_request("agent_id is required"))?;
    if !is_valid_provider_id(agent_id) {
        return Err(ApiError::bad_request("Invalid agent_id"));
    }

    let elevenlabs = state
        .elevenlabs
        .as_ref()
        .ok_or(ApiError::Misconfigured("ELEVENLABS_API_KEY"))?;

    let signed_url = elevenlabs.signed_url(agent_id).await?;
    Ok(Json(SignedUrlResponse { signed_url }))
}
