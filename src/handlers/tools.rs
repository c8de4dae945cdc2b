use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, header},
};
use chrono::Utc;
use constant_time_eq::constant_time_eq;
use std::sync::Arc;

use crate::error::ApiError;
use crate::metrics::REQUEST_TOTAL;
use crate::models::{DemoSession, ServiceRequest, ServiceRequestResponse, new_ticket_id};
use crate::state::AppState;

const TICKET_ATTEMPTS: usize = 3;

/// Server tool the voice agent calls once it has collected a caller's
/// details. Stores a demo session and hands back a ticket id to read out.
pub async fn service_request_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ServiceRequest>, JsonRejection>,
) -> Result<Json<ServiceRequestResponse>, ApiError> {
    REQUEST_TOTAL.with_label_values(&["service_request"]).inc();

    let secret = state
        .tool_secret
        .as_deref()
        .ok_or(ApiError::Misconfigured("TOOL_SECRET"))?;
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();
    if !constant_time_eq(token.trim().as_bytes(), secret.as_bytes()) {
        return Err(ApiError::unauthorized("Unauthorized"));
    }

    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let mut session = DemoSession::from_request(request, new_ticket_id(), Utc::now())
        .map_err(ApiError::BadRequest)?;

    state
        .store
        .insert_session_with_fresh_ticket(&mut session, new_ticket_id, TICKET_ATTEMPTS)
        .await?;
    tracing::info!(
        ticket_id = %session.ticket_id,
        service_type = %session.service_type,
        "service request stored"
    );

    let first_name = session
        .customer_name
        .split_whitespace()
        .next()
        .unwrap_or(session.customer_name.as_str());
    Ok(Json(ServiceRequestResponse {
        success: true,
        message: format!(
            "Thanks {first_name}, your request has been logged. Your reference number is {}.",
            session.ticket_id
        ),
        ticket_id: session.ticket_id,
    }))
}
