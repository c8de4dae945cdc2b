use axum::{Json, response::IntoResponse};

use crate::metrics::REQUEST_TOTAL;

pub async fn health_handler() -> impl IntoResponse {
    REQUEST_TOTAL.with_label_values(&["health"]).inc();
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
