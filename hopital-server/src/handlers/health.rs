use axum::response::{IntoResponse, Json};
use serde_json::json;

/// Health check (GET /health)
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "hopital",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
