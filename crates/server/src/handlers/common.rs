//! Shared handlers.

use axum::Json;
use serde_json::{Value, json};

/// GET /health - liveness probe, intentionally unauthenticated.
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
