//! Health check handler for service monitoring.

use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

/// Lightweight liveness endpoint.
///
/// Reports process health only; storage connectivity problems surface
/// through the API handlers themselves.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "success": true,
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
