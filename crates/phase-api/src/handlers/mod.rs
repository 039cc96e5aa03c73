//! HTTP request handlers for the webhook management API.
//!
//! All responses share one envelope: `success` and `timestamp` are
//! always present, successful responses carry their payload inline, and
//! errors carry `error.code` and `error.message`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;

mod health;
mod webhooks;

pub use health::health_check;
pub use webhooks::{create_webhook, delete_webhook, list_webhooks};

/// API error with a stable machine-readable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Invalid request input; nothing was persisted.
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "VALIDATION_ERROR",
            message: message.into(),
        }
    }

    /// Webhook id does not resolve to a registration.
    pub fn webhook_not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "WEBHOOK_NOT_FOUND",
            message: message.into(),
        }
    }

    /// Internal failure with the given code.
    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "error": {
                "code": self.code,
                "message": self.message,
            },
            "timestamp": Utc::now().to_rfc3339(),
        });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_maps_to_400() {
        let response = ApiError::validation("bad input").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_maps_to_404() {
        let response = ApiError::webhook_not_found("no such webhook").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
