//! Webhook registration management handlers.
//!
//! Registration is the only response that carries the signing secret;
//! list responses omit it.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use phase_core::{CoreError, EventKind, Webhook, WebhookId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::{handlers::ApiError, server::AppState};

/// Request body for webhook registration.
#[derive(Debug, Deserialize)]
pub struct CreateWebhookRequest {
    /// Subscriber endpoint URL.
    pub url: String,
    /// Event kind names to subscribe to.
    #[serde(default)]
    pub events: Vec<String>,
}

/// Registration response payload, the only exposure of the secret.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookCreated {
    /// Registration identifier.
    pub id: WebhookId,
    /// Subscriber endpoint URL.
    pub url: String,
    /// Subscribed event kinds.
    pub events: Vec<EventKind>,
    /// Signing secret; shown once, never returned again.
    pub secret: String,
    /// Whether the webhook receives deliveries.
    pub active: bool,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl From<Webhook> for WebhookCreated {
    fn from(webhook: Webhook) -> Self {
        Self {
            id: webhook.id,
            url: webhook.url,
            events: webhook.events,
            secret: webhook.secret,
            active: webhook.active,
            created_at: webhook.created_at,
        }
    }
}

/// List entry for a webhook registration. Omits the secret.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSummary {
    /// Registration identifier.
    pub id: WebhookId,
    /// Subscriber endpoint URL.
    pub url: String,
    /// Subscribed event kinds.
    pub events: Vec<EventKind>,
    /// Whether the webhook receives deliveries.
    pub active: bool,
    /// Consecutive exhausted deliveries since the last success.
    pub failure_count: i32,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Time of the most recent delivery outcome, if any.
    pub last_delivery_at: Option<DateTime<Utc>>,
}

impl From<Webhook> for WebhookSummary {
    fn from(webhook: Webhook) -> Self {
        Self {
            id: webhook.id,
            url: webhook.url,
            events: webhook.events,
            active: webhook.active,
            failure_count: webhook.failure_count,
            created_at: webhook.created_at,
            last_delivery_at: webhook.last_delivery_at,
        }
    }
}

/// `POST /api/webhooks` - registers a new webhook endpoint.
pub async fn create_webhook(
    State(state): State<AppState>,
    body: Result<Json<CreateWebhookRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::validation(format!("invalid request body: {e}")))?;

    let webhook = state.registry.register(&request.url, &request.events).await.map_err(
        |err| match err {
            CoreError::Validation(message) => ApiError::validation(message),
            other => {
                error!(error = %other, "webhook registration failed");
                ApiError::internal("WEBHOOK_REGISTRATION_FAILED", "failed to register webhook")
            },
        },
    )?;

    let body = json!({
        "success": true,
        "webhook": WebhookCreated::from(webhook),
        "timestamp": Utc::now().to_rfc3339(),
    });
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// `GET /api/webhooks` - lists all registrations without secrets.
pub async fn list_webhooks(State(state): State<AppState>) -> Result<Response, ApiError> {
    let webhooks = state.registry.list().await.map_err(|err| {
        error!(error = %err, "webhook listing failed");
        ApiError::internal("WEBHOOK_LIST_FAILED", "failed to list webhooks")
    })?;

    let summaries: Vec<WebhookSummary> = webhooks.into_iter().map(WebhookSummary::from).collect();

    let body = json!({
        "success": true,
        "webhooks": summaries,
        "timestamp": Utc::now().to_rfc3339(),
    });
    Ok(Json(body).into_response())
}

/// `DELETE /api/webhooks/{id}` - removes a registration.
pub async fn delete_webhook(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let deleted = state.registry.delete(WebhookId::from(id)).await.map_err(|err| {
        error!(error = %err, webhook_id = %id, "webhook deletion failed");
        ApiError::internal("WEBHOOK_DELETE_FAILED", "failed to delete webhook")
    })?;

    if !deleted {
        return Err(ApiError::webhook_not_found(format!("webhook {id} not found")));
    }

    let body = json!({
        "success": true,
        "message": "webhook deleted",
        "timestamp": Utc::now().to_rfc3339(),
    });
    Ok(Json(body).into_response())
}
