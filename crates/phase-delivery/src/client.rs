//! HTTP client for webhook delivery with configurable timeouts.
//!
//! Handles request construction, response processing, and error
//! categorization for the retry logic.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::error::{DeliveryError, Result};

/// Response body retained for storage and debugging, in bytes.
const MAX_STORED_BODY: usize = 1024;

/// Configuration for the webhook delivery client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout for each delivery request.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: u32,
    /// Whether to verify TLS certificates.
    pub verify_tls: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            user_agent: "Phase-Webhooks/1.0".to_string(),
            max_redirects: 3,
            verify_tls: true,
        }
    }
}

/// A fully prepared delivery request.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    /// Delivery record identifier, sent as a header for idempotency.
    pub delivery_id: Uuid,
    /// Destination URL.
    pub url: String,
    /// Wire name of the event kind.
    pub event: String,
    /// Signed envelope body.
    pub body: Bytes,
    /// `sha256=<hex>` signature of the body.
    pub signature: String,
    /// Attempt number for this delivery (1-based).
    pub attempt_number: u32,
}

/// Outcome of a delivery attempt that received a response.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body, truncated for storage.
    pub body: String,
    /// Total duration of the request.
    pub duration: Duration,
    /// Whether the status was in the 2xx range.
    pub is_success: bool,
}

/// HTTP client optimized for webhook delivery.
///
/// Uses connection pooling and configurable timeouts to deliver to many
/// endpoints concurrently. Non-2xx responses surface as errors so the
/// retry logic sees one failure category.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl DeliveryClient {
    /// Creates a new delivery client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot
    /// be built with the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a new delivery client with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Delivers a signed payload to the endpoint.
    ///
    /// A 2xx response returns `Ok`; everything else, including non-2xx
    /// responses, timeouts, and connection failures, returns a
    /// categorized error for the retry decision.
    pub async fn deliver(&self, request: DeliveryRequest) -> Result<DeliveryResponse> {
        let start_time = std::time::Instant::now();

        let span = info_span!(
            "webhook_delivery",
            delivery_id = %request.delivery_id,
            url = %request.url,
            event = %request.event,
            attempt = request.attempt_number
        );

        async move {
            let response = self
                .client
                .post(&request.url)
                .header("content-type", "application/json")
                .header(crate::signature::SIGNATURE_HEADER, &request.signature)
                .header("X-Phase-Event", &request.event)
                .header("X-Phase-Delivery-Id", request.delivery_id.to_string())
                .header("X-Phase-Delivery-Attempt", request.attempt_number.to_string())
                .body(request.body.clone())
                .send()
                .await;

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    let duration = start_time.elapsed();
                    tracing::warn!(duration_ms = duration.as_millis(), "request failed: {}", e);

                    if e.is_timeout() {
                        return Err(DeliveryError::timeout(self.config.timeout.as_secs()));
                    }
                    if e.is_connect() {
                        return Err(DeliveryError::network(format!("connection failed: {e}")));
                    }
                    return Err(DeliveryError::network(e.to_string()));
                },
            };

            let duration = start_time.elapsed();
            let delivery_response = parse_response(response, duration).await;

            if delivery_response.is_success {
                tracing::info!(
                    status = delivery_response.status_code,
                    duration_ms = duration.as_millis(),
                    "webhook delivered"
                );
                Ok(delivery_response)
            } else {
                tracing::warn!(
                    status = delivery_response.status_code,
                    duration_ms = duration.as_millis(),
                    "endpoint rejected delivery"
                );
                Err(DeliveryError::endpoint_rejected(
                    delivery_response.status_code,
                    delivery_response.body,
                ))
            }
        }
        .instrument(span)
        .await
    }
}

/// Reads an HTTP response into a delivery response, truncating the body.
async fn parse_response(response: Response, duration: Duration) -> DeliveryResponse {
    let status_code = response.status().as_u16();
    let is_success = response.status().is_success();

    let body = match response.bytes().await {
        Ok(bytes) => truncate_body(&bytes),
        Err(e) => {
            tracing::warn!("failed to read response body: {}", e);
            format!("[failed to read response body: {e}]")
        },
    };

    DeliveryResponse { status_code, body, duration, is_success }
}

/// Truncates a response body to the stored limit.
fn truncate_body(bytes: &[u8]) -> String {
    if bytes.len() > MAX_STORED_BODY {
        let suffix = "... (truncated)";
        let max_content = MAX_STORED_BODY - suffix.len();
        let truncated = String::from_utf8_lossy(&bytes[..max_content]);
        format!("{truncated}{suffix}")
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}
