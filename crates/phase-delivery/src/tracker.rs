//! Consecutive-failure tracking and automatic deactivation.
//!
//! Each webhook carries a counter of consecutive exhausted deliveries.
//! Any success resets it; crossing the threshold deactivates the
//! webhook so a permanently dead endpoint stops consuming delivery
//! capacity. Reactivation is an administrative action elsewhere.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use phase_core::{WebhookHealth, WebhookId, WebhookStore};
use tracing::warn;

use crate::error::Result;

/// Default number of consecutive exhausted deliveries before a webhook
/// is deactivated.
pub const DEFAULT_FAILURE_THRESHOLD: i32 = 10;

/// Tracks delivery outcomes per webhook and deactivates dead endpoints.
pub struct FailureTracker {
    store: Arc<dyn WebhookStore>,
    threshold: i32,
}

impl FailureTracker {
    /// Creates a tracker with the default threshold.
    pub fn new(store: Arc<dyn WebhookStore>) -> Self {
        Self::with_threshold(store, DEFAULT_FAILURE_THRESHOLD)
    }

    /// Creates a tracker with a custom deactivation threshold.
    pub fn with_threshold(store: Arc<dyn WebhookStore>, threshold: i32) -> Self {
        Self { store, threshold }
    }

    /// Records a successful delivery, resetting the failure counter.
    pub async fn record_success(&self, id: WebhookId, at: DateTime<Utc>) -> Result<()> {
        self.store.record_delivery_success(id, at).await?;
        Ok(())
    }

    /// Records an exhausted delivery against the webhook.
    ///
    /// Increments the consecutive-failure counter and deactivates the
    /// webhook once the counter reaches the threshold.
    pub async fn record_exhausted(&self, id: WebhookId, at: DateTime<Utc>) -> Result<WebhookHealth> {
        let health = self.store.record_delivery_failure(id, at, self.threshold).await?;

        if health.deactivated {
            warn!(
                webhook_id = %id,
                failure_count = health.failure_count,
                "webhook deactivated after consecutive delivery failures"
            );
        }

        Ok(health)
    }
}
