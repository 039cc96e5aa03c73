//! Storage abstraction for webhook registrations and delivery records.
//!
//! The trait is the single seam between the domain layer and
//! persistence. Production uses the Postgres implementation; tests use
//! the in-memory store with identical semantics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::Result,
    models::{Delivery, DeliveryId, DeliveryStatus, Webhook, WebhookHealth, WebhookId},
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Persistence operations for webhooks and deliveries.
///
/// Counter updates (`record_delivery_success`, `record_delivery_failure`)
/// and delivery claiming are atomic at the store level so concurrent
/// workers never double-process or lose an update.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Persists a new webhook registration.
    async fn save_webhook(&self, webhook: &Webhook) -> Result<()>;

    /// Returns all registrations, active and inactive, newest first.
    async fn list_webhooks(&self) -> Result<Vec<Webhook>>;

    /// Looks up a single registration.
    async fn find_webhook(&self, id: WebhookId) -> Result<Option<Webhook>>;

    /// Removes a registration and cancels its pending deliveries.
    ///
    /// Cancelled deliveries transition to `Failed` and will never be
    /// retried. Returns false when no such webhook exists.
    async fn delete_webhook(&self, id: WebhookId) -> Result<bool>;

    /// Records a successful delivery: resets the consecutive-failure
    /// counter to zero and stamps `last_delivery_at`.
    async fn record_delivery_success(&self, id: WebhookId, at: DateTime<Utc>) -> Result<()>;

    /// Records an exhausted delivery: increments the consecutive-failure
    /// counter and deactivates the webhook once the counter reaches
    /// `threshold`. The increment and the deactivation check are one
    /// atomic step.
    async fn record_delivery_failure(
        &self,
        id: WebhookId,
        at: DateTime<Utc>,
        threshold: i32,
    ) -> Result<WebhookHealth>;

    /// Persists a new pending delivery record.
    async fn create_delivery(&self, delivery: &Delivery) -> Result<()>;

    /// Atomically claims up to `batch` pending deliveries that are due
    /// at `now`.
    ///
    /// A delivery is due when `next_retry_at` is unset or has passed.
    /// Claimed deliveries are invisible to other claimers until their
    /// outcome is recorded.
    async fn claim_ready_deliveries(&self, batch: usize, now: DateTime<Utc>) -> Result<Vec<Delivery>>;

    /// Marks a claimed delivery as succeeded with the endpoint response.
    async fn mark_delivery_succeeded(
        &self,
        id: DeliveryId,
        attempts: i32,
        response_status: i16,
        response_body: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Returns a claimed delivery to the pending queue with an updated
    /// attempt count and retry time.
    ///
    /// Returns false when the delivery no longer exists or left the
    /// pending state, e.g. the webhook was deleted mid-flight.
    async fn schedule_delivery_retry(
        &self,
        id: DeliveryId,
        attempts: i32,
        next_retry_at: DateTime<Utc>,
        response_status: Option<i16>,
        response_body: Option<String>,
    ) -> Result<bool>;

    /// Marks a claimed delivery as exhausted after its final attempt.
    async fn mark_delivery_exhausted(
        &self,
        id: DeliveryId,
        attempts: i32,
        response_status: Option<i16>,
        response_body: Option<String>,
    ) -> Result<()>;

    /// Marks a claimed delivery as abandoned without further retries.
    async fn mark_delivery_failed(&self, id: DeliveryId, attempts: i32) -> Result<()>;

    /// Looks up a single delivery record.
    async fn find_delivery(&self, id: DeliveryId) -> Result<Option<Delivery>>;

    /// Returns all delivery records for a webhook, newest first.
    async fn list_deliveries_for_webhook(&self, id: WebhookId) -> Result<Vec<Delivery>>;

    /// Counts deliveries in the given state, for operational visibility.
    async fn count_deliveries_by_status(&self, status: DeliveryStatus) -> Result<u64>;
}
