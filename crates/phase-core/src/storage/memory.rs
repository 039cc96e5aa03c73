//! In-memory store for tests and local development.
//!
//! Mirrors the Postgres implementation's semantics, including atomic
//! claiming: a claimed delivery is held in an in-flight set and hidden
//! from other claimers until its outcome is recorded.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    error::{CoreError, Result},
    models::{Delivery, DeliveryId, DeliveryStatus, Webhook, WebhookHealth, WebhookId},
    storage::WebhookStore,
};

/// Thread-safe in-memory implementation of `WebhookStore`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    webhooks: RwLock<HashMap<WebhookId, Webhook>>,
    deliveries: RwLock<HashMap<DeliveryId, Delivery>>,
    in_flight: RwLock<HashSet<DeliveryId>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored webhooks, for test assertions.
    pub async fn webhook_count(&self) -> usize {
        self.inner.webhooks.read().await.len()
    }

    /// Number of stored delivery records, for test assertions.
    pub async fn delivery_count(&self) -> usize {
        self.inner.deliveries.read().await.len()
    }
}

#[async_trait]
impl WebhookStore for MemoryStore {
    async fn save_webhook(&self, webhook: &Webhook) -> Result<()> {
        self.inner
            .webhooks
            .write()
            .await
            .insert(webhook.id, webhook.clone());
        Ok(())
    }

    async fn list_webhooks(&self) -> Result<Vec<Webhook>> {
        let mut webhooks: Vec<Webhook> = self.inner.webhooks.read().await.values().cloned().collect();
        webhooks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(webhooks)
    }

    async fn find_webhook(&self, id: WebhookId) -> Result<Option<Webhook>> {
        Ok(self.inner.webhooks.read().await.get(&id).cloned())
    }

    async fn delete_webhook(&self, id: WebhookId) -> Result<bool> {
        let removed = self.inner.webhooks.write().await.remove(&id).is_some();
        if removed {
            let mut deliveries = self.inner.deliveries.write().await;
            for delivery in deliveries.values_mut() {
                if delivery.webhook_id == id && delivery.status == DeliveryStatus::Pending {
                    delivery.status = DeliveryStatus::Failed;
                    delivery.next_retry_at = None;
                }
            }
        }
        Ok(removed)
    }

    async fn record_delivery_success(&self, id: WebhookId, at: DateTime<Utc>) -> Result<()> {
        let mut webhooks = self.inner.webhooks.write().await;
        let webhook = webhooks
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(format!("webhook {id} not found")))?;
        webhook.failure_count = 0;
        webhook.last_delivery_at = Some(at);
        Ok(())
    }

    async fn record_delivery_failure(
        &self,
        id: WebhookId,
        at: DateTime<Utc>,
        threshold: i32,
    ) -> Result<WebhookHealth> {
        let mut webhooks = self.inner.webhooks.write().await;
        let webhook = webhooks
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(format!("webhook {id} not found")))?;
        webhook.failure_count += 1;
        webhook.last_delivery_at = Some(at);
        let deactivated = webhook.active && webhook.failure_count >= threshold;
        if deactivated {
            webhook.active = false;
        }
        Ok(WebhookHealth {
            failure_count: webhook.failure_count,
            deactivated,
        })
    }

    async fn create_delivery(&self, delivery: &Delivery) -> Result<()> {
        self.inner
            .deliveries
            .write()
            .await
            .insert(delivery.id, delivery.clone());
        Ok(())
    }

    async fn claim_ready_deliveries(&self, batch: usize, now: DateTime<Utc>) -> Result<Vec<Delivery>> {
        let deliveries = self.inner.deliveries.read().await;
        let mut in_flight = self.inner.in_flight.write().await;

        let mut ready: Vec<Delivery> = deliveries
            .values()
            .filter(|d| {
                d.status == DeliveryStatus::Pending
                    && !in_flight.contains(&d.id)
                    && d.next_retry_at.map_or(true, |at| at <= now)
            })
            .cloned()
            .collect();
        ready.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        ready.truncate(batch);

        for delivery in &ready {
            in_flight.insert(delivery.id);
        }
        Ok(ready)
    }

    async fn mark_delivery_succeeded(
        &self,
        id: DeliveryId,
        attempts: i32,
        response_status: i16,
        response_body: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut deliveries = self.inner.deliveries.write().await;
        let delivery = deliveries
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(format!("delivery {id} not found")))?;
        delivery.status = DeliveryStatus::Success;
        delivery.attempts = attempts;
        delivery.response_status = Some(response_status);
        delivery.response_body = response_body;
        delivery.delivered_at = Some(at);
        delivery.next_retry_at = None;
        self.inner.in_flight.write().await.remove(&id);
        Ok(())
    }

    async fn schedule_delivery_retry(
        &self,
        id: DeliveryId,
        attempts: i32,
        next_retry_at: DateTime<Utc>,
        response_status: Option<i16>,
        response_body: Option<String>,
    ) -> Result<bool> {
        let mut deliveries = self.inner.deliveries.write().await;
        self.inner.in_flight.write().await.remove(&id);

        let Some(delivery) = deliveries.get_mut(&id) else {
            return Ok(false);
        };
        // A delete that raced this attempt already resolved the record.
        if delivery.status != DeliveryStatus::Pending {
            return Ok(false);
        }
        delivery.attempts = attempts;
        delivery.next_retry_at = Some(next_retry_at);
        delivery.response_status = response_status;
        delivery.response_body = response_body;
        Ok(true)
    }

    async fn mark_delivery_exhausted(
        &self,
        id: DeliveryId,
        attempts: i32,
        response_status: Option<i16>,
        response_body: Option<String>,
    ) -> Result<()> {
        let mut deliveries = self.inner.deliveries.write().await;
        let delivery = deliveries
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(format!("delivery {id} not found")))?;
        delivery.status = DeliveryStatus::MaxRetriesReached;
        delivery.attempts = attempts;
        delivery.response_status = response_status;
        delivery.response_body = response_body;
        delivery.next_retry_at = None;
        self.inner.in_flight.write().await.remove(&id);
        Ok(())
    }

    async fn mark_delivery_failed(&self, id: DeliveryId, attempts: i32) -> Result<()> {
        let mut deliveries = self.inner.deliveries.write().await;
        if let Some(delivery) = deliveries.get_mut(&id) {
            delivery.status = DeliveryStatus::Failed;
            delivery.attempts = attempts;
            delivery.next_retry_at = None;
        }
        self.inner.in_flight.write().await.remove(&id);
        Ok(())
    }

    async fn find_delivery(&self, id: DeliveryId) -> Result<Option<Delivery>> {
        Ok(self.inner.deliveries.read().await.get(&id).cloned())
    }

    async fn list_deliveries_for_webhook(&self, id: WebhookId) -> Result<Vec<Delivery>> {
        let mut deliveries: Vec<Delivery> = self
            .inner
            .deliveries
            .read()
            .await
            .values()
            .filter(|d| d.webhook_id == id)
            .cloned()
            .collect();
        deliveries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(deliveries)
    }

    async fn count_deliveries_by_status(&self, status: DeliveryStatus) -> Result<u64> {
        let count = self
            .inner
            .deliveries
            .read()
            .await
            .values()
            .filter(|d| d.status == status)
            .count();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    fn sample_webhook() -> Webhook {
        Webhook {
            id: WebhookId::new(),
            url: "https://example.com/hook".to_string(),
            events: vec![EventKind::StakeConfirmed],
            secret: "whsec_test".to_string(),
            active: true,
            failure_count: 0,
            created_at: Utc::now(),
            last_delivery_at: None,
        }
    }

    #[tokio::test]
    async fn claim_hides_deliveries_from_second_claimer() {
        let store = MemoryStore::new();
        let webhook = sample_webhook();
        store.save_webhook(&webhook).await.unwrap();

        let delivery = Delivery::new(webhook.id, EventKind::StakeConfirmed, b"{}".to_vec(), Utc::now());
        store.create_delivery(&delivery).await.unwrap();

        let first = store.claim_ready_deliveries(10, Utc::now()).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = store.claim_ready_deliveries(10, Utc::now()).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn future_retry_time_is_not_ready() {
        let store = MemoryStore::new();
        let webhook = sample_webhook();
        store.save_webhook(&webhook).await.unwrap();

        let now = Utc::now();
        let mut delivery = Delivery::new(webhook.id, EventKind::StakeConfirmed, b"{}".to_vec(), now);
        delivery.next_retry_at = Some(now + chrono::Duration::seconds(30));
        store.create_delivery(&delivery).await.unwrap();

        assert!(store.claim_ready_deliveries(10, now).await.unwrap().is_empty());

        let later = now + chrono::Duration::seconds(31);
        assert_eq!(store.claim_ready_deliveries(10, later).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failure_counter_deactivates_at_threshold() {
        let store = MemoryStore::new();
        let webhook = sample_webhook();
        store.save_webhook(&webhook).await.unwrap();

        let now = Utc::now();
        for i in 1..=2 {
            let health = store.record_delivery_failure(webhook.id, now, 3).await.unwrap();
            assert_eq!(health.failure_count, i);
            assert!(!health.deactivated);
        }

        let health = store.record_delivery_failure(webhook.id, now, 3).await.unwrap();
        assert_eq!(health.failure_count, 3);
        assert!(health.deactivated);

        let stored = store.find_webhook(webhook.id).await.unwrap().unwrap();
        assert!(!stored.active);
    }

    #[tokio::test]
    async fn inactive_webhook_never_reports_deactivation_again() {
        let store = MemoryStore::new();
        let webhook = sample_webhook();
        store.save_webhook(&webhook).await.unwrap();

        let now = Utc::now();
        store.record_delivery_failure(webhook.id, now, 2).await.unwrap();
        let health = store.record_delivery_failure(webhook.id, now, 2).await.unwrap();
        assert!(health.deactivated);

        // Counter keeps climbing past the threshold while inactive; the
        // transition already happened and is not reported twice.
        let health = store.record_delivery_failure(webhook.id, now, 2).await.unwrap();
        assert_eq!(health.failure_count, 3);
        assert!(!health.deactivated);

        // Same after an out-of-band counter reset: crossing the
        // threshold again on an inactive webhook is not a transition.
        store.record_delivery_success(webhook.id, now).await.unwrap();
        store.record_delivery_failure(webhook.id, now, 2).await.unwrap();
        let health = store.record_delivery_failure(webhook.id, now, 2).await.unwrap();
        assert_eq!(health.failure_count, 2);
        assert!(!health.deactivated);
    }

    #[tokio::test]
    async fn success_resets_failure_counter() {
        let store = MemoryStore::new();
        let webhook = sample_webhook();
        store.save_webhook(&webhook).await.unwrap();

        let now = Utc::now();
        store.record_delivery_failure(webhook.id, now, 10).await.unwrap();
        store.record_delivery_failure(webhook.id, now, 10).await.unwrap();
        store.record_delivery_success(webhook.id, now).await.unwrap();

        let stored = store.find_webhook(webhook.id).await.unwrap().unwrap();
        assert_eq!(stored.failure_count, 0);
        assert_eq!(stored.last_delivery_at, Some(now));
    }

    #[tokio::test]
    async fn delete_cancels_pending_deliveries() {
        let store = MemoryStore::new();
        let webhook = sample_webhook();
        store.save_webhook(&webhook).await.unwrap();

        let delivery = Delivery::new(webhook.id, EventKind::StakeConfirmed, b"{}".to_vec(), Utc::now());
        store.create_delivery(&delivery).await.unwrap();

        assert!(store.delete_webhook(webhook.id).await.unwrap());

        let stored = store.find_delivery(delivery.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Failed);
        assert!(store.claim_ready_deliveries(10, Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_after_delete_is_rejected() {
        let store = MemoryStore::new();
        let webhook = sample_webhook();
        store.save_webhook(&webhook).await.unwrap();

        let delivery = Delivery::new(webhook.id, EventKind::StakeConfirmed, b"{}".to_vec(), Utc::now());
        store.create_delivery(&delivery).await.unwrap();

        let claimed = store.claim_ready_deliveries(10, Utc::now()).await.unwrap();
        assert_eq!(claimed.len(), 1);

        store.delete_webhook(webhook.id).await.unwrap();

        let rescheduled = store
            .schedule_delivery_retry(delivery.id, 1, Utc::now(), Some(500), None)
            .await
            .unwrap();
        assert!(!rescheduled);
    }
}
