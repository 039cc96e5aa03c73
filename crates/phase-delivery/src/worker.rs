//! Delivery engine and worker implementation.
//!
//! Workers claim ready deliveries from storage in batches, sign and
//! send them, and record the outcome: success, a scheduled retry, or
//! exhaustion. Claiming is atomic at the store level, so any number of
//! workers can run against the same queue.

use std::{sync::Arc, time::Duration};

use phase_core::{Clock, Delivery, Webhook, WebhookStore};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    client::{ClientConfig, DeliveryClient, DeliveryRequest, DeliveryResponse},
    error::{DeliveryError, Result},
    retry::{RetryContext, RetryDecision, RetryPolicy},
    signature::sign_payload,
    tracker::FailureTracker,
    worker_pool::WorkerPool,
};

/// Configuration for the delivery engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Number of concurrent delivery workers.
    pub worker_count: usize,

    /// Maximum deliveries to claim per worker batch.
    pub batch_size: usize,

    /// How often workers poll when the queue is empty.
    pub poll_interval: Duration,

    /// HTTP client configuration.
    pub client_config: ClientConfig,

    /// Retry policy applied to failed deliveries.
    pub retry_policy: RetryPolicy,

    /// Consecutive exhausted deliveries before deactivation.
    pub failure_threshold: i32,

    /// Maximum time to wait for workers during shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            worker_count: crate::DEFAULT_WORKER_COUNT,
            batch_size: crate::DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_secs(1),
            client_config: ClientConfig::default(),
            retry_policy: RetryPolicy::default(),
            failure_threshold: crate::tracker::DEFAULT_FAILURE_THRESHOLD,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Statistics for delivery engine monitoring.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Number of active delivery workers.
    pub active_workers: usize,
    /// Total deliveries processed since startup.
    pub deliveries_processed: u64,
    /// Deliveries acknowledged with 2xx.
    pub successful_deliveries: u64,
    /// Failed attempts that were rescheduled.
    pub retried_deliveries: u64,
    /// Deliveries that exhausted their attempt budget.
    pub exhausted_deliveries: u64,
    /// Deliveries currently in flight.
    pub in_flight_deliveries: u64,
}

/// Main delivery engine coordinating webhook delivery workers.
pub struct DeliveryEngine {
    store: Arc<dyn WebhookStore>,
    config: DeliveryConfig,
    client: Arc<DeliveryClient>,
    tracker: Arc<FailureTracker>,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
    worker_pool: Option<WorkerPool>,
    clock: Arc<dyn Clock>,
}

impl DeliveryEngine {
    /// Creates a new delivery engine over the given store.
    ///
    /// # Errors
    ///
    /// Returns error if the delivery client cannot be initialized.
    pub fn new(
        store: Arc<dyn WebhookStore>,
        config: DeliveryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let client = Arc::new(DeliveryClient::new(config.client_config.clone())?);
        let tracker = Arc::new(FailureTracker::with_threshold(
            store.clone(),
            config.failure_threshold,
        ));
        let stats = Arc::new(RwLock::new(EngineStats::default()));
        let cancellation_token = CancellationToken::new();

        Ok(Self {
            store,
            config,
            client,
            tracker,
            stats,
            cancellation_token,
            worker_pool: None,
            clock,
        })
    }

    /// Starts the configured worker pool.
    ///
    /// Returns immediately after spawning workers. Use `shutdown()` to
    /// stop gracefully, or drop the engine to cancel workers.
    ///
    /// # Errors
    ///
    /// Returns error if the worker pool fails to spawn.
    pub async fn start(&mut self) -> Result<()> {
        info!(
            worker_count = self.config.worker_count,
            batch_size = self.config.batch_size,
            "starting webhook delivery engine"
        );

        let mut worker_pool = WorkerPool::new(
            self.store.clone(),
            self.config.clone(),
            self.client.clone(),
            self.tracker.clone(),
            self.stats.clone(),
            self.cancellation_token.clone(),
            self.clock.clone(),
        );

        worker_pool.spawn_workers().await?;
        self.worker_pool = Some(worker_pool);

        info!("delivery engine started");
        Ok(())
    }

    /// Gracefully shuts down the delivery engine.
    ///
    /// Signals all workers to stop claiming and waits for in-flight
    /// deliveries to complete, up to the configured shutdown timeout.
    ///
    /// # Errors
    ///
    /// Returns error if graceful shutdown times out.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down delivery engine");

        if let Some(worker_pool) = self.worker_pool.take() {
            worker_pool.shutdown_graceful(self.config.shutdown_timeout).await?;
        } else {
            info!("delivery engine was not started, shutdown completed immediately");
        }
        Ok(())
    }

    /// Returns current engine statistics.
    pub async fn stats(&self) -> EngineStats {
        self.stats.read().await.clone()
    }

    /// Processes exactly one batch of ready deliveries synchronously.
    ///
    /// Used by tests and controlled batch processing: claims one batch,
    /// processes it, and returns without spawning background workers.
    ///
    /// # Errors
    ///
    /// Returns error if claiming fails.
    pub async fn process_batch(&self) -> Result<usize> {
        let worker = DeliveryWorker::new(
            0,
            self.store.clone(),
            self.config.clone(),
            self.client.clone(),
            self.tracker.clone(),
            self.stats.clone(),
            self.cancellation_token.clone(),
            self.clock.clone(),
        );

        worker.process_batch().await
    }
}

/// Individual worker that processes webhook deliveries.
pub struct DeliveryWorker {
    id: usize,
    store: Arc<dyn WebhookStore>,
    config: DeliveryConfig,
    client: Arc<DeliveryClient>,
    tracker: Arc<FailureTracker>,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl DeliveryWorker {
    /// Creates a new delivery worker.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        store: Arc<dyn WebhookStore>,
        config: DeliveryConfig,
        client: Arc<DeliveryClient>,
        tracker: Arc<FailureTracker>,
        stats: Arc<RwLock<EngineStats>>,
        cancellation_token: CancellationToken,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { id, store, config, client, tracker, stats, cancellation_token, clock }
    }

    /// Main worker loop. Claims and processes deliveries until cancelled.
    pub async fn run(&self) -> Result<()> {
        info!(worker_id = self.id, "delivery worker starting");

        loop {
            if self.cancellation_token.is_cancelled() {
                info!(worker_id = self.id, "delivery worker received shutdown signal");
                break;
            }

            match self.process_batch().await {
                Ok(processed_count) => {
                    if processed_count == 0 {
                        tokio::select! {
                            () = self.clock.sleep(self.config.poll_interval) => {}
                            () = self.cancellation_token.cancelled() => break,
                        }
                    }
                },
                Err(error) => {
                    error!(
                        worker_id = self.id,
                        error = %error,
                        "worker batch processing failed"
                    );
                    // Back off so a storage outage does not spin the loop.
                    tokio::select! {
                        () = self.clock.sleep(Duration::from_secs(5)) => {}
                        () = self.cancellation_token.cancelled() => break,
                    }
                },
            }
        }

        info!(worker_id = self.id, "delivery worker stopped");
        Ok(())
    }

    /// Claims and processes one batch of ready deliveries.
    ///
    /// # Errors
    ///
    /// Returns error if claiming fails. Individual delivery failures
    /// are recorded against the delivery and do not fail the batch.
    pub async fn process_batch(&self) -> Result<usize> {
        let now = self.clock.now_utc();
        let deliveries = self
            .store
            .claim_ready_deliveries(self.config.batch_size, now)
            .await
            .map_err(|e| DeliveryError::storage(format!("failed to claim deliveries: {e}")))?;

        let batch_size = deliveries.len();
        debug!(worker_id = self.id, batch_size, "processing delivery batch");

        for delivery in deliveries {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            if let Err(error) = self.process_delivery(delivery).await {
                error!(
                    worker_id = self.id,
                    error = %error,
                    "delivery processing failed"
                );
            }
        }

        Ok(batch_size)
    }

    /// Processes a single claimed delivery end to end.
    async fn process_delivery(&self, delivery: Delivery) -> Result<()> {
        {
            let mut stats = self.stats.write().await;
            stats.in_flight_deliveries += 1;
        }

        let result = self.attempt_delivery(&delivery).await;

        {
            let mut stats = self.stats.write().await;
            stats.in_flight_deliveries -= 1;
            stats.deliveries_processed += 1;
        }

        result
    }

    /// Attempts one delivery and records the outcome.
    async fn attempt_delivery(&self, delivery: &Delivery) -> Result<()> {
        let attempt_number = u32::try_from(delivery.attempts + 1).unwrap_or(u32::MAX);

        // The webhook may have been deleted while this delivery waited.
        let Some(webhook) = self.store.find_webhook(delivery.webhook_id).await? else {
            warn!(
                worker_id = self.id,
                delivery_id = %delivery.id,
                webhook_id = %delivery.webhook_id,
                "webhook gone, abandoning delivery"
            );
            self.store.mark_delivery_failed(delivery.id, delivery.attempts + 1).await?;
            return Ok(());
        };

        let signature = sign_payload(&delivery.payload, &webhook.secret)?;
        let request = DeliveryRequest {
            delivery_id: delivery.id.0,
            url: webhook.url.clone(),
            event: delivery.event.to_string(),
            body: bytes::Bytes::from(delivery.payload.clone()),
            signature,
            attempt_number,
        };

        debug!(
            worker_id = self.id,
            delivery_id = %delivery.id,
            attempt_number,
            url = %webhook.url,
            "attempting webhook delivery"
        );

        match self.client.deliver(request).await {
            Ok(response) => {
                self.handle_success(delivery, &webhook, response).await
            },
            Err(error) => {
                self.handle_failure(delivery, &webhook, attempt_number, error).await
            },
        }
    }

    /// Records a successful delivery and resets the failure counter.
    async fn handle_success(
        &self,
        delivery: &Delivery,
        webhook: &Webhook,
        response: DeliveryResponse,
    ) -> Result<()> {
        let now = self.clock.now_utc();
        let status_code = response.status_code;

        self.store
            .mark_delivery_succeeded(
                delivery.id,
                delivery.attempts + 1,
                i16::try_from(status_code).unwrap_or(i16::MAX),
                Some(response.body),
                now,
            )
            .await?;
        self.tracker.record_success(webhook.id, now).await?;

        {
            let mut stats = self.stats.write().await;
            stats.successful_deliveries += 1;
        }

        info!(
            worker_id = self.id,
            delivery_id = %delivery.id,
            webhook_id = %webhook.id,
            status_code,
            "webhook delivered"
        );
        Ok(())
    }

    /// Schedules a retry or finalizes the delivery as exhausted.
    async fn handle_failure(
        &self,
        delivery: &Delivery,
        webhook: &Webhook,
        attempt_number: u32,
        error: DeliveryError,
    ) -> Result<()> {
        let now = self.clock.now_utc();
        let attempts = delivery.attempts + 1;
        let response_status = error.response_status().map(|s| i16::try_from(s).unwrap_or(i16::MAX));
        let response_body = error.response_body();

        let context = RetryContext::new(
            attempt_number,
            error.clone(),
            now,
            self.config.retry_policy.clone(),
        );

        match context.decide_retry() {
            RetryDecision::Retry { next_attempt_at } => {
                let rescheduled = self
                    .store
                    .schedule_delivery_retry(
                        delivery.id,
                        attempts,
                        next_attempt_at,
                        response_status,
                        response_body,
                    )
                    .await?;

                if rescheduled {
                    {
                        let mut stats = self.stats.write().await;
                        stats.retried_deliveries += 1;
                    }
                    debug!(
                        worker_id = self.id,
                        delivery_id = %delivery.id,
                        attempts,
                        next_attempt_at = %next_attempt_at,
                        error = %error,
                        "delivery retry scheduled"
                    );
                } else {
                    // Left the pending state while we held the claim;
                    // nothing further to do.
                    debug!(
                        worker_id = self.id,
                        delivery_id = %delivery.id,
                        "delivery no longer pending, retry dropped"
                    );
                }
            },
            RetryDecision::GiveUp { reason } => {
                self.store
                    .mark_delivery_exhausted(delivery.id, attempts, response_status, response_body)
                    .await?;
                let health = self.tracker.record_exhausted(webhook.id, now).await?;

                {
                    let mut stats = self.stats.write().await;
                    stats.exhausted_deliveries += 1;
                }

                warn!(
                    worker_id = self.id,
                    delivery_id = %delivery.id,
                    webhook_id = %webhook.id,
                    attempts,
                    failure_count = health.failure_count,
                    reason = %reason,
                    "delivery exhausted"
                );
            },
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_constants() {
        let config = DeliveryConfig::default();
        assert_eq!(config.worker_count, crate::DEFAULT_WORKER_COUNT);
        assert_eq!(config.batch_size, crate::DEFAULT_BATCH_SIZE);
        assert_eq!(config.retry_policy.max_attempts, 5);
        assert_eq!(config.failure_threshold, 10);
    }
}
