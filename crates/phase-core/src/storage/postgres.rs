//! PostgreSQL implementation of the webhook store.
//!
//! Claiming uses `FOR UPDATE SKIP LOCKED` inside a transaction so
//! concurrent workers never claim the same delivery. Claimed rows get a
//! short lease on `next_retry_at`; a worker that dies mid-delivery loses
//! the claim when the lease expires and another worker picks it up,
//! which is where the at-least-once guarantee comes from.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{Delivery, DeliveryId, DeliveryStatus, Webhook, WebhookHealth, WebhookId},
    storage::WebhookStore,
};

/// Lease granted to a claimed delivery before its outcome is recorded.
const CLAIM_LEASE_SECONDS: i64 = 60;

/// Production store backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Creates the webhook tables if they do not exist yet.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS webhooks (
                id UUID PRIMARY KEY,
                url TEXT NOT NULL,
                events TEXT[] NOT NULL,
                secret TEXT NOT NULL,
                active BOOLEAN NOT NULL DEFAULT TRUE,
                failure_count INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL,
                last_delivery_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS deliveries (
                id UUID PRIMARY KEY,
                webhook_id UUID NOT NULL,
                event TEXT NOT NULL,
                payload BYTEA NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                response_status SMALLINT,
                response_body TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                delivered_at TIMESTAMPTZ,
                next_retry_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_deliveries_pending
            ON deliveries (next_retry_at)
            WHERE status = 'pending'
            "#,
        )
        .execute(&*self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl WebhookStore for PostgresStore {
    async fn save_webhook(&self, webhook: &Webhook) -> Result<()> {
        let events: Vec<String> = webhook.events.iter().map(|e| e.to_string()).collect();

        sqlx::query(
            r#"
            INSERT INTO webhooks (
                id, url, events, secret, active, failure_count,
                created_at, last_delivery_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(webhook.id.0)
        .bind(&webhook.url)
        .bind(&events)
        .bind(&webhook.secret)
        .bind(webhook.active)
        .bind(webhook.failure_count)
        .bind(webhook.created_at)
        .bind(webhook.last_delivery_at)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn list_webhooks(&self) -> Result<Vec<Webhook>> {
        let webhooks = sqlx::query_as::<_, Webhook>(
            r#"
            SELECT id, url, events, secret, active, failure_count,
                   created_at, last_delivery_at
            FROM webhooks
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&*self.pool)
        .await?;

        Ok(webhooks)
    }

    async fn find_webhook(&self, id: WebhookId) -> Result<Option<Webhook>> {
        let webhook = sqlx::query_as::<_, Webhook>(
            r#"
            SELECT id, url, events, secret, active, failure_count,
                   created_at, last_delivery_at
            FROM webhooks
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(webhook)
    }

    async fn delete_webhook(&self, id: WebhookId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM webhooks WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE deliveries
            SET status = 'failed', next_retry_at = NULL
            WHERE webhook_id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn record_delivery_success(&self, id: WebhookId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhooks
            SET failure_count = 0, last_delivery_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(at)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn record_delivery_failure(
        &self,
        id: WebhookId,
        at: DateTime<Utc>,
        threshold: i32,
    ) -> Result<WebhookHealth> {
        // Increment and threshold check in one statement so concurrent
        // failures cannot skip past the deactivation point. The self
        // join captures the pre-update active flag: deactivated is only
        // reported when this failure flips an active webhook off.
        let row: (i32, bool) = sqlx::query_as(
            r#"
            UPDATE webhooks AS w
            SET failure_count = w.failure_count + 1,
                active = w.active AND (w.failure_count + 1 < $2),
                last_delivery_at = $3
            FROM (SELECT id, active FROM webhooks WHERE id = $1 FOR UPDATE) AS prior
            WHERE w.id = prior.id
            RETURNING w.failure_count, (prior.active AND w.failure_count >= $2)
            "#,
        )
        .bind(id.0)
        .bind(threshold)
        .bind(at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(WebhookHealth {
            failure_count: row.0,
            deactivated: row.1,
        })
    }

    async fn create_delivery(&self, delivery: &Delivery) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO deliveries (
                id, webhook_id, event, payload, attempts, status,
                response_status, response_body, created_at, delivered_at,
                next_retry_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(delivery.id.0)
        .bind(delivery.webhook_id.0)
        .bind(delivery.event)
        .bind(&delivery.payload)
        .bind(delivery.attempts)
        .bind(delivery.status)
        .bind(delivery.response_status)
        .bind(&delivery.response_body)
        .bind(delivery.created_at)
        .bind(delivery.delivered_at)
        .bind(delivery.next_retry_at)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn claim_ready_deliveries(&self, batch: usize, now: DateTime<Utc>) -> Result<Vec<Delivery>> {
        let mut tx = self.pool.begin().await?;

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM deliveries
            WHERE status = 'pending'
              AND (next_retry_at IS NULL OR next_retry_at <= $1)
            ORDER BY created_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .bind(batch as i64)
        .fetch_all(&mut *tx)
        .await?;

        if ids.is_empty() {
            tx.rollback().await?;
            return Ok(Vec::new());
        }

        let lease = now + Duration::seconds(CLAIM_LEASE_SECONDS);
        let deliveries = sqlx::query_as::<_, Delivery>(
            r#"
            UPDATE deliveries
            SET next_retry_at = $2
            WHERE id = ANY($1)
            RETURNING id, webhook_id, event, payload, attempts, status,
                      response_status, response_body, created_at,
                      delivered_at, next_retry_at
            "#,
        )
        .bind(&ids)
        .bind(lease)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(deliveries)
    }

    async fn mark_delivery_succeeded(
        &self,
        id: DeliveryId,
        attempts: i32,
        response_status: i16,
        response_body: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE deliveries
            SET status = 'success', attempts = $2, response_status = $3,
                response_body = $4, delivered_at = $5, next_retry_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(attempts)
        .bind(response_status)
        .bind(response_body)
        .bind(at)
        .execute(&*self.pool)
        .await?;

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
        let result = sqlx::query(
            r#"
            UPDATE deliveries
            SET attempts = $2, next_retry_at = $3,
                response_status = $4, response_body = $5
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.0)
        .bind(attempts)
        .bind(next_retry_at)
        .bind(response_status)
        .bind(response_body)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_delivery_exhausted(
        &self,
        id: DeliveryId,
        attempts: i32,
        response_status: Option<i16>,
        response_body: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE deliveries
            SET status = 'max_retries_reached', attempts = $2,
                response_status = $3, response_body = $4, next_retry_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(attempts)
        .bind(response_status)
        .bind(response_body)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn mark_delivery_failed(&self, id: DeliveryId, attempts: i32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE deliveries
            SET status = 'failed', attempts = $2, next_retry_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(attempts)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn find_delivery(&self, id: DeliveryId) -> Result<Option<Delivery>> {
        let delivery = sqlx::query_as::<_, Delivery>(
            r#"
            SELECT id, webhook_id, event, payload, attempts, status,
                   response_status, response_body, created_at,
                   delivered_at, next_retry_at
            FROM deliveries
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(delivery)
    }

    async fn list_deliveries_for_webhook(&self, id: WebhookId) -> Result<Vec<Delivery>> {
        let deliveries = sqlx::query_as::<_, Delivery>(
            r#"
            SELECT id, webhook_id, event, payload, attempts, status,
                   response_status, response_body, created_at,
                   delivered_at, next_retry_at
            FROM deliveries
            WHERE webhook_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(id.0)
        .fetch_all(&*self.pool)
        .await?;

        Ok(deliveries)
    }

    async fn count_deliveries_by_status(&self, status: DeliveryStatus) -> Result<u64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM deliveries WHERE status = $1")
                .bind(status)
                .fetch_one(&*self.pool)
                .await?;

        Ok(count.0 as u64)
    }
}
