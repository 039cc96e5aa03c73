//! Core domain models for webhook registrations and deliveries.
//!
//! Identifiers are UUID newtypes so a webhook id and a delivery id can
//! never be confused at a call site. Rows map to these structs through
//! manual `FromRow` impls, keeping column naming in one place.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

use crate::{error::CoreError, events::EventKind};

/// Unique identifier for a webhook registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct WebhookId(pub Uuid);

impl WebhookId {
    /// Generates a new random webhook ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WebhookId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WebhookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for WebhookId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Unique identifier for a single delivery record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct DeliveryId(pub Uuid);

impl DeliveryId {
    /// Generates a new random delivery ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeliveryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for DeliveryId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A registered webhook endpoint.
///
/// The secret is stored alongside the registration and returned exactly
/// once at creation time; list responses omit it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    /// Unique registration identifier.
    pub id: WebhookId,
    /// Subscriber endpoint; absolute http(s) URL.
    pub url: String,
    /// Event kinds this endpoint subscribed to, deduplicated.
    pub events: Vec<EventKind>,
    /// Signing secret, `whsec_` prefixed.
    pub secret: String,
    /// Inactive webhooks are skipped at dispatch time.
    pub active: bool,
    /// Consecutive exhausted deliveries since the last success.
    pub failure_count: i32,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Time of the most recent successful delivery, if any.
    pub last_delivery_at: Option<DateTime<Utc>>,
}

impl Webhook {
    /// Returns true if this webhook subscribes to the given event kind.
    pub fn subscribes_to(&self, kind: EventKind) -> bool {
        self.events.contains(&kind)
    }
}

impl FromRow<'_, PgRow> for Webhook {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let events: Vec<String> = row.try_get("events")?;
        let events = events
            .iter()
            .map(|s| s.parse::<EventKind>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "events".to_string(),
                source: Box::new(e),
            })?;

        Ok(Self {
            id: row.try_get("id")?,
            url: row.try_get("url")?,
            events,
            secret: row.try_get("secret")?,
            active: row.try_get("active")?,
            failure_count: row.try_get("failure_count")?,
            created_at: row.try_get("created_at")?,
            last_delivery_at: row.try_get("last_delivery_at")?,
        })
    }
}

/// Terminal and in-flight states of a delivery record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Waiting for a worker, either fresh or scheduled for retry.
    Pending,
    /// The endpoint acknowledged with a 2xx response.
    Success,
    /// Abandoned without exhausting retries, e.g. the webhook was
    /// deleted while the delivery was in flight.
    Failed,
    /// All retry attempts were consumed without a 2xx response.
    MaxRetriesReached,
}

impl DeliveryStatus {
    /// Wire and column representation of this status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::MaxRetriesReached => "max_retries_reached",
        }
    }

    /// Returns true for states a worker will no longer touch.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "max_retries_reached" => Ok(Self::MaxRetriesReached),
            other => Err(CoreError::validation(format!("unknown delivery status: {other}"))),
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for DeliveryStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <&str as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for DeliveryStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        s.parse().map_err(|e: CoreError| e.to_string().into())
    }
}

impl sqlx::Encode<'_, sqlx::Postgres> for DeliveryStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

/// A single event-to-endpoint delivery with its retry state.
///
/// The payload is snapshotted at creation so later webhook mutations
/// never change what a subscriber receives.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Unique delivery identifier.
    pub id: DeliveryId,
    /// Webhook this delivery targets.
    pub webhook_id: WebhookId,
    /// Event kind carried by this delivery.
    pub event: EventKind,
    /// Serialized envelope body, immutable after creation.
    pub payload: Vec<u8>,
    /// Attempts performed so far.
    pub attempts: i32,
    /// Current lifecycle state.
    pub status: DeliveryStatus,
    /// HTTP status from the most recent attempt, if a response arrived.
    pub response_status: Option<i16>,
    /// Truncated response body from the most recent attempt.
    pub response_body: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Completion time for successful deliveries.
    pub delivered_at: Option<DateTime<Utc>>,
    /// Earliest time the next attempt may run; `None` means ready now.
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl Delivery {
    /// Creates a fresh pending delivery for the given webhook and event.
    pub fn new(webhook_id: WebhookId, event: EventKind, payload: Vec<u8>, now: DateTime<Utc>) -> Self {
        Self {
            id: DeliveryId::new(),
            webhook_id,
            event,
            payload,
            attempts: 0,
            status: DeliveryStatus::Pending,
            response_status: None,
            response_body: None,
            created_at: now,
            delivered_at: None,
            next_retry_at: None,
        }
    }
}

impl FromRow<'_, PgRow> for Delivery {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            webhook_id: row.try_get("webhook_id")?,
            event: row.try_get("event")?,
            payload: row.try_get("payload")?,
            attempts: row.try_get("attempts")?,
            status: row.try_get("status")?,
            response_status: row.try_get("response_status")?,
            response_body: row.try_get("response_body")?,
            created_at: row.try_get("created_at")?,
            delivered_at: row.try_get("delivered_at")?,
            next_retry_at: row.try_get("next_retry_at")?,
        })
    }
}

/// Outcome of recording a delivery failure against a webhook.
///
/// Carries the updated consecutive-failure count and whether the
/// failure crossed the deactivation threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookHealth {
    /// Consecutive exhausted deliveries after this failure.
    pub failure_count: i32,
    /// True when this failure deactivated the webhook.
    pub deactivated: bool,
}
