//! Event dispatcher: fans staking events out to subscribed webhooks.
//!
//! The dispatcher turns one domain event into zero or more delivery
//! records, one per active webhook subscribed to the event's kind. The
//! payload is serialized exactly once at dispatch time; later webhook
//! mutations never change what a subscriber receives.

use std::sync::Arc;

use phase_core::{Clock, Delivery, StakingEvent, Webhook, WebhookStore};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DeliveryError, Result};

/// Envelope wrapping every delivered payload.
#[derive(Debug, Serialize)]
struct DeliveryEnvelope<'a> {
    event: &'a str,
    data: Value,
    webhook: EnvelopeMeta,
}

/// Per-webhook metadata inside the envelope.
#[derive(Debug, Serialize)]
struct EnvelopeMeta {
    id: Uuid,
    timestamp: String,
}

/// Fans staking events out to matching webhook registrations.
pub struct Dispatcher {
    store: Arc<dyn WebhookStore>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given store and clock.
    pub fn new(store: Arc<dyn WebhookStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Creates pending deliveries for every active subscriber of the
    /// event's kind.
    ///
    /// Inactive webhooks and non-subscribers are skipped silently. No
    /// matching webhooks is a normal outcome and yields an empty list.
    pub async fn dispatch(&self, event: &StakingEvent) -> Result<Vec<Delivery>> {
        let kind = event.kind();
        let now = self.clock.now_utc();
        let data = event.data().map_err(DeliveryError::from)?;

        let webhooks = self.store.list_webhooks().await?;
        let mut deliveries = Vec::new();

        for webhook in webhooks.iter().filter(|w| w.active && w.subscribes_to(kind)) {
            let payload = self.build_payload(event.kind().as_str(), data.clone(), webhook, &now)?;
            let delivery = Delivery::new(webhook.id, kind, payload, now);
            self.store.create_delivery(&delivery).await?;

            debug!(
                delivery_id = %delivery.id,
                webhook_id = %webhook.id,
                event = %kind,
                "delivery created"
            );
            deliveries.push(delivery);
        }

        info!(
            event = %kind,
            deliveries = deliveries.len(),
            "event dispatched"
        );

        Ok(deliveries)
    }

    /// Serializes the envelope for one webhook.
    fn build_payload(
        &self,
        event: &str,
        data: Value,
        webhook: &Webhook,
        now: &chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<u8>> {
        let envelope = DeliveryEnvelope {
            event,
            data,
            webhook: EnvelopeMeta { id: webhook.id.0, timestamp: now.to_rfc3339() },
        };
        serde_json::to_vec(&envelope)
            .map_err(|e| DeliveryError::internal(format!("payload serialization failed: {e}")))
    }
}
