//! Webhook registry: registration, listing, and removal.
//!
//! Validation happens before any write, so a rejected registration
//! leaves no trace and allocates no secret.

use std::sync::Arc;

use tracing::info;
use url::Url;

use crate::{
    error::{CoreError, Result},
    events::EventKind,
    models::{Webhook, WebhookId},
    secret::generate_secret,
    storage::WebhookStore,
    time::Clock,
};

/// Manages the set of registered webhook endpoints.
pub struct Registry {
    store: Arc<dyn WebhookStore>,
    clock: Arc<dyn Clock>,
}

impl Registry {
    /// Creates a registry over the given store and clock.
    pub fn new(store: Arc<dyn WebhookStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Registers a new webhook endpoint.
    ///
    /// The URL must be an absolute http(s) URL and the event list must
    /// name at least one recognized kind. Duplicate event names are
    /// collapsed. The returned webhook carries the freshly generated
    /// secret; this is the only time callers see it.
    pub async fn register(&self, url: &str, events: &[String]) -> Result<Webhook> {
        let url = validate_url(url)?;
        let events = validate_events(events)?;

        let webhook = Webhook {
            id: WebhookId::new(),
            url,
            events,
            secret: generate_secret(),
            active: true,
            failure_count: 0,
            created_at: self.clock.now_utc(),
            last_delivery_at: None,
        };

        self.store.save_webhook(&webhook).await?;

        info!(
            webhook_id = %webhook.id,
            url = %webhook.url,
            events = webhook.events.len(),
            "webhook registered"
        );

        Ok(webhook)
    }

    /// Returns all registrations, active and inactive.
    pub async fn list(&self) -> Result<Vec<Webhook>> {
        self.store.list_webhooks().await
    }

    /// Removes a registration and cancels its pending deliveries.
    ///
    /// Returns false when no webhook with the given id exists.
    pub async fn delete(&self, id: WebhookId) -> Result<bool> {
        let deleted = self.store.delete_webhook(id).await?;
        if deleted {
            info!(webhook_id = %id, "webhook deleted");
        }
        Ok(deleted)
    }
}

/// Validates and normalizes a subscriber URL.
fn validate_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw)
        .map_err(|e| CoreError::validation(format!("invalid webhook URL: {e}")))?;

    match url.scheme() {
        "http" | "https" => {},
        other => {
            return Err(CoreError::validation(format!(
                "webhook URL must use http or https, got {other}"
            )));
        },
    }

    if url.host_str().is_none() {
        return Err(CoreError::validation("webhook URL must have a host"));
    }

    Ok(url.to_string())
}

/// Parses, validates, and deduplicates event names, preserving order.
fn validate_events(names: &[String]) -> Result<Vec<EventKind>> {
    if names.is_empty() {
        return Err(CoreError::validation("at least one event type is required"));
    }

    let mut events = Vec::with_capacity(names.len());
    for name in names {
        let kind: EventKind = name.parse()?;
        if !events.contains(&kind) {
            events.push(kind);
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_scheme() {
        let err = validate_url("ftp://example.com/hook").unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn rejects_relative_url() {
        assert!(validate_url("/hooks/stake").is_err());
    }

    #[test]
    fn accepts_https_url() {
        let url = validate_url("https://example.com/hooks/stake").unwrap();
        assert_eq!(url, "https://example.com/hooks/stake");
    }

    #[test]
    fn rejects_empty_event_list() {
        let err = validate_events(&[]).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn rejects_unknown_event_name() {
        let names = vec!["stake_confirmed".to_string(), "bogus".to_string()];
        assert!(validate_events(&names).is_err());
    }

    #[test]
    fn deduplicates_event_names() {
        let names = vec![
            "stake_confirmed".to_string(),
            "reward_earned".to_string(),
            "stake_confirmed".to_string(),
        ];
        let events = validate_events(&names).unwrap();
        assert_eq!(events, vec![EventKind::StakeConfirmed, EventKind::RewardEarned]);
    }
}
