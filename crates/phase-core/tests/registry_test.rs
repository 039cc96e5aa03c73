//! Integration tests for webhook registration and removal.

use std::sync::Arc;

use phase_core::{
    CoreError, EventKind, MemoryStore, Registry, TestClock, WebhookId, WebhookStore,
};

fn registry_with_store() -> (Registry, MemoryStore) {
    let store = MemoryStore::new();
    let clock = Arc::new(TestClock::new());
    let registry = Registry::new(Arc::new(store.clone()), clock);
    (registry, store)
}

#[tokio::test]
async fn register_returns_active_webhook_with_secret() {
    let (registry, _store) = registry_with_store();

    let webhook = registry
        .register(
            "https://example.com/hooks",
            &["stake_confirmed".to_string(), "reward_earned".to_string()],
        )
        .await
        .expect("registration should succeed");

    assert!(webhook.active);
    assert_eq!(webhook.failure_count, 0);
    assert!(webhook.secret.starts_with("whsec_"));
    assert_eq!(
        webhook.events,
        vec![EventKind::StakeConfirmed, EventKind::RewardEarned]
    );
}

#[tokio::test]
async fn each_registration_gets_a_distinct_secret() {
    let (registry, _store) = registry_with_store();
    let events = vec!["stake_confirmed".to_string()];

    let first = registry.register("https://example.com/a", &events).await.unwrap();
    let second = registry.register("https://example.com/a", &events).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_ne!(first.secret, second.secret);
}

#[tokio::test]
async fn invalid_url_rejected_without_write() {
    let (registry, store) = registry_with_store();

    let err = registry
        .register("not a url", &["stake_confirmed".to_string()])
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(store.webhook_count().await, 0);
}

#[tokio::test]
async fn unknown_event_rejected_without_write() {
    let (registry, store) = registry_with_store();

    let err = registry
        .register("https://example.com/hooks", &["stake_melted".to_string()])
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(store.webhook_count().await, 0);
}

#[tokio::test]
async fn empty_event_list_rejected() {
    let (registry, store) = registry_with_store();

    let err = registry.register("https://example.com/hooks", &[]).await.unwrap_err();

    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(store.webhook_count().await, 0);
}

#[tokio::test]
async fn list_returns_inactive_webhooks_too() {
    let (registry, store) = registry_with_store();

    let webhook = registry
        .register("https://example.com/hooks", &["stake_confirmed".to_string()])
        .await
        .unwrap();

    // Drive the webhook past the failure threshold.
    let now = chrono::Utc::now();
    store.record_delivery_failure(webhook.id, now, 1).await.unwrap();

    let listed = registry.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].active);
}

#[tokio::test]
async fn delete_is_idempotent_about_missing_ids() {
    let (registry, _store) = registry_with_store();

    let webhook = registry
        .register("https://example.com/hooks", &["stake_confirmed".to_string()])
        .await
        .unwrap();

    assert!(registry.delete(webhook.id).await.unwrap());
    assert!(!registry.delete(webhook.id).await.unwrap());
    assert!(!registry.delete(WebhookId::new()).await.unwrap());
}
