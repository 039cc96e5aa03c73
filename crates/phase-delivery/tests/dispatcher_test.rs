//! Integration tests for event fan-out.

use std::sync::Arc;

use chrono::Utc;
use phase_core::{
    DeliveryStatus, EventKind, MemoryStore, Registry, StakingEvent, TestClock, WebhookStore,
};
use phase_delivery::Dispatcher;

fn stake_confirmed_event() -> StakingEvent {
    StakingEvent::StakeConfirmed(phase_core::events::StakeConfirmed {
        stake_account: "stake111".to_string(),
        agent_wallet: "wallet111".to_string(),
        amount_lamports: 2_000_000_000,
        validator: "vote111".to_string(),
        signature: "sig111".to_string(),
    })
}

fn reward_event() -> StakingEvent {
    StakingEvent::RewardEarned(phase_core::events::RewardEarned {
        stake_account: "stake111".to_string(),
        epoch: 640,
        amount_lamports: 42_000,
        validator: "vote111".to_string(),
    })
}

struct Fixture {
    store: MemoryStore,
    registry: Registry,
    dispatcher: Dispatcher,
}

fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let clock = Arc::new(TestClock::new());
    let registry = Registry::new(Arc::new(store.clone()), clock.clone());
    let dispatcher = Dispatcher::new(Arc::new(store.clone()), clock);
    Fixture { store, registry, dispatcher }
}

#[tokio::test]
async fn dispatch_creates_one_delivery_per_subscriber() {
    let f = fixture();
    let events = vec!["stake_confirmed".to_string()];

    f.registry.register("https://a.example.com/hook", &events).await.unwrap();
    f.registry.register("https://b.example.com/hook", &events).await.unwrap();

    let deliveries = f.dispatcher.dispatch(&stake_confirmed_event()).await.unwrap();

    assert_eq!(deliveries.len(), 2);
    for delivery in &deliveries {
        assert_eq!(delivery.status, DeliveryStatus::Pending);
        assert_eq!(delivery.attempts, 0);
        assert_eq!(delivery.event, EventKind::StakeConfirmed);
    }
}

#[tokio::test]
async fn dispatch_skips_non_subscribers() {
    let f = fixture();

    f.registry
        .register("https://a.example.com/hook", &["reward_earned".to_string()])
        .await
        .unwrap();

    let deliveries = f.dispatcher.dispatch(&stake_confirmed_event()).await.unwrap();
    assert!(deliveries.is_empty());
    assert_eq!(f.store.delivery_count().await, 0);
}

#[tokio::test]
async fn dispatch_skips_inactive_webhooks() {
    let f = fixture();

    let webhook = f
        .registry
        .register("https://a.example.com/hook", &["stake_confirmed".to_string()])
        .await
        .unwrap();

    // Push the webhook past the deactivation threshold.
    f.store.record_delivery_failure(webhook.id, Utc::now(), 1).await.unwrap();

    let deliveries = f.dispatcher.dispatch(&stake_confirmed_event()).await.unwrap();
    assert!(deliveries.is_empty());
}

#[tokio::test]
async fn dispatch_with_no_webhooks_is_a_no_op() {
    let f = fixture();
    let deliveries = f.dispatcher.dispatch(&reward_event()).await.unwrap();
    assert!(deliveries.is_empty());
}

#[tokio::test]
async fn payload_snapshot_carries_envelope() {
    let f = fixture();

    let webhook = f
        .registry
        .register("https://a.example.com/hook", &["reward_earned".to_string()])
        .await
        .unwrap();

    let deliveries = f.dispatcher.dispatch(&reward_event()).await.unwrap();
    assert_eq!(deliveries.len(), 1);

    let payload: serde_json::Value = serde_json::from_slice(&deliveries[0].payload).unwrap();
    assert_eq!(payload["event"], "reward_earned");
    assert_eq!(payload["data"]["epoch"], 640);
    assert_eq!(payload["data"]["amountLamports"], 42_000);
    assert_eq!(payload["webhook"]["id"], webhook.id.to_string());
    assert!(payload["webhook"]["timestamp"].is_string());
}

#[tokio::test]
async fn each_subscriber_gets_its_own_payload() {
    let f = fixture();
    let events = vec!["reward_earned".to_string()];

    let a = f.registry.register("https://a.example.com/hook", &events).await.unwrap();
    let b = f.registry.register("https://b.example.com/hook", &events).await.unwrap();

    let deliveries = f.dispatcher.dispatch(&reward_event()).await.unwrap();
    assert_eq!(deliveries.len(), 2);

    let ids: Vec<String> = deliveries
        .iter()
        .map(|d| {
            let payload: serde_json::Value = serde_json::from_slice(&d.payload).unwrap();
            payload["webhook"]["id"].as_str().unwrap().to_string()
        })
        .collect();

    assert!(ids.contains(&a.id.to_string()));
    assert!(ids.contains(&b.id.to_string()));
}
