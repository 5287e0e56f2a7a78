//! Failure accounting tests: the consecutive-failure counter, the
//! auto-disable threshold, and lazy cancellation of queued retries.

mod common;

use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer};

use common::{CountingResponder, TestHarness};
use skylearn_webhooks::models::UpdateSubscriptionRequest;
use skylearn_webhooks::{EventType, WebhookEvent, WebhookStore};

#[tokio::test]
async fn test_counter_accumulates_across_events() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(CountingResponder::with_status(500))
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    let created = harness.subscribe(&server.uri(), &["payment_failed"]).await;

    for _ in 0..3 {
        harness
            .delivery
            .dispatch(&WebhookEvent::new(EventType::PaymentFailed, json!({})))
            .await;
    }

    let sub = harness
        .store
        .get_subscription(created.subscription.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.consecutive_failures, 3);
    // Below the threshold of 10, the endpoint stays enabled
    assert!(sub.active);
}

#[tokio::test]
async fn test_auto_disable_at_threshold() {
    let server = MockServer::start().await;
    let responder = CountingResponder::with_status(500);
    Mock::given(method("POST"))
        .respond_with(responder.clone())
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    let created = harness.subscribe(&server.uri(), &["payment_failed"]).await;

    // Each dispatch is one failed attempt; the 10th crosses the threshold
    for _ in 0..10 {
        harness
            .delivery
            .dispatch(&WebhookEvent::new(EventType::PaymentFailed, json!({})))
            .await;
    }

    let sub = harness
        .store
        .get_subscription(created.subscription.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.consecutive_failures, 10);
    assert!(!sub.active);
    assert_eq!(harness.audit.count_action("subscription_disabled"), 1);

    // Once disabled, further events no longer reach the endpoint
    let attempts_before = harness.store.attempt_count().await;
    let requests_before = responder.count();
    harness
        .delivery
        .dispatch(&WebhookEvent::new(EventType::PaymentFailed, json!({})))
        .await;
    assert_eq!(harness.store.attempt_count().await, attempts_before);
    assert_eq!(responder.count(), requests_before);
}

#[tokio::test]
async fn test_success_resets_counter_before_threshold() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(CountingResponder::with_status(500))
        .mount(&server)
        .await;
    let ok_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(CountingResponder::new())
        .mount(&ok_server)
        .await;

    let harness = TestHarness::new();
    let created = harness.subscribe(&server.uri(), &["payment_failed"]).await;

    for _ in 0..9 {
        harness
            .delivery
            .dispatch(&WebhookEvent::new(EventType::PaymentFailed, json!({})))
            .await;
    }

    // Point the endpoint somewhere healthy; one success wipes the slate
    harness
        .registry
        .update(
            created.subscription.id,
            UpdateSubscriptionRequest {
                url: Some(ok_server.uri()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    harness
        .delivery
        .dispatch(&WebhookEvent::new(EventType::PaymentFailed, json!({})))
        .await;

    let sub = harness
        .store
        .get_subscription(created.subscription.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.consecutive_failures, 0);
    assert!(sub.active);
    assert_eq!(harness.audit.count_action("subscription_disabled"), 0);
}

#[tokio::test]
async fn test_queued_retry_is_skipped_after_deactivation() {
    let server = MockServer::start().await;
    let responder = CountingResponder::with_status(500);
    Mock::given(method("POST"))
        .respond_with(responder.clone())
        .mount(&server)
        .await;

    let harness = TestHarness::fast();
    let created = harness.subscribe(&server.uri(), &["payment_success"]).await;

    harness
        .delivery
        .dispatch(&WebhookEvent::new(EventType::PaymentSuccess, json!({})))
        .await;
    assert_eq!(harness.store.pending_count().await, 1);

    // Deactivate before the retry comes due; the fire-time check cancels it
    harness
        .store
        .deactivate(created.subscription.id)
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    let claimed = harness
        .store
        .claim_due_retries(chrono::Utc::now(), 10)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    for pending in &claimed {
        harness.delivery.process_retry(pending).await;
    }

    // No request fired, no second attempt row
    assert_eq!(responder.count(), 1);
    assert_eq!(harness.store.attempt_count().await, 1);
    assert_eq!(harness.store.pending_count().await, 0);
}

#[tokio::test]
async fn test_queued_retry_is_dropped_after_deletion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(CountingResponder::with_status(500))
        .mount(&server)
        .await;

    let harness = TestHarness::fast();
    let created = harness.subscribe(&server.uri(), &["payment_success"]).await;

    harness
        .delivery
        .dispatch(&WebhookEvent::new(EventType::PaymentSuccess, json!({})))
        .await;
    assert_eq!(harness.store.pending_count().await, 1);

    // Deleting the subscription cascades to its queued retries
    harness.registry.delete(created.subscription.id).await.unwrap();
    assert_eq!(harness.store.pending_count().await, 0);
}
