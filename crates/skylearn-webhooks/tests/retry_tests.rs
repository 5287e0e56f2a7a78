//! Retry scheduling tests: backoff timing, the durable pending queue, and
//! the worker loop driving retries to exhaustion or recovery.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer};

use common::{wait_for, CaptureResponder, FailingResponder, TestHarness};
use skylearn_webhooks::{
    EventPublisher, EventType, WebhookEvent, WebhookStore, WebhookWorker, WorkerConfig,
};

#[tokio::test]
async fn test_failure_queues_retry_on_default_schedule() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(CaptureResponder::with_status(500))
        .mount(&server)
        .await;

    // Default schedule: first retry 30 seconds out
    let harness = TestHarness::new();
    harness.subscribe(&server.uri(), &["payment_success"]).await;

    let before = Utc::now();
    harness
        .delivery
        .dispatch(&WebhookEvent::new(EventType::PaymentSuccess, json!({})))
        .await;

    let pending = harness.store.pending_snapshot().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempt_number, 2);
    assert_eq!(pending[0].event, "payment_success");

    let delay = pending[0].due_at - before;
    assert!(delay.num_seconds() >= 29 && delay.num_seconds() <= 31);
}

#[tokio::test]
async fn test_retry_payload_preserves_original_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(CaptureResponder::with_status(500))
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    harness.subscribe(&server.uri(), &["refund_processed"]).await;

    harness
        .delivery
        .dispatch(&WebhookEvent::new(
            EventType::RefundProcessed,
            json!({ "transaction_id": "txn_7", "amount": 500 }),
        ))
        .await;

    let pending = harness.store.pending_snapshot().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].data["transaction_id"], "txn_7");
    assert_eq!(pending[0].data["amount"], 500);
}

#[tokio::test]
async fn test_worker_retries_until_exhaustion() {
    let server = MockServer::start().await;
    let responder = CaptureResponder::with_status(500);
    Mock::given(method("POST"))
        .respond_with(responder.clone())
        .mount(&server)
        .await;

    let harness = TestHarness::fast();
    let created = harness.subscribe(&server.uri(), &["payment_failed"]).await;

    let delivery = Arc::new(harness.delivery.clone());
    let worker = Arc::new(WebhookWorker::new(
        delivery,
        WorkerConfig {
            poll_interval_ms: 10,
            ..WorkerConfig::default()
        },
    ));
    let (_publisher, receiver) = EventPublisher::new(16);
    let runner = Arc::clone(&worker);
    let handle = tokio::spawn(async move { runner.run(receiver).await });

    harness
        .delivery
        .dispatch(&WebhookEvent::new(EventType::PaymentFailed, json!({})))
        .await;

    // Initial attempt plus two retries, then the queue drains for good
    let store = harness.store.clone();
    assert!(
        wait_for(Duration::from_secs(5), || {
            let store = store.clone();
            async move { store.attempt_count().await == 3 && store.pending_count().await == 0 }
        })
        .await,
        "expected exactly 3 attempts and an empty retry queue"
    );

    // Settle to confirm no further attempts fire
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(harness.store.attempt_count().await, 3);
    assert_eq!(responder.request_count(), 3);

    let log = harness
        .registry
        .delivery_log(created.subscription.id, 50, 0)
        .await
        .unwrap();
    let mut numbers: Vec<i32> = log.iter().map(|a| a.attempt_number).collect();
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert!(log.iter().all(|a| a.outcome == "failure"));

    let sub = harness
        .store
        .get_subscription(created.subscription.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.consecutive_failures, 3);
    assert!(sub.active);

    worker.shutdown();
    let _ = handle.await;
}

#[tokio::test]
async fn test_retry_succeeds_after_transient_failure() {
    let server = MockServer::start().await;
    let responder = FailingResponder::fail_times(1);
    Mock::given(method("POST"))
        .respond_with(responder.clone())
        .mount(&server)
        .await;

    let harness = TestHarness::fast();
    let created = harness.subscribe(&server.uri(), &["user_created"]).await;

    let worker = Arc::new(WebhookWorker::new(
        Arc::new(harness.delivery.clone()),
        WorkerConfig {
            poll_interval_ms: 10,
            ..WorkerConfig::default()
        },
    ));
    let (_publisher, receiver) = EventPublisher::new(16);
    let runner = Arc::clone(&worker);
    let handle = tokio::spawn(async move { runner.run(receiver).await });

    harness
        .delivery
        .dispatch(&WebhookEvent::new(EventType::UserCreated, json!({})))
        .await;

    let store = harness.store.clone();
    assert!(
        wait_for(Duration::from_secs(5), || {
            let store = store.clone();
            async move { store.attempt_count().await == 2 }
        })
        .await,
        "expected a failed attempt followed by a successful retry"
    );

    let log = harness
        .registry
        .delivery_log(created.subscription.id, 50, 0)
        .await
        .unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].attempt_number, 2);
    assert_eq!(log[0].outcome, "success");
    assert_eq!(log[1].attempt_number, 1);
    assert_eq!(log[1].outcome, "failure");

    // Recovery resets the failure counter
    let sub = harness
        .store
        .get_subscription(created.subscription.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.consecutive_failures, 0);
    assert_eq!(harness.store.pending_count().await, 0);

    worker.shutdown();
    let _ = handle.await;
}

#[tokio::test]
async fn test_worker_dispatches_events_from_bus() {
    let server = MockServer::start().await;
    let responder = CaptureResponder::new();
    Mock::given(method("POST"))
        .respond_with(responder.clone())
        .mount(&server)
        .await;

    let harness = TestHarness::fast();
    harness
        .subscribe(&server.uri(), &["subscription_created"])
        .await;

    let worker = Arc::new(WebhookWorker::new(
        Arc::new(harness.delivery.clone()),
        WorkerConfig {
            poll_interval_ms: 10,
            ..WorkerConfig::default()
        },
    ));
    let (publisher, receiver) = EventPublisher::new(16);
    let runner = Arc::clone(&worker);
    let handle = tokio::spawn(async move { runner.run(receiver).await });

    publisher.publish(WebhookEvent::new(
        EventType::SubscriptionCreated,
        json!({ "plan": "pro" }),
    ));

    let captured = responder.clone();
    assert!(
        wait_for(Duration::from_secs(5), move || {
            let captured = captured.clone();
            async move { captured.request_count() == 1 }
        })
        .await,
        "published event never reached the endpoint"
    );
    assert_eq!(harness.store.attempt_count().await, 1);

    worker.shutdown();
    let _ = handle.await;
}

#[tokio::test]
async fn test_pending_rows_are_not_claimed_before_due() {
    let harness = TestHarness::new();
    let created = harness
        .subscribe("http://127.0.0.1:9/hook", &["payment_success"])
        .await;

    harness
        .store
        .enqueue_retry(skylearn_db::models::NewWebhookPendingDelivery {
            subscription_id: created.subscription.id,
            event: "payment_success".to_string(),
            data: json!({}),
            attempt_number: 2,
            due_at: Utc::now() + chrono::Duration::seconds(60),
        })
        .await
        .unwrap();

    let claimed = harness
        .store
        .claim_due_retries(Utc::now(), 10)
        .await
        .unwrap();
    assert!(claimed.is_empty());
    assert_eq!(harness.store.pending_count().await, 1);
}
