//! Common test utilities for skylearn-webhooks integration tests.
//!
//! Provides mock servers, responders, and a harness wiring the in-memory
//! store to the registry and delivery services, so delivery behavior can be
//! verified without a real database.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use wiremock::{Request, Respond, ResponseTemplate};

use skylearn_webhooks::audit::{AuditRecord, AuditSink};
use skylearn_webhooks::models::{CreateSubscriptionRequest, CreatedSubscription};
use skylearn_webhooks::store::MemoryStore;
use skylearn_webhooks::{DeliveryService, SubscriptionService};

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

/// Standard test owner IDs
pub const OWNER_A: Uuid = Uuid::from_bytes([
    0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11,
]);

pub const OWNER_B: Uuid = Uuid::from_bytes([
    0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22,
]);

/// Secrets-at-rest key used by every test harness.
pub const TEST_ENCRYPTION_KEY: [u8; 32] = [0x5a; 32];

/// Fast backoff schedule so retry tests complete in milliseconds.
pub fn fast_backoff() -> Vec<Duration> {
    vec![Duration::from_millis(20), Duration::from_millis(40)]
}

/// Initialize test logging once. Output is controlled by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Harness - store + registry + delivery wired together
// ---------------------------------------------------------------------------

/// Everything a delivery test needs, sharing one in-memory store.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub registry: SubscriptionService,
    pub delivery: DeliveryService,
    pub audit: Arc<RecordingAuditSink>,
}

impl TestHarness {
    /// Build a harness with the default backoff schedule.
    pub fn new() -> Self {
        Self::with_backoff(None)
    }

    /// Build a harness with a fast backoff schedule for retry tests.
    pub fn fast() -> Self {
        Self::with_backoff(Some(fast_backoff()))
    }

    fn with_backoff(backoff: Option<Vec<Duration>>) -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(RecordingAuditSink::new());
        let key = TEST_ENCRYPTION_KEY.to_vec();

        let registry = SubscriptionService::new(store.clone(), key.clone())
            .with_allow_internal_hosts(true)
            .with_audit_sink(audit.clone());

        let mut delivery = DeliveryService::new(store.clone(), key)
            .expect("failed to build delivery service")
            .with_audit_sink(audit.clone())
            .with_timeout(Duration::from_secs(5));
        if let Some(schedule) = backoff {
            delivery = delivery.with_backoff_schedule(schedule);
        }

        Self {
            store,
            registry,
            delivery,
            audit,
        }
    }

    /// Register a subscription for `OWNER_A` pointed at `url`.
    pub async fn subscribe(&self, url: &str, events: &[&str]) -> CreatedSubscription {
        self.registry
            .create(
                OWNER_A,
                CreateSubscriptionRequest {
                    name: "test endpoint".to_string(),
                    url: url.to_string(),
                    events: events.iter().map(|e| (*e).to_string()).collect(),
                },
            )
            .await
            .expect("failed to create subscription")
    }
}

/// Poll until `check` returns true or the timeout elapses.
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// RecordingAuditSink - captures audit records for assertions
// ---------------------------------------------------------------------------

/// Audit sink that records everything for later inspection.
pub struct RecordingAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// All recorded actions, in order.
    pub fn actions(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.action.clone())
            .collect()
    }

    /// Number of records with the given action.
    pub fn count_action(&self, action: &str) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.action == action)
            .count()
    }
}

impl Default for RecordingAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, record: AuditRecord) {
        self.records.lock().unwrap().push(record);
    }
}

// ---------------------------------------------------------------------------
// CapturedRequest - for inspecting delivered requests
// ---------------------------------------------------------------------------

/// A captured HTTP request with body and headers.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl CapturedRequest {
    /// Parse the body as JSON.
    pub fn body_json(&self) -> JsonValue {
        serde_json::from_slice(&self.body).expect("body is not valid JSON")
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name_lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == name_lower)
            .map(|(_, v)| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// CaptureResponder - captures requests and returns a fixed status
// ---------------------------------------------------------------------------

/// A wiremock responder that captures incoming requests.
#[derive(Clone)]
pub struct CaptureResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    response_code: u16,
}

impl CaptureResponder {
    /// Create a new capture responder that returns 200 OK.
    pub fn new() -> Self {
        Self::with_status(200)
    }

    /// Create a capture responder that returns a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_code: status,
        }
    }

    /// Get all captured requests.
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Get the number of captured requests.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for CaptureResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let captured = CapturedRequest {
            body: request.body.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
            timestamp: Utc::now(),
        };
        self.requests.lock().unwrap().push(captured);
        ResponseTemplate::new(self.response_code)
    }
}

// ---------------------------------------------------------------------------
// CountingResponder - counts requests
// ---------------------------------------------------------------------------

/// A wiremock responder that counts incoming requests.
#[derive(Clone)]
pub struct CountingResponder {
    count: Arc<AtomicU32>,
    response_code: u16,
}

impl CountingResponder {
    /// Create a new counting responder that returns 200 OK.
    pub fn new() -> Self {
        Self::with_status(200)
    }

    /// Create a counting responder that returns a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            count: Arc::new(AtomicU32::new(0)),
            response_code: status,
        }
    }

    /// Get the current request count.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Default for CountingResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CountingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.count.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(self.response_code)
    }
}

// ---------------------------------------------------------------------------
// FailingResponder - fails N times then succeeds
// ---------------------------------------------------------------------------

/// A wiremock responder that fails a specified number of times before
/// succeeding.
#[derive(Clone)]
pub struct FailingResponder {
    attempt_count: Arc<AtomicU32>,
    failures_before_success: u32,
    failure_code: u16,
}

impl FailingResponder {
    /// Create a responder that fails `n` times with 500, then returns 200.
    pub fn fail_times(n: u32) -> Self {
        Self {
            attempt_count: Arc::new(AtomicU32::new(0)),
            failures_before_success: n,
            failure_code: 500,
        }
    }

    /// Create a responder that fails with a custom status code.
    pub fn fail_with_status(n: u32, failure_code: u16) -> Self {
        Self {
            attempt_count: Arc::new(AtomicU32::new(0)),
            failures_before_success: n,
            failure_code,
        }
    }

    /// Get the current attempt count.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count.load(Ordering::SeqCst)
    }
}

impl Respond for FailingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.attempt_count.fetch_add(1, Ordering::SeqCst);
        if n < self.failures_before_success {
            ResponseTemplate::new(self.failure_code)
        } else {
            ResponseTemplate::new(200)
        }
    }
}

// ---------------------------------------------------------------------------
// Signature verification helpers
// ---------------------------------------------------------------------------

/// Compute the expected `X-Signature` value for a body.
pub fn compute_test_signature(secret: &str, body: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify the signature on a captured request against the raw body bytes.
pub fn verify_captured_signature(request: &CapturedRequest, secret: &str) -> bool {
    match request.header("x-signature") {
        Some(header) => header == compute_test_signature(secret, &request.body),
        None => false,
    }
}
