//! Background webhook worker.
//!
//! Consumes domain events from the bus and dispatches them, and polls the
//! durable retry queue for deliveries that have come due. Per-delivery work
//! runs in bounded spawned tasks so one slow endpoint cannot stall the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Semaphore};

use crate::services::delivery_service::DeliveryService;
use crate::services::event_publisher::WebhookEvent;

/// Configuration for the webhook worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum deliveries processed concurrently.
    pub concurrency: usize,
    /// Retry queue poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum retries claimed per poll.
    pub batch_size: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval_ms: 1000,
            batch_size: 10,
        }
    }
}

/// Long-running worker driving event dispatch and due retries.
pub struct WebhookWorker {
    delivery: Arc<DeliveryService>,
    config: WorkerConfig,
    shutdown: Arc<AtomicBool>,
}

impl WebhookWorker {
    #[must_use]
    pub fn new(delivery: Arc<DeliveryService>, config: WorkerConfig) -> Self {
        Self {
            delivery,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for signalling shutdown from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Request a graceful stop; `run` drains in-flight deliveries first.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Run until shutdown is requested.
    ///
    /// Events arriving on the bus are dispatched immediately; the retry queue
    /// is polled on a fixed interval. A closed bus stops event intake but
    /// leaves retry polling running.
    pub async fn run(&self, mut events: broadcast::Receiver<WebhookEvent>) {
        tracing::info!(
            target: "webhook_worker",
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval_ms,
            batch_size = self.config.batch_size,
            "Webhook worker started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut events_closed = false;

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    self.poll_due_retries(&semaphore).await;
                }
                received = events.recv(), if !events_closed => {
                    match received {
                        Ok(event) => self.spawn_dispatch(event, &semaphore).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(
                                target: "webhook_worker",
                                skipped,
                                "Event bus lagged; events were dropped"
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!(
                                target: "webhook_worker",
                                "Event bus closed; continuing retry polling only"
                            );
                            events_closed = true;
                        }
                    }
                }
            }
        }

        // Drain: wait for all in-flight deliveries to finish.
        let _ = semaphore
            .acquire_many(self.config.concurrency as u32)
            .await;
        tracing::info!(target: "webhook_worker", "Webhook worker stopped");
    }

    async fn spawn_dispatch(&self, event: WebhookEvent, semaphore: &Arc<Semaphore>) {
        let Ok(permit) = Arc::clone(semaphore).acquire_owned().await else {
            return;
        };
        let delivery = Arc::clone(&self.delivery);
        tokio::spawn(async move {
            delivery.dispatch(&event).await;
            drop(permit);
        });
    }

    async fn poll_due_retries(&self, semaphore: &Arc<Semaphore>) {
        let due = match self
            .delivery
            .store()
            .claim_due_retries(Utc::now(), self.config.batch_size)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(
                    target: "webhook_worker",
                    error = %e,
                    "Failed to claim due retries"
                );
                return;
            }
        };

        if due.is_empty() {
            return;
        }

        tracing::debug!(
            target: "webhook_worker",
            count = due.len(),
            "Claimed due retries"
        );

        for pending in due {
            let Ok(permit) = Arc::clone(semaphore).acquire_owned().await else {
                return;
            };
            let delivery = Arc::clone(&self.delivery);
            tokio::spawn(async move {
                delivery.process_retry(&pending).await;
                drop(permit);
            });
        }
    }
}
