//! The single-worker scheduling loop
//!
//! One logical worker drives the delivery queue: a fixed-interval tick
//! processes at most one email, and a busy flag turns overlapping ticks into
//! no-ops when processing outlasts the interval. The loop is an owned
//! background task with an explicit stop, so shutdown drains instead of
//! abandoning work mid-send.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::queue::DeliveryQueue;

pub struct QueueWorker {
    queue: Arc<DeliveryQueue>,
    running: Arc<RwLock<bool>>,
    busy: Arc<AtomicBool>,
    task_handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl QueueWorker {
    pub fn new(queue: Arc<DeliveryQueue>) -> Self {
        Self {
            queue,
            running: Arc::new(RwLock::new(false)),
            busy: Arc::new(AtomicBool::new(false)),
            task_handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Start the scheduling loop. Reloads persisted pending emails first
    /// (crash recovery), then ticks until stopped.
    pub async fn start(&self) -> Result<(), crate::errors::DeliveryError> {
        let mut running = self.running.write().await;
        if *running {
            info!("Queue worker already running");
            return Ok(());
        }
        *running = true;
        drop(running);

        self.queue.reload_pending().await?;

        let queue = self.queue.clone();
        let running = self.running.clone();
        let busy = self.busy.clone();
        let tick = self.queue.tick_interval();

        let handle = tokio::spawn(async move {
            info!("Queue worker started, tick interval {:?}", tick);
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            while *running.read().await {
                interval.tick().await;

                // Overlapping ticks are no-ops while a send is in flight
                if busy.swap(true, Ordering::SeqCst) {
                    continue;
                }

                match queue.process_next().await {
                    Ok(true) => debug!("Processed one queued email"),
                    Ok(false) => {}
                    Err(e) => error!("Queue processing error: {}", e),
                }

                busy.store(false, Ordering::SeqCst);
            }

            info!("Queue worker stopped");
        });

        *self.task_handle.write().await = Some(handle);
        Ok(())
    }

    /// Stop the loop and wait for the in-flight tick to finish
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        drop(running);

        if let Some(handle) = self.task_handle.write().await.take() {
            let _ = handle.await;
        }

        info!("Stopped queue worker");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::MockDnsProvider;
    use crate::domains::DomainService;
    use crate::providers::{EmailProvider, MockEmailProvider};
    use crate::queue::EnqueueRequest;
    use crate::templates::TemplateService;
    use mailgate_core::{GatewaySettings, QueueSettings};
    use mailgate_database::test_utils::TestDatabase;
    use std::time::Duration;

    async fn setup() -> (TestDatabase, Arc<DeliveryQueue>, MockEmailProvider) {
        let db = TestDatabase::new().await.unwrap();
        let provider = MockEmailProvider::new();
        let provider_arc: Arc<dyn EmailProvider> = Arc::new(provider.clone());
        let templates = Arc::new(TemplateService::new(db.connection_arc()));
        let domains = Arc::new(DomainService::new(
            db.connection_arc(),
            provider_arc.clone(),
            Arc::new(MockDnsProvider::new()),
        ));

        let mut settings = GatewaySettings::default();
        settings.queue = QueueSettings {
            tick_interval_ms: 10,
            max_retries: 3,
            retry_delays_ms: vec![5],
        };

        let queue = Arc::new(DeliveryQueue::new(
            db.connection_arc(),
            templates,
            provider_arc,
            domains,
            settings,
        ));

        (db, queue, provider)
    }

    #[tokio::test]
    async fn test_worker_lifecycle() {
        let (_db, queue, _provider) = setup().await;
        let worker = QueueWorker::new(queue);

        assert!(!worker.is_running().await);

        worker.start().await.unwrap();
        assert!(worker.is_running().await);

        // Starting twice is a no-op
        worker.start().await.unwrap();

        worker.stop().await;
        assert!(!worker.is_running().await);
    }

    #[tokio::test]
    async fn test_worker_drains_queue() {
        let (_db, queue, provider) = setup().await;
        let worker = QueueWorker::new(queue.clone());

        let id = queue
            .enqueue(EnqueueRequest {
                to: "a@x.com".to_string(),
                subject: Some("Hi".to_string()),
                text: Some("body".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        worker.start().await.unwrap();

        // Wait for the worker to pick the email up on a tick
        for _ in 0..50 {
            if provider.send_call_count() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        worker.stop().await;

        let row = queue.get(id).await.unwrap();
        assert_eq!(row.status, "sent");
        assert_eq!(row.attempts, 1);
    }
}
