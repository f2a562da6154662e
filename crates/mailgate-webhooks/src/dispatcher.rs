//! Outbound webhook dispatcher
//!
//! Fans notable email events out to subscriber endpoints. Each endpoint is
//! delivered independently: its own delivery record, its own retry budget,
//! and one endpoint's failure never blocks another's delivery.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use mailgate_core::{EmailEvent, EmailEventKind, EmailEventSink, EventSinkError, WebhookSettings};
use mailgate_entities::webhook_deliveries::{self, status};
use mailgate_entities::webhook_endpoints;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Webhook dispatch errors
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Endpoint not found: {0}")]
    EndpointNotFound(i32),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result of delivering one event to one endpoint
#[derive(Debug, Clone)]
pub struct WebhookDeliveryResult {
    pub endpoint_id: i32,
    pub delivery_id: i32,
    pub success: bool,
    pub status_code: Option<u16>,
    pub attempts: i32,
    pub error_message: Option<String>,
}

/// Dispatches email events to subscriber endpoints
pub struct WebhookDispatcher {
    db: Arc<DatabaseConnection>,
    http_client: reqwest::Client,
    settings: WebhookSettings,
}

impl WebhookDispatcher {
    pub fn new(db: Arc<DatabaseConnection>, settings: WebhookSettings) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .user_agent("Mailgate-Webhook/1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            db,
            http_client,
            settings,
        }
    }

    /// Deliver an event to every enabled, subscribed endpoint. Endpoints are
    /// processed concurrently and independently.
    pub async fn dispatch(
        &self,
        event: &EmailEvent,
    ) -> Result<Vec<WebhookDeliveryResult>, WebhookError> {
        let endpoints = webhook_endpoints::Entity::find()
            .filter(webhook_endpoints::Column::Enabled.eq(true))
            .all(self.db.as_ref())
            .await?;

        let subscribed: Vec<_> = endpoints
            .into_iter()
            .filter(|endpoint| Self::is_subscribed(endpoint, event))
            .collect();

        if subscribed.is_empty() {
            debug!("No subscribers for event {}", event);
            return Ok(vec![]);
        }

        let payload = serde_json::to_string(event)?;

        let deliveries = subscribed
            .into_iter()
            .map(|endpoint| self.deliver_to_endpoint(endpoint, event, payload.clone()));

        let results = futures::future::join_all(deliveries).await;

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(
            "Dispatched {} to {} endpoints, {} succeeded",
            event,
            results.len(),
            succeeded
        );

        Ok(results)
    }

    /// An endpoint receives the event when it subscribes to the event kind
    /// and is either global or scoped to the event's tenant
    fn is_subscribed(endpoint: &webhook_endpoints::Model, event: &EmailEvent) -> bool {
        if let Some(tenant_id) = endpoint.tenant_id {
            if event.tenant_id != Some(tenant_id) {
                return false;
            }
        }

        let Some(events) = endpoint.events.as_array() else {
            return false;
        };

        events
            .iter()
            .filter_map(|v| v.as_str())
            .filter_map(EmailEventKind::parse)
            .any(|kind| kind == event.event)
    }

    /// Deliver one payload to one endpoint with bounded retries
    async fn deliver_to_endpoint(
        &self,
        endpoint: webhook_endpoints::Model,
        event: &EmailEvent,
        payload: String,
    ) -> WebhookDeliveryResult {
        // Create the delivery record first so the attempt trail survives
        // process death mid-delivery
        let delivery = webhook_deliveries::ActiveModel {
            email_log_id: Set(event.email_id),
            endpoint_id: Set(endpoint.id),
            event: Set(event.event.as_str().to_string()),
            payload: Set(payload.clone()),
            ..Default::default()
        };

        let record = match delivery.insert(self.db.as_ref()).await {
            Ok(record) => record,
            Err(e) => {
                error!("Failed to create delivery record: {}", e);
                return WebhookDeliveryResult {
                    endpoint_id: endpoint.id,
                    delivery_id: 0,
                    success: false,
                    status_code: None,
                    attempts: 0,
                    error_message: Some(format!("Failed to create delivery record: {}", e)),
                };
            }
        };

        let signature = endpoint
            .secret
            .as_deref()
            .map(|secret| Self::generate_signature(secret, &payload));

        let mut attempts: i32 = 0;
        let mut last_status: Option<u16> = None;
        let mut last_error: Option<String> = None;

        loop {
            attempts += 1;

            let mut request = self
                .http_client
                .post(&endpoint.url)
                .header("Content-Type", "application/json")
                .header("X-Webhook-Event", event.event.as_str())
                .header("X-Webhook-Delivery", record.id.to_string());

            if let Some(signature) = &signature {
                request = request.header("X-Signature", signature);
            }

            match request.body(payload.clone()).send().await {
                Ok(response) if response.status().is_success() => {
                    last_status = Some(response.status().as_u16());

                    let mut update: webhook_deliveries::ActiveModel = record.clone().into();
                    update.status = Set(status::SENT.to_string());
                    update.attempts = Set(attempts);
                    update.status_code = Set(last_status.map(|s| s as i32));
                    update.last_error = Set(None);
                    update.sent_at = Set(Some(Utc::now()));
                    if let Err(e) = update.update(self.db.as_ref()).await {
                        error!("Failed to update delivery record {}: {}", record.id, e);
                    }

                    debug!(
                        "Webhook delivery {} to {} succeeded on attempt {}",
                        record.id, endpoint.url, attempts
                    );

                    return WebhookDeliveryResult {
                        endpoint_id: endpoint.id,
                        delivery_id: record.id,
                        success: true,
                        status_code: last_status,
                        attempts,
                        error_message: None,
                    };
                }
                Ok(response) => {
                    last_status = Some(response.status().as_u16());
                    last_error = Some(format!("HTTP {}", response.status()));
                }
                Err(e) => {
                    last_status = None;
                    last_error = Some(e.to_string());
                }
            }

            // The first request is not a retry; the retry budget covers what
            // follows it
            let retries_used = attempts - 1;
            if retries_used >= self.settings.max_retries as i32 {
                break;
            }

            let delay = self.settings.retry_delay(retries_used as u32 + 1);
            warn!(
                "Webhook delivery {} to {} failed ({}), retrying in {:?}",
                record.id,
                endpoint.url,
                last_error.as_deref().unwrap_or("unknown"),
                delay
            );
            tokio::time::sleep(delay).await;
        }

        let mut update: webhook_deliveries::ActiveModel = record.clone().into();
        update.status = Set(status::FAILED.to_string());
        update.attempts = Set(attempts);
        update.status_code = Set(last_status.map(|s| s as i32));
        update.last_error = Set(last_error.clone());
        if let Err(e) = update.update(self.db.as_ref()).await {
            error!("Failed to update delivery record {}: {}", record.id, e);
        }

        warn!(
            "Webhook delivery {} to {} permanently failed after {} attempts: {:?}",
            record.id, endpoint.url, attempts, last_error
        );

        WebhookDeliveryResult {
            endpoint_id: endpoint.id,
            delivery_id: record.id,
            success: false,
            status_code: last_status,
            attempts,
            error_message: last_error,
        }
    }

    /// HMAC-SHA256 signature over the exact payload bytes
    fn generate_signature(secret: &str, payload: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        let result = mac.finalize();
        format!("sha256={}", hex::encode(result.into_bytes()))
    }
}

#[async_trait]
impl EmailEventSink for WebhookDispatcher {
    async fn publish(&self, event: EmailEvent) -> Result<(), EventSinkError> {
        self.dispatch(&event)
            .await
            .map(|_| ())
            .map_err(|e| EventSinkError::Publish(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::post, Router};
    use mailgate_database::test_utils::TestDatabase;
    use sea_orm::ActiveValue::Set;
    use serde_json::json;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    #[test]
    fn test_signature_generation() {
        let secret = "test_secret";
        let payload = r#"{"test":"data"}"#;

        let signature = WebhookDispatcher::generate_signature(secret, payload);

        assert!(signature.starts_with("sha256="));
        assert_eq!(signature.len(), 71); // "sha256=" (7) + 64 hex chars

        // Deterministic for the same inputs
        assert_eq!(
            signature,
            WebhookDispatcher::generate_signature(secret, payload)
        );
        // Different secret, different signature
        assert_ne!(
            signature,
            WebhookDispatcher::generate_signature("other", payload)
        );
    }

    fn test_settings() -> WebhookSettings {
        WebhookSettings {
            max_retries: 3,
            // Millisecond-scale backoff so retry tests never wait wall-clock
            retry_base_ms: 5,
            request_timeout_ms: 2_000,
        }
    }

    async fn seed_email(db: &TestDatabase) -> Uuid {
        let id = Uuid::new_v4();
        let row = mailgate_entities::email_logs::ActiveModel {
            id: Set(id),
            to_address: Set("a@x.com".to_string()),
            subject: Set("Hi".to_string()),
            data: Set(json!({})),
            status: Set("failed".to_string()),
            attempts: Set(3),
            ..Default::default()
        };
        sea_orm::ActiveModelTrait::insert(row, db.connection())
            .await
            .unwrap();
        id
    }

    async fn seed_endpoint(db: &TestDatabase, url: &str, events: &[&str]) -> i32 {
        let row = webhook_endpoints::ActiveModel {
            url: Set(url.to_string()),
            secret: Set(Some("shh".to_string())),
            events: Set(json!(events)),
            ..Default::default()
        };
        sea_orm::ActiveModelTrait::insert(row, db.connection())
            .await
            .unwrap()
            .id
    }

    /// Local HTTP server with one always-200 and one always-500 route,
    /// counting hits per route
    async fn spawn_receiver() -> (SocketAddr, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let ok_hits = Arc::new(AtomicUsize::new(0));
        let fail_hits = Arc::new(AtomicUsize::new(0));

        async fn ok_handler(State(hits): State<Arc<AtomicUsize>>) -> StatusCode {
            hits.fetch_add(1, Ordering::SeqCst);
            StatusCode::OK
        }

        async fn fail_handler(State(hits): State<Arc<AtomicUsize>>) -> StatusCode {
            hits.fetch_add(1, Ordering::SeqCst);
            StatusCode::INTERNAL_SERVER_ERROR
        }

        let app = Router::new()
            .route("/ok", post(ok_handler).with_state(ok_hits.clone()))
            .route("/fail", post(fail_handler).with_state(fail_hits.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (addr, ok_hits, fail_hits)
    }

    fn failed_event(email_id: Uuid) -> EmailEvent {
        EmailEvent {
            event: EmailEventKind::Failed,
            email_id,
            to: "a@x.com".to_string(),
            tenant_id: None,
            template: None,
            reason: None,
            error: Some("provider unavailable".to_string()),
            provider_message_id: None,
        }
    }

    #[tokio::test]
    async fn test_fanout_is_independent_per_endpoint() {
        let db = TestDatabase::new().await.unwrap();
        let email_id = seed_email(&db).await;
        let (addr, ok_hits, fail_hits) = spawn_receiver().await;

        let ok_id = seed_endpoint(&db, &format!("http://{}/ok", addr), &["email.failed"]).await;
        let fail_id = seed_endpoint(&db, &format!("http://{}/fail", addr), &["email.failed"]).await;

        let dispatcher = WebhookDispatcher::new(db.connection_arc(), test_settings());
        let results = dispatcher.dispatch(&failed_event(email_id)).await.unwrap();

        assert_eq!(results.len(), 2);

        let ok_result = results.iter().find(|r| r.endpoint_id == ok_id).unwrap();
        assert!(ok_result.success);
        assert_eq!(ok_result.attempts, 1);
        assert_eq!(ok_result.status_code, Some(200));

        let fail_result = results.iter().find(|r| r.endpoint_id == fail_id).unwrap();
        assert!(!fail_result.success);
        // Initial attempt plus three retries
        assert_eq!(fail_result.attempts, 4);
        assert_eq!(fail_result.status_code, Some(500));

        // The succeeding endpoint was hit once, the failing one retried
        assert_eq!(ok_hits.load(Ordering::SeqCst), 1);
        assert_eq!(fail_hits.load(Ordering::SeqCst), 4);

        // Delivery records reflect the terminal states
        let deliveries = webhook_deliveries::Entity::find()
            .all(db.connection())
            .await
            .unwrap();
        assert_eq!(deliveries.len(), 2);
        let ok_row = deliveries.iter().find(|d| d.endpoint_id == ok_id).unwrap();
        assert_eq!(ok_row.status, "sent");
        assert!(ok_row.sent_at.is_some());
        let fail_row = deliveries.iter().find(|d| d.endpoint_id == fail_id).unwrap();
        assert_eq!(fail_row.status, "failed");
        assert_eq!(fail_row.attempts, 4);
        assert!(fail_row.last_error.is_some());
    }

    #[tokio::test]
    async fn test_unsubscribed_endpoint_is_skipped() {
        let db = TestDatabase::new().await.unwrap();
        let email_id = seed_email(&db).await;
        let (addr, ok_hits, _) = spawn_receiver().await;

        seed_endpoint(&db, &format!("http://{}/ok", addr), &["email.bounced"]).await;

        let dispatcher = WebhookDispatcher::new(db.connection_arc(), test_settings());
        let results = dispatcher.dispatch(&failed_event(email_id)).await.unwrap();

        assert!(results.is_empty());
        assert_eq!(ok_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tenant_scoped_endpoint_filters_other_tenants() {
        let db = TestDatabase::new().await.unwrap();
        let email_id = seed_email(&db).await;

        let tenant = mailgate_entities::tenants::ActiveModel {
            name: Set("Acme".to_string()),
            subdomain: Set("acme".to_string()),
            ..Default::default()
        };
        let tenant = sea_orm::ActiveModelTrait::insert(tenant, db.connection())
            .await
            .unwrap();

        let (addr, ok_hits, _) = spawn_receiver().await;
        let row = webhook_endpoints::ActiveModel {
            tenant_id: Set(Some(tenant.id)),
            url: Set(format!("http://{}/ok", addr)),
            events: Set(json!(["email.failed"])),
            ..Default::default()
        };
        sea_orm::ActiveModelTrait::insert(row, db.connection())
            .await
            .unwrap();

        // The event belongs to no tenant; the scoped endpoint must not fire
        let dispatcher = WebhookDispatcher::new(db.connection_arc(), test_settings());
        let results = dispatcher.dispatch(&failed_event(email_id)).await.unwrap();

        assert!(results.is_empty());
        assert_eq!(ok_hits.load(Ordering::SeqCst), 0);
    }
}
