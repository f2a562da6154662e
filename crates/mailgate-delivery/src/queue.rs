//! The outbound delivery queue
//!
//! Admission is synchronous: enqueue renders the template, persists the log
//! row and appends to the in-memory FIFO before returning the log id.
//! Delivery is asynchronous and at-least-once: the worker processes one entry
//! per tick, and failed attempts re-enter the queue tail after a backoff
//! delay, so global send order is not preserved across retries (no
//! head-of-line blocking from a single slow recipient).

use chrono::Utc;
use mailgate_core::{EmailEvent, EmailEventKind, EmailEventSink, GatewaySettings};
use mailgate_entities::email_logs::{self, status};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};
use serde_json::{Map, Value};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domains::DomainService;
use crate::errors::DeliveryError;
use crate::providers::{EmailProvider, SendEmailRequest};
use crate::templates::TemplateService;

/// Request to enqueue an email. Either `template` + `data` (templated) or
/// `subject` + `html`/`text` (raw) must be supplied.
#[derive(Debug, Clone, Default)]
pub struct EnqueueRequest {
    pub to: String,
    pub template: Option<String>,
    pub data: Map<String, Value>,
    pub tenant_id: Option<i32>,
    pub from: Option<String>,
    pub reply_to: Option<String>,
    pub subject: Option<String>,
    pub html: Option<String>,
    pub text: Option<String>,
}

/// In-memory queue entry. The persisted log row is the durable mirror; this
/// carries what the worker needs to re-render and send.
#[derive(Debug, Clone)]
pub struct QueuedEmail {
    pub id: Uuid,
    pub to: String,
    pub template: Option<String>,
    pub data: Map<String, Value>,
    pub tenant_id: Option<i32>,
    pub from: Option<String>,
    pub reply_to: Option<String>,
}

impl QueuedEmail {
    fn from_row(row: &email_logs::Model) -> Self {
        Self {
            id: row.id,
            to: row.to_address.clone(),
            template: row.template.clone(),
            data: row.data.as_object().cloned().unwrap_or_default(),
            tenant_id: row.tenant_id,
            from: row.from_address.clone(),
            reply_to: row.reply_to.clone(),
        }
    }
}

/// A retried email waiting for its backoff delay to elapse
struct RetryEntry {
    due: Instant,
    email: QueuedEmail,
}

impl PartialEq for RetryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.email.id == other.email.id
    }
}

impl Eq for RetryEntry {}

impl PartialOrd for RetryEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RetryEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.email.id.cmp(&other.email.id))
    }
}

/// Email counts per status
#[derive(Debug, Clone)]
pub struct EmailStats {
    pub total: u64,
    pub queued: u64,
    pub sending: u64,
    pub sent: u64,
    pub delivered: u64,
    pub bounced: u64,
    pub complained: u64,
    pub failed: u64,
}

/// The at-least-once outbound work queue
pub struct DeliveryQueue {
    db: Arc<DatabaseConnection>,
    templates: Arc<TemplateService>,
    provider: Arc<dyn EmailProvider>,
    domains: Arc<DomainService>,
    events: Option<Arc<dyn EmailEventSink>>,
    settings: GatewaySettings,
    queue: Mutex<VecDeque<QueuedEmail>>,
    retries: Mutex<BinaryHeap<Reverse<RetryEntry>>>,
}

impl DeliveryQueue {
    pub fn new(
        db: Arc<DatabaseConnection>,
        templates: Arc<TemplateService>,
        provider: Arc<dyn EmailProvider>,
        domains: Arc<DomainService>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            db,
            templates,
            provider,
            domains,
            events: None,
            settings,
            queue: Mutex::new(VecDeque::new()),
            retries: Mutex::new(BinaryHeap::new()),
        }
    }

    /// Attach the sink that receives terminal failure events
    pub fn with_event_sink(mut self, events: Arc<dyn EmailEventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Admit an email: render, persist, append to the in-memory queue.
    /// Returns the log id without waiting for delivery.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<Uuid, DeliveryError> {
        if !request.to.contains('@') {
            return Err(DeliveryError::Validation(format!(
                "Invalid recipient address: {}",
                request.to
            )));
        }

        // Admission errors surface synchronously; nothing is queued on failure
        let (subject, html, text) = if let Some(template) = &request.template {
            let rendered = self
                .templates
                .render(request.tenant_id, template, &request.data)
                .await?;
            (rendered.subject, Some(rendered.html), rendered.text)
        } else {
            let subject = request.subject.clone().ok_or_else(|| {
                DeliveryError::Validation("Subject is required for raw emails".to_string())
            })?;
            if request.html.is_none() && request.text.is_none() {
                return Err(DeliveryError::Validation(
                    "Either html or text body is required".to_string(),
                ));
            }
            (subject, request.html.clone(), request.text.clone())
        };

        let from = self.resolve_from(request.tenant_id, request.from.clone()).await?;

        let id = Uuid::new_v4();
        let row = email_logs::ActiveModel {
            id: Set(id),
            tenant_id: Set(request.tenant_id),
            to_address: Set(request.to.clone()),
            from_address: Set(Some(from)),
            reply_to: Set(request.reply_to.clone()),
            subject: Set(subject),
            template: Set(request.template.clone()),
            data: Set(Value::Object(request.data.clone())),
            html_body: Set(html),
            text_body: Set(text),
            status: Set(status::QUEUED.to_string()),
            attempts: Set(0),
            ..Default::default()
        };
        let row = row.insert(self.db.as_ref()).await?;

        self.queue.lock().unwrap().push_back(QueuedEmail::from_row(&row));

        info!("Queued email {} to {}", id, request.to);
        Ok(id)
    }

    /// Pick the sender address: explicit request value, then the tenant's
    /// first verified sending domain, then the platform default.
    async fn resolve_from(
        &self,
        tenant_id: Option<i32>,
        explicit: Option<String>,
    ) -> Result<String, DeliveryError> {
        if let Some(from) = explicit {
            return Ok(from);
        }

        if let Some(tenant_id) = tenant_id {
            if let Some(domain) = self.domains.find_verified_for_tenant(tenant_id).await? {
                return Ok(format!(
                    "{}@{}",
                    self.settings.default_from_local, domain.domain
                ));
            }
        }

        Ok(self.settings.default_from_address.clone())
    }

    /// Reload persisted pending rows into the in-memory queue. Called once at
    /// process start; recovers emails lost with the previous process.
    pub async fn reload_pending(&self) -> Result<usize, DeliveryError> {
        let rows = email_logs::Entity::find()
            .filter(email_logs::Column::Status.is_in([status::QUEUED, status::SENDING]))
            .filter(email_logs::Column::Attempts.lt(self.settings.queue.max_retries as i32))
            .order_by_asc(email_logs::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;

        let count = rows.len();
        let mut queue = self.queue.lock().unwrap();
        for row in &rows {
            queue.push_back(QueuedEmail::from_row(row));
        }
        drop(queue);

        if count > 0 {
            info!("Reloaded {} pending emails into the queue", count);
        }
        Ok(count)
    }

    /// Number of entries currently admitted to the in-memory FIFO
    pub fn pending_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Process at most one queue entry. Returns whether an entry was
    /// processed. Due retries re-enter the FIFO tail first.
    pub async fn process_next(&self) -> Result<bool, DeliveryError> {
        self.promote_due_retries();

        let entry = self.queue.lock().unwrap().pop_front();
        match entry {
            Some(email) => {
                self.process_one(email).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Move retry entries whose backoff elapsed to the queue tail
    fn promote_due_retries(&self) {
        let now = Instant::now();
        let mut retries = self.retries.lock().unwrap();
        let mut queue = self.queue.lock().unwrap();

        while let Some(Reverse(entry)) = retries.peek() {
            if entry.due > now {
                break;
            }
            let Reverse(entry) = retries.pop().expect("peeked entry exists");
            queue.push_back(entry.email);
        }
    }

    fn schedule_retry(&self, email: QueuedEmail, delay: Duration) {
        self.retries.lock().unwrap().push(Reverse(RetryEntry {
            due: Instant::now() + delay,
            email,
        }));
    }

    async fn process_one(&self, email: QueuedEmail) -> Result<(), DeliveryError> {
        let Some(row) = email_logs::Entity::find_by_id(email.id)
            .one(self.db.as_ref())
            .await?
        else {
            warn!("Queued email {} has no log row, dropping", email.id);
            return Ok(());
        };

        let attempts = row.attempts + 1;
        let mut active: email_logs::ActiveModel = row.into();
        active.status = Set(status::SENDING.to_string());
        active.attempts = Set(attempts);
        let row = active.update(self.db.as_ref()).await?;

        // Render is repeated per attempt, never cached: the template may have
        // been edited since enqueue
        let (subject, html, text) = if let Some(template) = &email.template {
            match self
                .templates
                .render(email.tenant_id, template, &email.data)
                .await
            {
                Ok(rendered) => (rendered.subject, Some(rendered.html), rendered.text),
                Err(DeliveryError::TemplateNotFound(name)) => {
                    let message = format!("Template not found: {}", name);
                    self.handle_send_failure(row, email, message).await?;
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        } else {
            (row.subject.clone(), row.html_body.clone(), row.text_body.clone())
        };

        let request = SendEmailRequest {
            from: row
                .from_address
                .clone()
                .unwrap_or_else(|| self.settings.default_from_address.clone()),
            from_name: None,
            to: vec![row.to_address.clone()],
            reply_to: row.reply_to.clone(),
            subject,
            html,
            text,
            headers: None,
            tags: row.tenant_id.map(|id| vec![format!("tenant-{}", id)]),
            attachments: None,
        };

        match self.provider.send(&request).await {
            Ok(response) => {
                let id = row.id;
                let mut active: email_logs::ActiveModel = row.into();
                active.status = Set(status::SENT.to_string());
                active.provider_message_id = Set(Some(response.message_id.clone()));
                active.sent_at = Set(Some(Utc::now()));
                active.error_message = Set(None);
                active.update(self.db.as_ref()).await?;

                info!(
                    "Email {} sent on attempt {}, provider message id {}",
                    id, attempts, response.message_id
                );
            }
            Err(e) => {
                self.handle_send_failure(row, email, e.to_string()).await?;
            }
        }

        Ok(())
    }

    /// A failed attempt either reverts to `queued` and re-enters the queue
    /// after its backoff delay, or becomes a terminal failure once the
    /// attempt budget is spent.
    async fn handle_send_failure(
        &self,
        row: email_logs::Model,
        email: QueuedEmail,
        message: String,
    ) -> Result<(), DeliveryError> {
        let attempts = row.attempts as u32;

        if attempts < self.settings.queue.max_retries {
            let delay = self.settings.queue.retry_delay(attempts);
            let id = row.id;

            let mut active: email_logs::ActiveModel = row.into();
            active.status = Set(status::QUEUED.to_string());
            active.error_message = Set(Some(message.clone()));
            active.update(self.db.as_ref()).await?;

            warn!(
                "Email {} attempt {} failed ({}), retrying in {:?}",
                id, attempts, message, delay
            );
            self.schedule_retry(email, delay);
        } else {
            let mut active: email_logs::ActiveModel = row.clone().into();
            active.status = Set(status::FAILED.to_string());
            active.error_message = Set(Some(message.clone()));
            active.update(self.db.as_ref()).await?;

            error!(
                "Email {} permanently failed after {} attempts: {}",
                row.id, attempts, message
            );

            if let Some(events) = &self.events {
                let event = EmailEvent {
                    event: EmailEventKind::Failed,
                    email_id: row.id,
                    to: row.to_address.clone(),
                    tenant_id: row.tenant_id,
                    template: row.template.clone(),
                    reason: None,
                    error: Some(message),
                    provider_message_id: row.provider_message_id.clone(),
                };
                if let Err(e) = events.publish(event).await {
                    warn!("Failed to publish failure event for {}: {}", row.id, e);
                }
            }
        }

        Ok(())
    }

    /// Get an email log by id
    pub async fn get(&self, id: Uuid) -> Result<email_logs::Model, DeliveryError> {
        email_logs::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| DeliveryError::EmailNotFound(id.to_string()))
    }

    /// Email counts per status
    pub async fn count_by_status(&self) -> Result<EmailStats, DeliveryError> {
        let total = email_logs::Entity::find().count(self.db.as_ref()).await?;

        Ok(EmailStats {
            total,
            queued: self.count_with_status(status::QUEUED).await?,
            sending: self.count_with_status(status::SENDING).await?,
            sent: self.count_with_status(status::SENT).await?,
            delivered: self.count_with_status(status::DELIVERED).await?,
            bounced: self.count_with_status(status::BOUNCED).await?,
            complained: self.count_with_status(status::COMPLAINED).await?,
            failed: self.count_with_status(status::FAILED).await?,
        })
    }

    async fn count_with_status(&self, status: &str) -> Result<u64, DeliveryError> {
        let count = email_logs::Entity::find()
            .filter(email_logs::Column::Status.eq(status))
            .count(self.db.as_ref())
            .await?;
        Ok(count)
    }

    pub(crate) fn tick_interval(&self) -> Duration {
        self.settings.queue.tick_interval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::MockDnsProvider;
    use crate::providers::MockEmailProvider;
    use async_trait::async_trait;
    use mailgate_core::{EventSinkError, QueueSettings};
    use mailgate_database::test_utils::TestDatabase;
    use serde_json::json;

    /// Event sink that records published events
    #[derive(Default)]
    struct RecordingEventSink {
        events: Mutex<Vec<EmailEvent>>,
    }

    impl RecordingEventSink {
        fn events(&self) -> Vec<EmailEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmailEventSink for RecordingEventSink {
        async fn publish(&self, event: EmailEvent) -> Result<(), EventSinkError> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn test_settings() -> GatewaySettings {
        let mut settings = GatewaySettings::default();
        // Millisecond-scale delays so retry tests never wait wall-clock
        settings.queue = QueueSettings {
            tick_interval_ms: 10,
            max_retries: 3,
            retry_delays_ms: vec![5, 5, 5],
        };
        settings
    }

    struct Harness {
        _db: TestDatabase,
        queue: Arc<DeliveryQueue>,
        provider: MockEmailProvider,
        events: Arc<RecordingEventSink>,
    }

    async fn setup(provider: MockEmailProvider) -> Harness {
        let db = TestDatabase::new().await.unwrap();

        // Seed a global welcome template
        let template = mailgate_entities::email_templates::ActiveModel {
            tenant_id: Set(None),
            name: Set("welcome".to_string()),
            subject: Set("Welcome {{userName}}".to_string()),
            html_body: Set("<p>Hello {{userName}}</p>".to_string()),
            text_body: Set(Some("Hello {{userName}}".to_string())),
            ..Default::default()
        };
        template.insert(db.connection()).await.unwrap();

        let templates = Arc::new(TemplateService::new(db.connection_arc()));
        let provider_arc: Arc<dyn EmailProvider> = Arc::new(provider.clone());
        let domains = Arc::new(DomainService::new(
            db.connection_arc(),
            provider_arc.clone(),
            Arc::new(MockDnsProvider::new()),
        ));
        let events = Arc::new(RecordingEventSink::default());

        let queue = Arc::new(
            DeliveryQueue::new(
                db.connection_arc(),
                templates,
                provider_arc,
                domains,
                test_settings(),
            )
            .with_event_sink(events.clone()),
        );

        Harness {
            _db: db,
            queue,
            provider,
            events,
        }
    }

    fn welcome_request(to: &str) -> EnqueueRequest {
        EnqueueRequest {
            to: to.to_string(),
            template: Some("welcome".to_string()),
            data: json!({"userName": "Jo"}).as_object().cloned().unwrap(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_enqueue_returns_id_and_persists_queued_row() {
        let h = setup(MockEmailProvider::new()).await;

        let id = h.queue.enqueue(welcome_request("a@x.com")).await.unwrap();

        let row = h.queue.get(id).await.unwrap();
        assert_eq!(row.status, "queued");
        assert_eq!(row.attempts, 0);
        assert_eq!(row.subject, "Welcome Jo");
        assert_eq!(h.queue.pending_len(), 1);
        // Admission never sends
        assert_eq!(h.provider.send_call_count(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_unknown_template_is_synchronous_error() {
        let h = setup(MockEmailProvider::new()).await;

        let result = h
            .queue
            .enqueue(EnqueueRequest {
                to: "a@x.com".to_string(),
                template: Some("missing".to_string()),
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(DeliveryError::TemplateNotFound(_))));
        assert_eq!(h.queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_invalid_recipient() {
        let h = setup(MockEmailProvider::new()).await;

        let result = h
            .queue
            .enqueue(EnqueueRequest {
                to: "not-an-address".to_string(),
                template: Some("welcome".to_string()),
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(DeliveryError::Validation(_))));
    }

    #[tokio::test]
    async fn test_enqueue_raw_requires_body() {
        let h = setup(MockEmailProvider::new()).await;

        let result = h
            .queue
            .enqueue(EnqueueRequest {
                to: "a@x.com".to_string(),
                subject: Some("Hi".to_string()),
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(DeliveryError::Validation(_))));
    }

    #[tokio::test]
    async fn test_process_sends_and_marks_sent() {
        let h = setup(MockEmailProvider::new()).await;
        let id = h.queue.enqueue(welcome_request("a@x.com")).await.unwrap();

        let processed = h.queue.process_next().await.unwrap();
        assert!(processed);

        let row = h.queue.get(id).await.unwrap();
        assert_eq!(row.status, "sent");
        assert_eq!(row.attempts, 1);
        assert!(row.provider_message_id.is_some());
        assert!(row.sent_at.is_some());

        let requests = h.provider.sent_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].to, vec!["a@x.com"]);
        assert_eq!(requests[0].subject, "Welcome Jo");
    }

    #[tokio::test]
    async fn test_raw_email_sends_without_template() {
        let h = setup(MockEmailProvider::new()).await;
        let id = h
            .queue
            .enqueue(EnqueueRequest {
                to: "a@x.com".to_string(),
                subject: Some("Plain".to_string()),
                text: Some("body".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        h.queue.process_next().await.unwrap();

        let row = h.queue.get(id).await.unwrap();
        assert_eq!(row.status, "sent");
        let requests = h.provider.sent_requests();
        assert_eq!(requests[0].subject, "Plain");
        assert_eq!(requests[0].text.as_deref(), Some("body"));
    }

    #[tokio::test]
    async fn test_retry_until_permanent_failure() {
        let h = setup(MockEmailProvider::new().with_send_failure()).await;
        let id = h.queue.enqueue(welcome_request("a@x.com")).await.unwrap();

        // Attempt 1: reverts to queued with a scheduled retry
        h.queue.process_next().await.unwrap();
        let row = h.queue.get(id).await.unwrap();
        assert_eq!(row.status, "queued");
        assert_eq!(row.attempts, 1);
        assert!(row.error_message.is_some());

        // Attempt 2 after the backoff delay
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.queue.process_next().await.unwrap();
        let row = h.queue.get(id).await.unwrap();
        assert_eq!(row.status, "queued");
        assert_eq!(row.attempts, 2);

        // Attempt 3 exhausts the budget
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.queue.process_next().await.unwrap();
        let row = h.queue.get(id).await.unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(row.attempts, 3);

        // Nothing left to process and attempts never exceeded the budget
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!h.queue.process_next().await.unwrap());
        assert_eq!(h.provider.send_call_count(), 3);

        // The terminal failure fanned out exactly one event
        let events = h.events.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, EmailEventKind::Failed);
        assert_eq!(events[0].email_id, id);
    }

    #[tokio::test]
    async fn test_retry_waits_for_backoff() {
        let h = setup(MockEmailProvider::new().with_send_failure()).await;
        h.queue.enqueue(welcome_request("a@x.com")).await.unwrap();

        h.queue.process_next().await.unwrap();
        // The retry is scheduled but not yet due
        assert!(!h.queue.process_next().await.unwrap());
        assert_eq!(h.provider.send_call_count(), 1);
    }

    #[tokio::test]
    async fn test_fifo_order_within_queue() {
        let h = setup(MockEmailProvider::new()).await;
        h.queue.enqueue(welcome_request("first@x.com")).await.unwrap();
        h.queue.enqueue(welcome_request("second@x.com")).await.unwrap();

        h.queue.process_next().await.unwrap();
        h.queue.process_next().await.unwrap();

        let requests = h.provider.sent_requests();
        assert_eq!(requests[0].to, vec!["first@x.com"]);
        assert_eq!(requests[1].to, vec!["second@x.com"]);
    }

    #[tokio::test]
    async fn test_reload_pending_recovers_rows() {
        let h = setup(MockEmailProvider::new()).await;
        let id = h.queue.enqueue(welcome_request("a@x.com")).await.unwrap();

        // Simulate a restart: the in-memory queue is empty
        h.queue.queue.lock().unwrap().clear();
        assert!(!h.queue.process_next().await.unwrap());

        let reloaded = h.queue.reload_pending().await.unwrap();
        assert_eq!(reloaded, 1);

        h.queue.process_next().await.unwrap();
        let row = h.queue.get(id).await.unwrap();
        assert_eq!(row.status, "sent");
    }

    #[tokio::test]
    async fn test_reload_skips_exhausted_rows() {
        let h = setup(MockEmailProvider::new().with_send_failure()).await;
        h.queue.enqueue(welcome_request("a@x.com")).await.unwrap();

        for _ in 0..3 {
            h.queue.process_next().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let reloaded = h.queue.reload_pending().await.unwrap();
        assert_eq!(reloaded, 0);
    }

    #[tokio::test]
    async fn test_count_by_status() {
        let h = setup(MockEmailProvider::new()).await;
        h.queue.enqueue(welcome_request("a@x.com")).await.unwrap();
        h.queue.enqueue(welcome_request("b@x.com")).await.unwrap();
        h.queue.process_next().await.unwrap();

        let stats = h.queue.count_by_status().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_get_missing_email() {
        let h = setup(MockEmailProvider::new()).await;
        let result = h.queue.get(Uuid::new_v4()).await;
        assert!(matches!(result, Err(DeliveryError::EmailNotFound(_))));
    }
}
