//! Provider delivery-status event correlation
//!
//! Maps delivered/bounced/complained callbacks from the email provider back
//! to their email log row. Events with no matching row are logged and
//! dropped: without context they are not actionable, and the provider has
//! already been acknowledged.

use mailgate_core::{EmailEvent, EmailEventKind};
use mailgate_entities::email_logs::{self, status};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{WebhookDispatcher, WebhookError};

/// A delivery-status event as reported by the provider
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEvent {
    pub kind: String,
    pub provider_message_id: String,
    pub recipient: Option<String>,
    pub reason: Option<String>,
}

pub struct EmailEventCorrelator {
    db: Arc<DatabaseConnection>,
    dispatcher: Arc<WebhookDispatcher>,
    /// Fan-out runs as owned background tasks so the provider callback is
    /// acknowledged before any subscriber retries happen
    fanout_tasks: Mutex<JoinSet<()>>,
}

impl EmailEventCorrelator {
    pub fn new(db: Arc<DatabaseConnection>, dispatcher: Arc<WebhookDispatcher>) -> Self {
        Self {
            db,
            dispatcher,
            fanout_tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Correlate one provider event with its email log and persist the new
    /// status. Bounces and complaints additionally fan out to subscribers.
    pub async fn handle_provider_event(&self, event: &ProviderEvent) -> Result<(), WebhookError> {
        let Some(kind) = EmailEventKind::parse(&event.kind) else {
            warn!("Ignoring unknown provider event kind: {}", event.kind);
            return Ok(());
        };

        let row = email_logs::Entity::find()
            .filter(email_logs::Column::ProviderMessageId.eq(event.provider_message_id.as_str()))
            .one(self.db.as_ref())
            .await?;

        let Some(row) = row else {
            warn!(
                "No email log for provider message id {}, dropping {} event",
                event.provider_message_id, event.kind
            );
            return Ok(());
        };

        let new_status = match kind {
            EmailEventKind::Delivered => status::DELIVERED,
            EmailEventKind::Bounced => status::BOUNCED,
            EmailEventKind::Complained => status::COMPLAINED,
            EmailEventKind::Failed => status::FAILED,
        };

        let mut active: email_logs::ActiveModel = row.clone().into();
        active.status = Set(new_status.to_string());
        if let Some(reason) = &event.reason {
            active.error_message = Set(Some(reason.clone()));
        }
        active.update(self.db.as_ref()).await?;

        info!(
            "Email {} status updated to {} from provider event",
            row.id, new_status
        );

        // Only the notable outcomes fan out; plain deliveries just settle
        // the row
        if matches!(
            kind,
            EmailEventKind::Bounced | EmailEventKind::Complained | EmailEventKind::Failed
        ) {
            let outbound = EmailEvent {
                event: kind,
                email_id: row.id,
                to: row.to_address.clone(),
                tenant_id: row.tenant_id,
                template: row.template.clone(),
                reason: event.reason.clone(),
                error: None,
                provider_message_id: Some(event.provider_message_id.clone()),
            };

            let dispatcher = self.dispatcher.clone();
            let email_id = row.id;
            let mut tasks = self.fanout_tasks.lock().await;
            // Reap finished fan-outs so the set stays bounded
            while tasks.try_join_next().is_some() {}
            tasks.spawn(async move {
                if let Err(e) = dispatcher.dispatch(&outbound).await {
                    error!("Webhook fan-out failed for email {}: {}", email_id, e);
                }
            });
        } else {
            debug!("No fan-out for {} event", kind);
        }

        Ok(())
    }

    /// Wait for all in-flight fan-out tasks; called on graceful shutdown
    pub async fn drain(&self) {
        let mut tasks = self.fanout_tasks.lock().await;
        while tasks.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailgate_core::WebhookSettings;
    use mailgate_database::test_utils::TestDatabase;
    use serde_json::json;
    use uuid::Uuid;

    async fn seed_sent_email(db: &TestDatabase, provider_message_id: &str) -> Uuid {
        let id = Uuid::new_v4();
        let row = email_logs::ActiveModel {
            id: Set(id),
            to_address: Set("a@x.com".to_string()),
            subject: Set("Hi".to_string()),
            data: Set(json!({})),
            status: Set("sent".to_string()),
            attempts: Set(1),
            provider_message_id: Set(Some(provider_message_id.to_string())),
            ..Default::default()
        };
        row.insert(db.connection()).await.unwrap();
        id
    }

    fn correlator(db: &TestDatabase) -> EmailEventCorrelator {
        let dispatcher = Arc::new(WebhookDispatcher::new(
            db.connection_arc(),
            WebhookSettings::default(),
        ));
        EmailEventCorrelator::new(db.connection_arc(), dispatcher)
    }

    #[tokio::test]
    async fn test_delivered_event_upgrades_status() {
        let db = TestDatabase::new().await.unwrap();
        let id = seed_sent_email(&db, "pm-1").await;
        let correlator = correlator(&db);

        correlator
            .handle_provider_event(&ProviderEvent {
                kind: "email.delivered".to_string(),
                provider_message_id: "pm-1".to_string(),
                recipient: None,
                reason: None,
            })
            .await
            .unwrap();

        let row = email_logs::Entity::find_by_id(id)
            .one(db.connection())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, "delivered");
    }

    #[tokio::test]
    async fn test_bounce_records_reason() {
        let db = TestDatabase::new().await.unwrap();
        let id = seed_sent_email(&db, "pm-2").await;
        let correlator = correlator(&db);

        correlator
            .handle_provider_event(&ProviderEvent {
                kind: "bounced".to_string(),
                provider_message_id: "pm-2".to_string(),
                recipient: Some("a@x.com".to_string()),
                reason: Some("mailbox full".to_string()),
            })
            .await
            .unwrap();

        let row = email_logs::Entity::find_by_id(id)
            .one(db.connection())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, "bounced");
        assert_eq!(row.error_message.as_deref(), Some("mailbox full"));

        // The fan-out task completes even with no subscribers configured
        correlator.drain().await;
    }

    #[tokio::test]
    async fn test_unknown_message_id_is_dropped() {
        let db = TestDatabase::new().await.unwrap();
        let correlator = correlator(&db);

        // No row, no error: the event is logged and dropped
        correlator
            .handle_provider_event(&ProviderEvent {
                kind: "email.delivered".to_string(),
                provider_message_id: "missing".to_string(),
                recipient: None,
                reason: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_kind_is_ignored() {
        let db = TestDatabase::new().await.unwrap();
        let id = seed_sent_email(&db, "pm-3").await;
        let correlator = correlator(&db);

        correlator
            .handle_provider_event(&ProviderEvent {
                kind: "email.opened".to_string(),
                provider_message_id: "pm-3".to_string(),
                recipient: None,
                reason: None,
            })
            .await
            .unwrap();

        let row = email_logs::Entity::find_by_id(id)
            .one(db.connection())
            .await
            .unwrap()
            .unwrap();
        // Status untouched
        assert_eq!(row.status, "sent");
    }
}
