//! Subscriber endpoint registry

use mailgate_core::EmailEventKind;
use mailgate_entities::{webhook_deliveries, webhook_endpoints};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use std::sync::Arc;
use tracing::info;

use crate::dispatcher::WebhookError;

/// Request to register a subscriber endpoint
#[derive(Debug, Clone)]
pub struct CreateEndpointRequest {
    pub tenant_id: Option<i32>,
    pub url: String,
    pub secret: Option<String>,
    pub events: Vec<EmailEventKind>,
}

pub struct SubscriptionService {
    db: Arc<DatabaseConnection>,
}

impl SubscriptionService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Register a new subscriber endpoint
    pub async fn create(
        &self,
        request: CreateEndpointRequest,
    ) -> Result<webhook_endpoints::Model, WebhookError> {
        let events: Vec<&str> = request.events.iter().map(|e| e.as_str()).collect();

        let endpoint = webhook_endpoints::ActiveModel {
            tenant_id: Set(request.tenant_id),
            url: Set(request.url),
            secret: Set(request.secret),
            events: Set(serde_json::to_value(&events)?),
            ..Default::default()
        };

        let result = endpoint.insert(self.db.as_ref()).await?;
        info!("Created webhook endpoint {} for {}", result.id, result.url);
        Ok(result)
    }

    /// List all endpoints
    pub async fn list(&self) -> Result<Vec<webhook_endpoints::Model>, WebhookError> {
        let endpoints = webhook_endpoints::Entity::find()
            .order_by_desc(webhook_endpoints::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(endpoints)
    }

    /// Delete an endpoint
    pub async fn delete(&self, endpoint_id: i32) -> Result<bool, WebhookError> {
        let result = webhook_endpoints::Entity::delete_by_id(endpoint_id)
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Recent delivery history for an endpoint
    pub async fn get_deliveries(
        &self,
        endpoint_id: i32,
        limit: u64,
    ) -> Result<Vec<webhook_deliveries::Model>, WebhookError> {
        let deliveries = webhook_deliveries::Entity::find()
            .filter(webhook_deliveries::Column::EndpointId.eq(endpoint_id))
            .order_by_desc(webhook_deliveries::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;
        Ok(deliveries)
    }
}
