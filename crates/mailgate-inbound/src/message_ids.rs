//! Append-only Message-ID store
//!
//! Associates seen Message-IDs with `(tenant, ticket)` pairs so future
//! replies resolve through their threading headers. Rows are never updated
//! or deleted; duplicates are allowed and lookups take the first hit.

use mailgate_entities::email_message_ids;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use std::sync::Arc;
use tracing::debug;

use crate::errors::InboundError;

/// Strip surrounding angle brackets and whitespace from a Message-ID
pub fn normalize_message_id(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_string()
}

pub struct MessageIdStore {
    db: Arc<DatabaseConnection>,
}

impl MessageIdStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Record a Message-ID against a ticket (and comment, when applicable)
    pub async fn record(
        &self,
        tenant_id: i32,
        ticket_id: i64,
        message_id: &str,
        comment_id: Option<i64>,
    ) -> Result<email_message_ids::Model, InboundError> {
        let normalized = normalize_message_id(message_id);

        let row = email_message_ids::ActiveModel {
            tenant_id: Set(tenant_id),
            ticket_id: Set(ticket_id),
            message_id: Set(normalized),
            comment_id: Set(comment_id),
            ..Default::default()
        };

        let model = row.insert(self.db.as_ref()).await?;
        debug!(
            "Recorded message id {} for ticket {} (tenant {})",
            model.message_id, ticket_id, tenant_id
        );
        Ok(model)
    }

    /// Find the first stored association for a Message-ID, scoped to tenant
    pub async fn find(
        &self,
        tenant_id: i32,
        message_id: &str,
    ) -> Result<Option<email_message_ids::Model>, InboundError> {
        let normalized = normalize_message_id(message_id);
        if normalized.is_empty() {
            return Ok(None);
        }

        let row = email_message_ids::Entity::find()
            .filter(email_message_ids::Column::TenantId.eq(tenant_id))
            .filter(email_message_ids::Column::MessageId.eq(normalized))
            .order_by_asc(email_message_ids::Column::Id)
            .one(self.db.as_ref())
            .await?;

        Ok(row)
    }
}
