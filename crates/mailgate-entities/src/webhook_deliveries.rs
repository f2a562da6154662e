//! Webhook deliveries entity
//!
//! One row per outbound notification attempt sequence to a single subscriber
//! endpoint. Terminal at `sent`, or at `failed` once retries exhaust.

use async_trait::async_trait;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, ConnectionTrait, DbErr};
use serde::{Deserialize, Serialize};
use mailgate_core::DBDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "webhook_deliveries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub email_log_id: Uuid,
    pub endpoint_id: i32,
    pub event: String,
    /// JSON payload that was sent
    #[sea_orm(column_type = "Text")]
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub status_code: Option<i32>,
    pub last_error: Option<String>,
    pub sent_at: Option<DBDateTime>,
    pub created_at: DBDateTime,
}

pub mod status {
    pub const PENDING: &str = "pending";
    pub const SENT: &str = "sent";
    pub const FAILED: &str = "failed";
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::email_logs::Entity",
        from = "Column::EmailLogId",
        to = "super::email_logs::Column::Id"
    )]
    EmailLog,
    #[sea_orm(
        belongs_to = "super::webhook_endpoints::Entity",
        from = "Column::EndpointId",
        to = "super::webhook_endpoints::Column::Id"
    )]
    WebhookEndpoint,
}

impl Related<super::email_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EmailLog.def()
    }
}

impl Related<super::webhook_endpoints::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WebhookEndpoint.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if insert {
            if self.created_at.is_not_set() {
                self.created_at = Set(chrono::Utc::now());
            }
            if self.status.is_not_set() {
                self.status = Set(status::PENDING.to_string());
            }
            if self.attempts.is_not_set() {
                self.attempts = Set(0);
            }
        }

        Ok(self)
    }
}
