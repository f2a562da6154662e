//! Tenant email domains entity
//!
//! One row per `(tenant, domain)` pair: the platform-provisioned subdomain or
//! a tenant-supplied BYOD domain, together with the DNS records required for
//! verification and the ids of records created on the DNS provider.

use async_trait::async_trait;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, ConnectionTrait, DbErr};
use serde::{Deserialize, Serialize};
use mailgate_core::DBDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "tenant_email_domains")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub tenant_id: i32,
    pub domain: String,
    pub status: String,
    pub spf_record_name: Option<String>,
    pub spf_record_value: Option<String>,
    pub dkim_selector: Option<String>,
    pub dkim_record_name: Option<String>,
    pub dkim_record_value: Option<String>,
    pub mx_record_name: Option<String>,
    pub mx_record_value: Option<String>,
    pub mx_record_priority: Option<i16>,
    pub provider_identity_id: Option<String>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub dns_record_ids: Option<Json>,
    pub last_verified_at: Option<DBDateTime>,
    pub verification_error: Option<String>,
    pub created_at: DBDateTime,
    pub updated_at: DBDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenants::Entity",
        from = "Column::TenantId",
        to = "super::tenants::Column::Id"
    )]
    Tenant,
}

impl Related<super::tenants::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = chrono::Utc::now();

        if insert {
            if self.created_at.is_not_set() {
                self.created_at = Set(now);
            }
            if self.updated_at.is_not_set() {
                self.updated_at = Set(now);
            }
        } else {
            self.updated_at = Set(now);
        }

        Ok(self)
    }
}
