//! Tenant sending-domain provisioning and verification

use chrono::Utc;
use mailgate_entities::tenant_email_domains;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::dns::{DnsProvider, DnsRecordSpec};
use crate::errors::DeliveryError;
use crate::providers::{DnsRecord, DomainIdentity, EmailProvider, VerificationStatus};

/// Service for managing tenant email domains
pub struct DomainService {
    db: Arc<DatabaseConnection>,
    provider: Arc<dyn EmailProvider>,
    dns: Arc<dyn DnsProvider>,
}

/// Domain with its verification DNS records for display
#[derive(Debug, Clone)]
pub struct DomainWithDnsRecords {
    pub domain: tenant_email_domains::Model,
    pub dns_records: Vec<DnsRecord>,
}

impl DomainService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        provider: Arc<dyn EmailProvider>,
        dns: Arc<dyn DnsProvider>,
    ) -> Self {
        Self { db, provider, dns }
    }

    /// Register a domain: create the provider identity, install the
    /// verification records on the DNS provider, persist the row.
    pub async fn create(
        &self,
        tenant_id: i32,
        domain: &str,
    ) -> Result<DomainWithDnsRecords, DeliveryError> {
        debug!("Creating email domain {} for tenant {}", domain, tenant_id);

        let identity = self.provider.create_identity(domain).await.map_err(|e| {
            error!("Failed to create domain identity: {}", e);
            e
        })?;

        let dns_records = collect_records(&identity);

        // Install the records on the DNS provider, remembering their ids for
        // teardown
        let mut record_ids = Vec::new();
        for record in &dns_records {
            let id = self
                .dns
                .create_record(&DnsRecordSpec {
                    record_type: record.record_type.clone(),
                    name: record.name.clone(),
                    content: record.value.clone(),
                    priority: record.priority,
                })
                .await?;
            record_ids.push(Value::String(id));
        }

        let row = tenant_email_domains::ActiveModel {
            tenant_id: Set(tenant_id),
            domain: Set(domain.to_string()),
            status: Set("pending".to_string()),
            spf_record_name: Set(identity.spf_record.as_ref().map(|r| r.name.clone())),
            spf_record_value: Set(identity.spf_record.as_ref().map(|r| r.value.clone())),
            dkim_selector: Set(identity.dkim_selector.clone()),
            dkim_record_name: Set(identity.dkim_records.first().map(|r| r.name.clone())),
            dkim_record_value: Set(identity.dkim_records.first().map(|r| r.value.clone())),
            mx_record_name: Set(identity.mx_record.as_ref().map(|r| r.name.clone())),
            mx_record_value: Set(identity.mx_record.as_ref().map(|r| r.value.clone())),
            mx_record_priority: Set(identity
                .mx_record
                .as_ref()
                .and_then(|r| r.priority.map(|p| p as i16))),
            provider_identity_id: Set(Some(identity.provider_identity_id)),
            dns_record_ids: Set(Some(Value::Array(record_ids))),
            ..Default::default()
        };

        let result = row.insert(self.db.as_ref()).await?;

        info!("Created email domain {} with id {}", domain, result.id);

        Ok(DomainWithDnsRecords {
            domain: result,
            dns_records,
        })
    }

    /// Get a domain by id
    pub async fn get(&self, id: i32) -> Result<tenant_email_domains::Model, DeliveryError> {
        tenant_email_domains::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or(DeliveryError::DomainNotFound(id))
    }

    /// List all domains
    pub async fn list(&self) -> Result<Vec<tenant_email_domains::Model>, DeliveryError> {
        let domains = tenant_email_domains::Entity::find()
            .order_by_desc(tenant_email_domains::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(domains)
    }

    /// List a tenant's domains
    pub async fn list_for_tenant(
        &self,
        tenant_id: i32,
    ) -> Result<Vec<tenant_email_domains::Model>, DeliveryError> {
        let domains = tenant_email_domains::Entity::find()
            .filter(tenant_email_domains::Column::TenantId.eq(tenant_id))
            .order_by_desc(tenant_email_domains::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(domains)
    }

    /// The tenant's oldest verified domain, used for sender selection
    pub async fn find_verified_for_tenant(
        &self,
        tenant_id: i32,
    ) -> Result<Option<tenant_email_domains::Model>, DeliveryError> {
        let domain = tenant_email_domains::Entity::find()
            .filter(tenant_email_domains::Column::TenantId.eq(tenant_id))
            .filter(tenant_email_domains::Column::Status.eq("verified"))
            .order_by_asc(tenant_email_domains::Column::CreatedAt)
            .one(self.db.as_ref())
            .await?;
        Ok(domain)
    }

    /// Ask the provider for the domain's verification status and persist it
    pub async fn verify(&self, id: i32) -> Result<tenant_email_domains::Model, DeliveryError> {
        let domain = self.get(id).await?;

        debug!("Verifying domain {}", domain.domain);

        let status = self.provider.verify_identity(&domain.domain).await?;

        let mut active: tenant_email_domains::ActiveModel = domain.into();
        match &status {
            VerificationStatus::Verified => {
                active.status = Set("verified".to_string());
                active.last_verified_at = Set(Some(Utc::now()));
                active.verification_error = Set(None);
            }
            VerificationStatus::Pending => {
                active.status = Set("pending".to_string());
            }
            VerificationStatus::Failed(reason) => {
                active.status = Set("failed".to_string());
                active.verification_error = Set(Some(reason.clone()));
            }
        }

        let updated = active.update(self.db.as_ref()).await?;
        info!("Domain {} verification status: {}", updated.domain, status);
        Ok(updated)
    }

    /// Tear down a domain: remove DNS records, delete the provider identity,
    /// then the row. DNS record removal is best-effort.
    pub async fn delete(&self, id: i32) -> Result<(), DeliveryError> {
        let domain = self.get(id).await?;

        if let Some(Value::Array(ids)) = &domain.dns_record_ids {
            for record_id in ids.iter().filter_map(|v| v.as_str()) {
                if let Err(e) = self.dns.delete_record(record_id).await {
                    warn!("Failed to delete DNS record {}: {}", record_id, e);
                }
            }
        }

        self.provider.delete_identity(&domain.domain).await?;

        tenant_email_domains::Entity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await?;

        info!("Deleted email domain {}", domain.domain);
        Ok(())
    }
}

fn collect_records(identity: &DomainIdentity) -> Vec<DnsRecord> {
    let mut records = Vec::new();

    if let Some(spf) = &identity.spf_record {
        records.push(spf.clone());
    }

    records.extend(identity.dkim_records.clone());

    if let Some(mx) = &identity.mx_record {
        records.push(mx.clone());
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::MockDnsProvider;
    use crate::providers::MockEmailProvider;
    use mailgate_database::test_utils::TestDatabase;

    async fn seed_tenant(db: &TestDatabase) -> i32 {
        let tenant = mailgate_entities::tenants::ActiveModel {
            name: Set("Acme".to_string()),
            subdomain: Set("acme".to_string()),
            ..Default::default()
        };
        tenant.insert(db.connection()).await.unwrap().id
    }

    fn service(
        db: &TestDatabase,
        provider: MockEmailProvider,
        dns: Arc<MockDnsProvider>,
    ) -> DomainService {
        DomainService::new(db.connection_arc(), Arc::new(provider), dns)
    }

    #[tokio::test]
    async fn test_create_registers_identity_and_dns_records() {
        let db = TestDatabase::new().await.unwrap();
        let tenant_id = seed_tenant(&db).await;
        let dns = Arc::new(MockDnsProvider::new());
        let service = service(&db, MockEmailProvider::new(), dns.clone());

        let created = service.create(tenant_id, "mail.acme.com").await.unwrap();

        assert_eq!(created.domain.status, "pending");
        assert_eq!(
            created.domain.provider_identity_id.as_deref(),
            Some("mock-identity-mail.acme.com")
        );
        // SPF + DKIM + MX
        assert_eq!(created.dns_records.len(), 3);
        assert_eq!(dns.record_count(), 3);

        // Record ids were persisted for teardown
        let ids = created.domain.dns_record_ids.unwrap();
        assert_eq!(ids.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_verify_marks_domain_verified() {
        let db = TestDatabase::new().await.unwrap();
        let tenant_id = seed_tenant(&db).await;
        let service = service(&db, MockEmailProvider::new(), Arc::new(MockDnsProvider::new()));

        let created = service.create(tenant_id, "mail.acme.com").await.unwrap();
        let verified = service.verify(created.domain.id).await.unwrap();

        assert_eq!(verified.status, "verified");
        assert!(verified.last_verified_at.is_some());
        assert!(verified.verification_error.is_none());
    }

    #[tokio::test]
    async fn test_verify_records_failure_reason() {
        let db = TestDatabase::new().await.unwrap();
        let tenant_id = seed_tenant(&db).await;
        let provider = MockEmailProvider::new()
            .with_verification_status(VerificationStatus::Failed("missing SPF".to_string()));
        let service = service(&db, provider, Arc::new(MockDnsProvider::new()));

        let created = service.create(tenant_id, "mail.acme.com").await.unwrap();
        let verified = service.verify(created.domain.id).await.unwrap();

        assert_eq!(verified.status, "failed");
        assert_eq!(verified.verification_error.as_deref(), Some("missing SPF"));
    }

    #[tokio::test]
    async fn test_find_verified_for_tenant() {
        let db = TestDatabase::new().await.unwrap();
        let tenant_id = seed_tenant(&db).await;
        let service = service(&db, MockEmailProvider::new(), Arc::new(MockDnsProvider::new()));

        assert!(service
            .find_verified_for_tenant(tenant_id)
            .await
            .unwrap()
            .is_none());

        let created = service.create(tenant_id, "mail.acme.com").await.unwrap();
        service.verify(created.domain.id).await.unwrap();

        let found = service.find_verified_for_tenant(tenant_id).await.unwrap();
        assert_eq!(found.map(|d| d.domain), Some("mail.acme.com".to_string()));
    }

    #[tokio::test]
    async fn test_delete_tears_down_records_and_identity() {
        let db = TestDatabase::new().await.unwrap();
        let tenant_id = seed_tenant(&db).await;
        let dns = Arc::new(MockDnsProvider::new());
        let provider = MockEmailProvider::new();
        let service = DomainService::new(
            db.connection_arc(),
            Arc::new(provider.clone()),
            dns.clone(),
        );

        let created = service.create(tenant_id, "mail.acme.com").await.unwrap();
        service.delete(created.domain.id).await.unwrap();

        assert_eq!(dns.record_count(), 0);
        assert_eq!(provider.delete_identity_call_count(), 1);
        assert!(matches!(
            service.get(created.domain.id).await,
            Err(DeliveryError::DomainNotFound(_))
        ));
    }
}
