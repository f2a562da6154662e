pub use super::email_logs::Entity as EmailLogs;
pub use super::email_message_ids::Entity as EmailMessageIds;
pub use super::email_templates::Entity as EmailTemplates;
pub use super::tenant_email_domains::Entity as TenantEmailDomains;
pub use super::tenants::Entity as Tenants;
pub use super::webhook_deliveries::Entity as WebhookDeliveries;
pub use super::webhook_endpoints::Entity as WebhookEndpoints;
