pub mod tenants;
pub mod email_templates;
pub mod email_logs;
pub mod email_message_ids;
pub mod tenant_email_domains;
pub mod webhook_endpoints;
pub mod webhook_deliveries;

pub mod prelude;
