//! Email address parsing and tenant resolution

use mailgate_entities::tenants;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::debug;

use crate::errors::InboundError;

/// An email address split against the platform base domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    /// Lowercased, trimmed address
    pub email: String,
    /// Tenant subdomain when the address lives under the base domain
    pub subdomain: Option<String>,
    /// The base domain, or the full domain for foreign addresses
    pub base_domain: String,
}

/// A resolved tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRef {
    pub id: i32,
    pub subdomain: String,
}

/// Parse an address into local part, subdomain and base domain.
///
/// `local@sub.base.com` with base domain `base.com` yields subdomain `sub`;
/// any other domain yields no subdomain and the full domain as base.
pub fn parse_address(email: &str, base_domain: &str) -> ParsedAddress {
    let email = email.trim().to_lowercase();
    let base_domain = base_domain.trim().to_lowercase();

    let domain = email.split_once('@').map(|(_, d)| d).unwrap_or("");
    let suffix = format!(".{}", base_domain);

    if let Some(prefix) = domain.strip_suffix(&suffix) {
        if !prefix.is_empty() {
            let subdomain = Some(prefix.to_string());
            return ParsedAddress {
                email,
                subdomain,
                base_domain,
            };
        }
    }

    let base_domain = domain.to_string();
    ParsedAddress {
        email,
        subdomain: None,
        base_domain,
    }
}

/// Strip a display name from a `From:`-style field: `"Name <addr>"` -> `addr`
pub fn strip_display_name(field: &str) -> String {
    if let (Some(start), Some(end)) = (field.find('<'), field.rfind('>')) {
        if start < end {
            return field[start + 1..end].trim().to_lowercase();
        }
    }
    field.trim().to_lowercase()
}

/// Extract the display name from a `From:`-style field, if any
pub fn display_name(field: &str) -> Option<String> {
    let start = field.find('<')?;
    let name = field[..start].trim().trim_matches('"').trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Compute the deduplicated set of additional recipients: every `To` address
/// except the tenant's canonical support address, plus every `Cc` address.
/// Used to decide ticket watchers.
pub fn additional_recipients(
    to: &[String],
    cc: &[String],
    support_address: &str,
) -> Vec<String> {
    let support = support_address.trim().to_lowercase();
    let mut seen = Vec::new();

    for raw in to.iter().chain(cc.iter()) {
        let address = strip_display_name(raw);
        if address.is_empty() || address == support {
            continue;
        }
        if !seen.contains(&address) {
            seen.push(address);
        }
    }

    seen
}

/// Resolves inbound recipient addresses to tenants
pub struct TenantResolver {
    db: Arc<DatabaseConnection>,
    base_domain: String,
    support_local: String,
}

impl TenantResolver {
    pub fn new(db: Arc<DatabaseConnection>, base_domain: &str, support_local: &str) -> Self {
        Self {
            db,
            base_domain: base_domain.to_lowercase(),
            support_local: support_local.to_string(),
        }
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    /// Look up a tenant by subdomain. A miss is a reported outcome, not an
    /// error.
    pub async fn resolve_subdomain(
        &self,
        subdomain: &str,
    ) -> Result<Option<TenantRef>, InboundError> {
        let tenant = tenants::Entity::find()
            .filter(tenants::Column::Subdomain.eq(subdomain))
            .one(self.db.as_ref())
            .await?;

        Ok(tenant.map(|t| TenantRef {
            id: t.id,
            subdomain: t.subdomain,
        }))
    }

    /// Resolve the tenant owning a recipient address, if any
    pub async fn resolve_recipient(
        &self,
        address: &str,
    ) -> Result<Option<TenantRef>, InboundError> {
        let parsed = parse_address(address, &self.base_domain);

        let Some(subdomain) = parsed.subdomain else {
            debug!("Recipient {} is not under base domain {}", parsed.email, self.base_domain);
            return Ok(None);
        };

        self.resolve_subdomain(&subdomain).await
    }

    /// The tenant's canonical support address
    pub fn support_address(&self, tenant: &TenantRef) -> String {
        format!(
            "{}@{}.{}",
            self.support_local, tenant.subdomain, self.base_domain
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_with_subdomain() {
        let parsed = parse_address("Local@Sub.Base.com", "base.com");
        assert_eq!(parsed.email, "local@sub.base.com");
        assert_eq!(parsed.subdomain, Some("sub".to_string()));
        assert_eq!(parsed.base_domain, "base.com");
    }

    #[test]
    fn test_parse_address_foreign_domain() {
        let parsed = parse_address("local@other.com", "base.com");
        assert_eq!(parsed.subdomain, None);
        assert_eq!(parsed.base_domain, "other.com");
    }

    #[test]
    fn test_parse_address_apex_has_no_subdomain() {
        let parsed = parse_address("local@base.com", "base.com");
        assert_eq!(parsed.subdomain, None);
    }

    #[test]
    fn test_parse_address_nested_subdomain() {
        let parsed = parse_address("a@deep.sub.base.com", "base.com");
        assert_eq!(parsed.subdomain, Some("deep.sub".to_string()));
    }

    #[test]
    fn test_parse_address_without_at() {
        let parsed = parse_address("not-an-address", "base.com");
        assert_eq!(parsed.subdomain, None);
        assert_eq!(parsed.base_domain, "");
    }

    #[test]
    fn test_strip_display_name() {
        assert_eq!(
            strip_display_name("Jane Doe <jane@example.com>"),
            "jane@example.com"
        );
        assert_eq!(strip_display_name("jane@example.com"), "jane@example.com");
        assert_eq!(
            strip_display_name("\"Doe, Jane\" <Jane@Example.com>"),
            "jane@example.com"
        );
    }

    #[test]
    fn test_display_name() {
        assert_eq!(
            display_name("Jane Doe <jane@example.com>"),
            Some("Jane Doe".to_string())
        );
        assert_eq!(
            display_name("\"Doe, Jane\" <jane@example.com>"),
            Some("Doe, Jane".to_string())
        );
        assert_eq!(display_name("jane@example.com"), None);
        assert_eq!(display_name("<jane@example.com>"), None);
    }

    #[test]
    fn test_additional_recipients_excludes_support_and_dedups() {
        let to = vec![
            "support@acme.base.com".to_string(),
            "Bob <bob@example.com>".to_string(),
        ];
        let cc = vec![
            "carol@example.com".to_string(),
            "bob@example.com".to_string(),
        ];

        let recipients = additional_recipients(&to, &cc, "support@acme.base.com");
        assert_eq!(recipients, vec!["bob@example.com", "carol@example.com"]);
    }

    #[test]
    fn test_additional_recipients_empty() {
        let recipients = additional_recipients(&[], &[], "support@acme.base.com");
        assert!(recipients.is_empty());
    }
}
