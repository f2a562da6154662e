//! Email provider trait definitions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::DeliveryError;

/// Supported email provider kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EmailProviderKind {
    /// Generic HTTP transactional-email API
    Http,
    /// In-process mock (testing and capture mode)
    Mock,
}

impl std::fmt::Display for EmailProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailProviderKind::Http => write!(f, "http"),
            EmailProviderKind::Mock => write!(f, "mock"),
        }
    }
}

impl EmailProviderKind {
    pub fn from_str(s: &str) -> Result<Self, DeliveryError> {
        match s.to_lowercase().as_str() {
            "http" => Ok(EmailProviderKind::Http),
            "mock" => Ok(EmailProviderKind::Mock),
            _ => Err(DeliveryError::Validation(format!(
                "Unknown provider kind: {}",
                s
            ))),
        }
    }
}

/// DNS record required for domain verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DnsRecord {
    /// Record type: TXT, CNAME, MX
    #[schema(example = "TXT")]
    pub record_type: String,
    /// DNS record name (host)
    pub name: String,
    /// DNS record value
    pub value: String,
    /// Priority (for MX records)
    pub priority: Option<u16>,
}

/// Domain identity with required DNS records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainIdentity {
    /// Provider-specific identity ID
    pub provider_identity_id: String,
    /// SPF record
    pub spf_record: Option<DnsRecord>,
    /// DKIM records
    pub dkim_records: Vec<DnsRecord>,
    /// DKIM selector
    pub dkim_selector: Option<String>,
    /// MX record for bounce handling
    pub mx_record: Option<DnsRecord>,
}

/// Domain verification status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// Verification in progress
    Pending,
    /// Domain successfully verified
    Verified,
    /// Verification failed
    Failed(String),
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationStatus::Pending => write!(f, "pending"),
            VerificationStatus::Verified => write!(f, "verified"),
            VerificationStatus::Failed(_) => write!(f, "failed"),
        }
    }
}

/// Outbound attachment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: Option<String>,
    /// Base64-encoded content
    pub content: String,
}

/// Request to send an email through the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmailRequest {
    /// Sender email address
    pub from: String,
    /// Sender display name (optional)
    pub from_name: Option<String>,
    /// Recipient email addresses
    pub to: Vec<String>,
    /// Reply-to address
    pub reply_to: Option<String>,
    /// Email subject
    pub subject: String,
    /// HTML body content
    pub html: Option<String>,
    /// Plain text body content
    pub text: Option<String>,
    /// Custom headers
    pub headers: Option<std::collections::HashMap<String, String>>,
    /// Provider-side tags
    pub tags: Option<Vec<String>>,
    /// Attachments
    pub attachments: Option<Vec<Attachment>>,
}

/// Response from sending an email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmailResponse {
    /// Provider's message ID
    pub message_id: String,
}

/// Email provider trait for abstracting the transactional-email service
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Register a domain and get the required DNS records
    async fn create_identity(&self, domain: &str) -> Result<DomainIdentity, DeliveryError>;

    /// Verify domain DNS configuration
    async fn verify_identity(&self, domain: &str) -> Result<VerificationStatus, DeliveryError>;

    /// Delete domain identity
    async fn delete_identity(&self, domain: &str) -> Result<(), DeliveryError>;

    /// Send an email
    async fn send(&self, email: &SendEmailRequest) -> Result<SendEmailResponse, DeliveryError>;

    /// Get the provider kind
    fn kind(&self) -> EmailProviderKind;
}
