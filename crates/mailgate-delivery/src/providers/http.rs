//! Generic HTTP transactional-email provider
//!
//! Speaks the provider API described by the external contract: message send,
//! domain identity create/verify/delete. Deployments point this at their
//! provider-compatible endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::{
    DnsRecord, DomainIdentity, EmailProvider, EmailProviderKind, SendEmailRequest,
    SendEmailResponse, VerificationStatus,
};
use crate::errors::DeliveryError;

/// HTTP provider credentials configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpProviderCredentials {
    pub base_url: String,
    pub api_key: String,
}

/// Generic HTTP provider implementation
pub struct HttpEmailProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpEmailProvider {
    pub fn new(credentials: &HttpProviderCredentials) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("Mailgate/1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: credentials.base_url.trim_end_matches('/').to_string(),
            api_key: credentials.api_key.clone(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check_status(
        response: reqwest::Response,
        action: &str,
    ) -> Result<reqwest::Response, DeliveryError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(DeliveryError::Provider(format!(
            "{} failed ({}): {}",
            action, status, body
        )))
    }
}

// Provider API response types
#[derive(Debug, Deserialize)]
struct ProviderSendResponse {
    message_id: String,
}

#[derive(Debug, Deserialize)]
struct ProviderDomainResponse {
    id: String,
    spf_record: Option<DnsRecord>,
    #[serde(default)]
    dkim_records: Vec<DnsRecord>,
    dkim_selector: Option<String>,
    mx_record: Option<DnsRecord>,
}

#[derive(Debug, Deserialize)]
struct ProviderVerificationResponse {
    status: String,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProviderCreateDomainRequest<'a> {
    domain: &'a str,
}

#[async_trait]
impl EmailProvider for HttpEmailProvider {
    async fn create_identity(&self, domain: &str) -> Result<DomainIdentity, DeliveryError> {
        debug!("Creating provider identity for domain: {}", domain);

        let response = self
            .client
            .post(self.api_url("/domains"))
            .header("X-Auth-Token", &self.api_key)
            .json(&ProviderCreateDomainRequest { domain })
            .send()
            .await?;

        let response = Self::check_status(response, "Domain creation").await?;

        let domain_response: ProviderDomainResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::Provider(format!("Failed to parse domain response: {}", e)))?;

        Ok(DomainIdentity {
            provider_identity_id: domain_response.id,
            spf_record: domain_response.spf_record,
            dkim_records: domain_response.dkim_records,
            dkim_selector: domain_response.dkim_selector,
            mx_record: domain_response.mx_record,
        })
    }

    async fn verify_identity(&self, domain: &str) -> Result<VerificationStatus, DeliveryError> {
        debug!("Verifying provider identity for domain: {}", domain);

        let response = self
            .client
            .get(self.api_url(&format!("/domains/{}/verification", domain)))
            .header("X-Auth-Token", &self.api_key)
            .send()
            .await?;

        let response = Self::check_status(response, "Domain verification").await?;

        let verification: ProviderVerificationResponse = response.json().await.map_err(|e| {
            DeliveryError::Provider(format!("Failed to parse verification response: {}", e))
        })?;

        let status = match verification.status.as_str() {
            "verified" => VerificationStatus::Verified,
            "failed" => VerificationStatus::Failed(
                verification.error.unwrap_or_else(|| "unknown".to_string()),
            ),
            _ => VerificationStatus::Pending,
        };

        Ok(status)
    }

    async fn delete_identity(&self, domain: &str) -> Result<(), DeliveryError> {
        debug!("Deleting provider identity for domain: {}", domain);

        let response = self
            .client
            .delete(self.api_url(&format!("/domains/{}", domain)))
            .header("X-Auth-Token", &self.api_key)
            .send()
            .await?;

        Self::check_status(response, "Domain deletion").await?;
        Ok(())
    }

    async fn send(&self, email: &SendEmailRequest) -> Result<SendEmailResponse, DeliveryError> {
        debug!("Sending email to {:?} via provider", email.to);

        let response = self
            .client
            .post(self.api_url("/messages"))
            .header("X-Auth-Token", &self.api_key)
            .json(email)
            .send()
            .await?;

        let response = Self::check_status(response, "Send").await?;

        let send_response: ProviderSendResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::Provider(format!("Failed to parse send response: {}", e)))?;

        Ok(SendEmailResponse {
            message_id: send_response.message_id,
        })
    }

    fn kind(&self) -> EmailProviderKind {
        EmailProviderKind::Http
    }
}
