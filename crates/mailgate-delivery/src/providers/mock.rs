//! Mock email provider for testing

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::errors::DeliveryError;
use crate::providers::{
    DnsRecord, DomainIdentity, EmailProvider, EmailProviderKind, SendEmailRequest,
    SendEmailResponse, VerificationStatus,
};

/// Mock email provider for testing
#[derive(Debug, Clone)]
pub struct MockEmailProvider {
    /// Counters for tracking calls
    pub send_count: Arc<AtomicUsize>,
    pub create_identity_count: Arc<AtomicUsize>,
    pub verify_identity_count: Arc<AtomicUsize>,
    pub delete_identity_count: Arc<AtomicUsize>,

    /// Requests passed to `send`, in call order
    sent_requests: Arc<Mutex<Vec<SendEmailRequest>>>,

    /// Configurable responses
    pub should_fail_send: bool,
    pub verification_status: VerificationStatus,
}

impl Default for MockEmailProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmailProvider {
    pub fn new() -> Self {
        Self {
            send_count: Arc::new(AtomicUsize::new(0)),
            create_identity_count: Arc::new(AtomicUsize::new(0)),
            verify_identity_count: Arc::new(AtomicUsize::new(0)),
            delete_identity_count: Arc::new(AtomicUsize::new(0)),
            sent_requests: Arc::new(Mutex::new(Vec::new())),
            should_fail_send: false,
            verification_status: VerificationStatus::Verified,
        }
    }

    pub fn with_send_failure(mut self) -> Self {
        self.should_fail_send = true;
        self
    }

    pub fn with_verification_status(mut self, status: VerificationStatus) -> Self {
        self.verification_status = status;
        self
    }

    pub fn send_call_count(&self) -> usize {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn create_identity_call_count(&self) -> usize {
        self.create_identity_count.load(Ordering::SeqCst)
    }

    pub fn verify_identity_call_count(&self) -> usize {
        self.verify_identity_count.load(Ordering::SeqCst)
    }

    pub fn delete_identity_call_count(&self) -> usize {
        self.delete_identity_count.load(Ordering::SeqCst)
    }

    pub fn sent_requests(&self) -> Vec<SendEmailRequest> {
        self.sent_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailProvider for MockEmailProvider {
    async fn create_identity(&self, domain: &str) -> Result<DomainIdentity, DeliveryError> {
        self.create_identity_count.fetch_add(1, Ordering::SeqCst);

        let mail_from_domain = format!("send.{}", domain);
        Ok(DomainIdentity {
            provider_identity_id: format!("mock-identity-{}", domain),
            // SPF on the MAIL FROM subdomain
            spf_record: Some(DnsRecord {
                record_type: "TXT".to_string(),
                name: mail_from_domain.clone(),
                value: "v=spf1 include:mock.example.com ~all".to_string(),
                priority: None,
            }),
            // DKIM on the root domain
            dkim_records: vec![DnsRecord {
                record_type: "CNAME".to_string(),
                name: format!("mock._domainkey.{}", domain),
                value: "mock.dkim.example.com".to_string(),
                priority: None,
            }],
            dkim_selector: Some("mock".to_string()),
            // MX on the MAIL FROM subdomain
            mx_record: Some(DnsRecord {
                record_type: "MX".to_string(),
                name: mail_from_domain,
                value: "feedback-smtp.mock.example.com".to_string(),
                priority: Some(10),
            }),
        })
    }

    async fn verify_identity(&self, _domain: &str) -> Result<VerificationStatus, DeliveryError> {
        self.verify_identity_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.verification_status.clone())
    }

    async fn delete_identity(&self, _domain: &str) -> Result<(), DeliveryError> {
        self.delete_identity_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, email: &SendEmailRequest) -> Result<SendEmailResponse, DeliveryError> {
        self.send_count.fetch_add(1, Ordering::SeqCst);
        self.sent_requests.lock().unwrap().push(email.clone());

        if self.should_fail_send {
            return Err(DeliveryError::Provider("Mock send failure".to_string()));
        }

        Ok(SendEmailResponse {
            message_id: format!("mock-message-{}", uuid::Uuid::new_v4()),
        })
    }

    fn kind(&self) -> EmailProviderKind {
        EmailProviderKind::Mock
    }
}
