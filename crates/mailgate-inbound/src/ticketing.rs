//! Ticketing system client
//!
//! The ticketing system is an external collaborator. The trait covers the
//! three operations inbound routing needs; the HTTP implementation speaks the
//! ticketing API, and the mock backs tests.

use async_trait::async_trait;
use mailgate_core::TicketingSettings;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::address::TenantRef;
use crate::email::AttachmentDescriptor;
use crate::errors::InboundError;

/// A ticket on the external ticketing system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TicketRef {
    pub id: i64,
}

/// A comment on the external ticketing system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CommentRef {
    pub id: i64,
}

/// Fields extracted from an inbound email for an "add comment" call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailComment {
    pub sender_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub additional_recipients: Vec<String>,
    pub subject: String,
    pub text_body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub attachments: Vec<AttachmentDescriptor>,
}

/// Fields for a "create ticket" call: the comment fields plus threading
/// headers, so the ticketing side can seed its own correlation state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTicket {
    pub sender_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub additional_recipients: Vec<String>,
    pub subject: String,
    pub text_body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
    pub attachments: Vec<AttachmentDescriptor>,
}

/// Client for the external ticketing system
#[async_trait]
pub trait TicketingClient: Send + Sync {
    /// Resolve a human-facing ticket number to a ticket, scoped to tenant
    async fn find_ticket_by_number(
        &self,
        tenant: &TenantRef,
        number: i64,
    ) -> Result<Option<TicketRef>, InboundError>;

    /// Open a new ticket from an inbound email
    async fn create_ticket_from_email(
        &self,
        tenant: &TenantRef,
        ticket: &EmailTicket,
    ) -> Result<TicketRef, InboundError>;

    /// Append an inbound email as a comment on an existing ticket
    async fn add_comment_from_email(
        &self,
        tenant: &TenantRef,
        ticket_id: i64,
        comment: &EmailComment,
    ) -> Result<CommentRef, InboundError>;
}

/// HTTP implementation of the ticketing API
pub struct HttpTicketingClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct CreateTicketBody<'a> {
    tenant_subdomain: &'a str,
    #[serde(flatten)]
    ticket: &'a EmailTicket,
}

#[derive(Serialize)]
struct AddCommentBody<'a> {
    tenant_subdomain: &'a str,
    #[serde(flatten)]
    comment: &'a EmailComment,
}

impl HttpTicketingClient {
    pub fn new(settings: &TicketingSettings) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("Mailgate/1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder, tenant: &TenantRef) -> reqwest::RequestBuilder {
        let mut builder = builder.header("X-Tenant-Id", tenant.id.to_string());
        if let Some(key) = &self.api_key {
            builder = builder.header("X-Api-Key", key);
        }
        builder
    }
}

#[async_trait]
impl TicketingClient for HttpTicketingClient {
    async fn find_ticket_by_number(
        &self,
        tenant: &TenantRef,
        number: i64,
    ) -> Result<Option<TicketRef>, InboundError> {
        let url = format!("{}/tickets/by-number/{}", self.base_url, number);
        debug!("Looking up ticket number {} for tenant {}", number, tenant.subdomain);

        let response = self
            .request(self.client.get(&url), tenant)
            .query(&[("tenantSubdomain", tenant.subdomain.as_str())])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InboundError::Ticketing(format!(
                "Ticket lookup failed ({}): {}",
                status, body
            )));
        }

        let ticket: TicketRef = response.json().await?;
        Ok(Some(ticket))
    }

    async fn create_ticket_from_email(
        &self,
        tenant: &TenantRef,
        ticket: &EmailTicket,
    ) -> Result<TicketRef, InboundError> {
        let url = format!("{}/tickets/from-email", self.base_url);

        let response = self
            .request(self.client.post(&url), tenant)
            .json(&CreateTicketBody {
                tenant_subdomain: &tenant.subdomain,
                ticket,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InboundError::Ticketing(format!(
                "Ticket creation failed ({}): {}",
                status, body
            )));
        }

        let created: TicketRef = response.json().await?;
        debug!("Created ticket {} for tenant {}", created.id, tenant.subdomain);
        Ok(created)
    }

    async fn add_comment_from_email(
        &self,
        tenant: &TenantRef,
        ticket_id: i64,
        comment: &EmailComment,
    ) -> Result<CommentRef, InboundError> {
        let url = format!("{}/tickets/{}/comments/from-email", self.base_url, ticket_id);

        let response = self
            .request(self.client.post(&url), tenant)
            .json(&AddCommentBody {
                tenant_subdomain: &tenant.subdomain,
                comment,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InboundError::Ticketing(format!(
                "Comment creation failed ({}): {}",
                status, body
            )));
        }

        let created: CommentRef = response.json().await?;
        debug!("Added comment {} to ticket {}", created.id, ticket_id);
        Ok(created)
    }
}

/// Mock ticketing client for testing
#[derive(Default)]
pub struct MockTicketingClient {
    tickets_by_number: Mutex<HashMap<i64, i64>>,
    created_tickets: Arc<Mutex<Vec<EmailTicket>>>,
    added_comments: Arc<Mutex<Vec<(i64, EmailComment)>>>,
    next_ticket_id: AtomicI64,

    pub find_count: AtomicUsize,
    pub create_count: AtomicUsize,
    pub comment_count: AtomicUsize,

    pub should_fail: bool,
}

impl MockTicketingClient {
    pub fn new() -> Self {
        Self {
            next_ticket_id: AtomicI64::new(1000),
            ..Default::default()
        }
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Register a ticket number -> ticket id mapping for lookups
    pub fn with_ticket_number(self, number: i64, ticket_id: i64) -> Self {
        self.tickets_by_number.lock().unwrap().insert(number, ticket_id);
        self
    }

    pub fn created_tickets(&self) -> Vec<EmailTicket> {
        self.created_tickets.lock().unwrap().clone()
    }

    pub fn added_comments(&self) -> Vec<(i64, EmailComment)> {
        self.added_comments.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.find_count.load(Ordering::SeqCst)
            + self.create_count.load(Ordering::SeqCst)
            + self.comment_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TicketingClient for MockTicketingClient {
    async fn find_ticket_by_number(
        &self,
        _tenant: &TenantRef,
        number: i64,
    ) -> Result<Option<TicketRef>, InboundError> {
        self.find_count.fetch_add(1, Ordering::SeqCst);

        if self.should_fail {
            return Err(InboundError::Ticketing("Mock lookup failure".to_string()));
        }

        let id = self.tickets_by_number.lock().unwrap().get(&number).copied();
        Ok(id.map(|id| TicketRef { id }))
    }

    async fn create_ticket_from_email(
        &self,
        _tenant: &TenantRef,
        ticket: &EmailTicket,
    ) -> Result<TicketRef, InboundError> {
        self.create_count.fetch_add(1, Ordering::SeqCst);

        if self.should_fail {
            return Err(InboundError::Ticketing("Mock create failure".to_string()));
        }

        self.created_tickets.lock().unwrap().push(ticket.clone());
        let id = self.next_ticket_id.fetch_add(1, Ordering::SeqCst);
        Ok(TicketRef { id })
    }

    async fn add_comment_from_email(
        &self,
        _tenant: &TenantRef,
        ticket_id: i64,
        comment: &EmailComment,
    ) -> Result<CommentRef, InboundError> {
        self.comment_count.fetch_add(1, Ordering::SeqCst);

        if self.should_fail {
            return Err(InboundError::Ticketing("Mock comment failure".to_string()));
        }

        self.added_comments
            .lock()
            .unwrap()
            .push((ticket_id, comment.clone()));
        Ok(CommentRef {
            id: self.comment_count.load(Ordering::SeqCst) as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantRef {
        TenantRef {
            id: 1,
            subdomain: "acme".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_ticket_lookup() {
        let client = MockTicketingClient::new().with_ticket_number(123456, 42);

        let found = client.find_ticket_by_number(&tenant(), 123456).await.unwrap();
        assert_eq!(found, Some(TicketRef { id: 42 }));

        let missing = client.find_ticket_by_number(&tenant(), 999999).await.unwrap();
        assert_eq!(missing, None);
        assert_eq!(client.find_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_mock_create_records_ticket() {
        let client = MockTicketingClient::new();
        let ticket = EmailTicket {
            sender_email: "jo@example.com".to_string(),
            sender_name: None,
            additional_recipients: vec![],
            subject: "Help".to_string(),
            text_body: "body".to_string(),
            html_body: None,
            message_id: Some("m1@x".to_string()),
            in_reply_to: None,
            references: None,
            attachments: vec![],
        };

        let created = client.create_ticket_from_email(&tenant(), &ticket).await.unwrap();
        assert!(created.id >= 1000);
        assert_eq!(client.created_tickets().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure_mode() {
        let client = MockTicketingClient::new().with_failure();
        let result = client.find_ticket_by_number(&tenant(), 1).await;
        assert!(result.is_err());
    }
}
