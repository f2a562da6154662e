//! DNS provider abstraction for domain record management
//!
//! The DNS provider is an external collaborator; the gateway only needs
//! record create/delete/list to install and tear down the verification
//! records an email provider hands back.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

use crate::errors::DeliveryError;

/// A DNS record to create on the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecordSpec {
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
}

/// DNS provider operations needed for email domain provisioning
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Create a record, returning the provider-assigned record id
    async fn create_record(&self, record: &DnsRecordSpec) -> Result<String, DeliveryError>;

    /// Delete a record by provider-assigned id
    async fn delete_record(&self, record_id: &str) -> Result<(), DeliveryError>;

    /// List records whose name contains the filter
    async fn list_records(
        &self,
        name_filter: &str,
    ) -> Result<Vec<(String, DnsRecordSpec)>, DeliveryError>;
}

/// Mock DNS provider for testing
#[derive(Default)]
pub struct MockDnsProvider {
    records: Mutex<HashMap<String, DnsRecordSpec>>,
    next_id: AtomicUsize,
    pub create_count: AtomicUsize,
    pub delete_count: AtomicUsize,
    pub should_fail: bool,
}

impl MockDnsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    pub fn records(&self) -> Vec<DnsRecordSpec> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    async fn create_record(&self, record: &DnsRecordSpec) -> Result<String, DeliveryError> {
        self.create_count.fetch_add(1, Ordering::SeqCst);

        if self.should_fail {
            return Err(DeliveryError::Dns("Mock record creation failure".to_string()));
        }

        let id = format!("mock-record-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.records.lock().unwrap().insert(id.clone(), record.clone());
        Ok(id)
    }

    async fn delete_record(&self, record_id: &str) -> Result<(), DeliveryError> {
        self.delete_count.fetch_add(1, Ordering::SeqCst);

        if self.should_fail {
            return Err(DeliveryError::Dns("Mock record deletion failure".to_string()));
        }

        self.records.lock().unwrap().remove(record_id);
        Ok(())
    }

    async fn list_records(
        &self,
        name_filter: &str,
    ) -> Result<Vec<(String, DnsRecordSpec)>, DeliveryError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|(_, r)| r.name.contains(name_filter))
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect())
    }
}

/// HTTP DNS provider implementation
pub struct HttpDnsProvider {
    client: Client,
    base_url: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecordResponse {
    id: String,
    #[serde(flatten)]
    record: DnsRecordSpec,
}

impl HttpDnsProvider {
    pub fn new(base_url: &str, api_token: &str) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("Mailgate/1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        }
    }
}

#[async_trait]
impl DnsProvider for HttpDnsProvider {
    async fn create_record(&self, record: &DnsRecordSpec) -> Result<String, DeliveryError> {
        debug!("Creating DNS record {} {}", record.record_type, record.name);

        let response = self
            .client
            .post(format!("{}/records", self.base_url))
            .bearer_auth(&self.api_token)
            .json(record)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Dns(format!(
                "Record creation failed ({}): {}",
                status, body
            )));
        }

        let created: DnsRecordResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::Dns(format!("Failed to parse record response: {}", e)))?;

        Ok(created.id)
    }

    async fn delete_record(&self, record_id: &str) -> Result<(), DeliveryError> {
        debug!("Deleting DNS record {}", record_id);

        let response = self
            .client
            .delete(format!("{}/records/{}", self.base_url, record_id))
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(DeliveryError::Dns(format!(
                "Record deletion failed ({})",
                status
            )));
        }

        Ok(())
    }

    async fn list_records(
        &self,
        name_filter: &str,
    ) -> Result<Vec<(String, DnsRecordSpec)>, DeliveryError> {
        let response = self
            .client
            .get(format!("{}/records", self.base_url))
            .bearer_auth(&self.api_token)
            .query(&[("name", name_filter)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(DeliveryError::Dns(format!(
                "Record listing failed ({})",
                status
            )));
        }

        let records: Vec<DnsRecordResponse> = response
            .json()
            .await
            .map_err(|e| DeliveryError::Dns(format!("Failed to parse record list: {}", e)))?;

        Ok(records.into_iter().map(|r| (r.id, r.record)).collect())
    }
}
