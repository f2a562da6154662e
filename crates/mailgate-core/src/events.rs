//! Email lifecycle events and the sink abstraction connecting producers
//! (the delivery queue, the provider event correlator) to consumers
//! (the outbound webhook dispatcher) without coupling their crates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Notable email lifecycle events that fan out to webhook subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailEventKind {
    Delivered,
    Bounced,
    Complained,
    Failed,
}

impl EmailEventKind {
    /// Returns all available event kinds
    pub fn all() -> Vec<Self> {
        vec![
            Self::Delivered,
            Self::Bounced,
            Self::Complained,
            Self::Failed,
        ]
    }

    /// Returns the string representation of the event kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "email.delivered",
            Self::Bounced => "email.bounced",
            Self::Complained => "email.complained",
            Self::Failed => "email.failed",
        }
    }

    /// Parse an event kind from a provider or subscriber string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email.delivered" | "email_delivered" | "delivered" => Some(Self::Delivered),
            "email.bounced" | "email_bounced" | "bounced" | "bounce" => Some(Self::Bounced),
            "email.complained" | "email_complained" | "complained" | "complaint" => {
                Some(Self::Complained)
            }
            "email.failed" | "email_failed" | "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for EmailEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A notable event on one logical email, as delivered to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailEvent {
    pub event: EmailEventKind,
    pub email_id: Uuid,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
}

impl fmt::Display for EmailEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.event, self.email_id)
    }
}

#[derive(Error, Debug)]
pub enum EventSinkError {
    #[error("Failed to publish event: {0}")]
    Publish(String),
}

/// Consumer side of email lifecycle events. The webhook dispatcher implements
/// this; producers hold it as `Arc<dyn EmailEventSink>`.
#[async_trait]
pub trait EmailEventSink: Send + Sync {
    async fn publish(&self, event: EmailEvent) -> Result<(), EventSinkError>;
}
