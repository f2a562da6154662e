//! Normalized inbound email representation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attachment metadata passed through to the ticketing system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

/// An inbound email after provider payload normalization.
///
/// `headers` is the lowercased map produced by the header parser; the raw
/// recipient fields keep their comma-separated provider shape.
#[derive(Debug, Clone, Default)]
pub struct InboundEmail {
    pub from: String,
    pub to: String,
    pub cc: Option<String>,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
    pub headers: HashMap<String, String>,
    pub attachments: Vec<AttachmentDescriptor>,
}

impl InboundEmail {
    /// Header lookup by lowercased name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.as_str())
    }

    pub fn message_id(&self) -> Option<&str> {
        self.header("message-id")
    }

    pub fn in_reply_to(&self) -> Option<&str> {
        self.header("in-reply-to")
    }

    pub fn references(&self) -> Option<&str> {
        self.header("references")
    }

    /// First address of the comma-separated `To` list
    pub fn primary_to(&self) -> Option<String> {
        self.to
            .split(',')
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .map(|s| s.to_string())
    }

    pub fn to_list(&self) -> Vec<String> {
        split_address_list(&self.to)
    }

    pub fn cc_list(&self) -> Vec<String> {
        self.cc.as_deref().map(split_address_list).unwrap_or_default()
    }
}

fn split_address_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
