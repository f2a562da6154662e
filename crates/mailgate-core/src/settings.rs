use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gateway runtime settings
/// All fields have sensible defaults for easy onboarding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Base domain under which tenant subdomains live (e.g. `mail.example.com`
    /// makes `acme.mail.example.com` tenant `acme`'s receiving domain)
    pub base_domain: String,

    /// Fallback sender when neither the request nor a verified tenant domain
    /// provides one
    pub default_from_address: String,

    /// Local part used when deriving a sender from a verified tenant domain
    /// (`<default_from_local>@<domain>`)
    pub default_from_local: String,

    pub inbound: InboundSettings,
    pub queue: QueueSettings,
    pub webhooks: WebhookSettings,
    pub ticketing: TicketingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundSettings {
    /// Shared secret for verifying provider webhook signatures.
    /// When unset, verification is skipped (permissive mode, logged loudly).
    pub signing_secret: Option<String>,

    /// Local part of each tenant's canonical support address
    /// (`support@<subdomain>.<base_domain>`)
    pub support_local: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Worker tick interval in milliseconds
    pub tick_interval_ms: u64,

    /// Maximum send attempts before an email is marked failed
    pub max_retries: u32,

    /// Retry backoff delays in milliseconds, indexed by attempt number.
    /// Attempts beyond the table reuse the last entry.
    pub retry_delays_ms: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    /// Maximum delivery attempts per subscriber endpoint
    pub max_retries: u32,

    /// Base for the exponential retry delay (base * 2^(attempt-1))
    pub retry_base_ms: u64,

    /// Hard timeout applied to each outbound webhook request
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketingSettings {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_domain: "mailgate.local".to_string(),
            default_from_address: "no-reply@mailgate.local".to_string(),
            default_from_local: "no-reply".to_string(),
            inbound: InboundSettings::default(),
            queue: QueueSettings::default(),
            webhooks: WebhookSettings::default(),
            ticketing: TicketingSettings::default(),
        }
    }
}

impl Default for InboundSettings {
    fn default() -> Self {
        Self {
            signing_secret: None,
            support_local: "support".to_string(),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            max_retries: 3,
            retry_delays_ms: vec![1_000, 5_000, 30_000],
        }
    }
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_ms: 2_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for TicketingSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000".to_string(),
            api_key: None,
        }
    }
}

impl QueueSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Backoff delay for a retry after the given attempt number (1-based).
    /// Attempts past the end of the table are capped at the last entry.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let delays = if self.retry_delays_ms.is_empty() {
            &[1_000u64][..]
        } else {
            &self.retry_delays_ms[..]
        };
        let index = (attempt.max(1) as usize - 1).min(delays.len() - 1);
        Duration::from_millis(delays[index])
    }
}

impl WebhookSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Exponential retry delay: base * 2^(attempt-1)
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << (attempt.max(1) - 1).min(16);
        Duration::from_millis(self.retry_base_ms.saturating_mul(factor))
    }
}

impl GatewaySettings {
    /// Create settings from JSON value, using defaults for missing fields
    pub fn from_json(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// Convert settings to JSON value
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }

    /// Load settings from the process environment, starting from defaults.
    /// Only the deployment-sensitive knobs have environment overrides.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(domain) = std::env::var("MAILGATE_BASE_DOMAIN") {
            settings.base_domain = domain;
        }
        if let Ok(from) = std::env::var("MAILGATE_DEFAULT_FROM") {
            settings.default_from_address = from;
        }
        if let Ok(secret) = std::env::var("MAILGATE_INBOUND_SIGNING_SECRET") {
            settings.inbound.signing_secret = Some(secret);
        }
        if let Ok(url) = std::env::var("MAILGATE_TICKETING_URL") {
            settings.ticketing.base_url = url;
        }
        if let Ok(key) = std::env::var("MAILGATE_TICKETING_API_KEY") {
            settings.ticketing.api_key = Some(key);
        }

        settings
    }
}
