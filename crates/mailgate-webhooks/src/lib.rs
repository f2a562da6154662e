//! Webhook plumbing for Mailgate
//!
//! Two directions share this crate:
//! - inbound: provider delivery-status events are verified, correlated back
//!   to their email log row, and acknowledged unconditionally
//! - outbound: notable email events fan out to subscriber endpoints with
//!   HMAC-signed payloads and bounded per-endpoint retries

pub mod correlator;
pub mod dispatcher;
pub mod handlers;
pub mod signature;
pub mod subscriptions;

// Re-export main types
pub use correlator::{EmailEventCorrelator, ProviderEvent};
pub use dispatcher::{WebhookDeliveryResult, WebhookDispatcher, WebhookError};
pub use signature::{verify_signature, SignatureCheck};
pub use subscriptions::{CreateEndpointRequest, SubscriptionService};
