//! Outbound email delivery for Mailgate
//!
//! This crate owns the delivery queue and everything it leans on:
//! - the `EmailProvider` abstraction over the transactional-email API
//! - synchronous admission (render + persist) with asynchronous delivery
//! - a single-worker scheduling loop with bounded retry/backoff
//! - per-tenant sending-domain provisioning and verification
//!
//! Features:
//! - Template rendering repeated per attempt (templates may change in flight)
//! - Crash recovery by reloading pending log rows at startup
//! - DNS record management through the `DnsProvider` abstraction

pub mod dns;
pub mod domains;
pub mod errors;
pub mod handlers;
pub mod providers;
pub mod queue;
pub mod templates;
pub mod worker;

// Re-export main types
pub use dns::{DnsProvider, DnsRecordSpec, HttpDnsProvider, MockDnsProvider};
pub use domains::{DomainService, DomainWithDnsRecords};
pub use errors::DeliveryError;
pub use providers::{EmailProvider, EmailProviderKind, HttpEmailProvider, MockEmailProvider};
pub use queue::{DeliveryQueue, EmailStats, EnqueueRequest, QueuedEmail};
pub use templates::{RenderedEmail, TemplateService};
pub use worker::QueueWorker;
