//! Email provider implementations

pub mod http;
pub mod mock;
pub mod traits;

pub use http::{HttpEmailProvider, HttpProviderCredentials};
pub use mock::MockEmailProvider;
pub use traits::{
    Attachment, DnsRecord, DomainIdentity, EmailProvider, EmailProviderKind, SendEmailRequest,
    SendEmailResponse, VerificationStatus,
};
