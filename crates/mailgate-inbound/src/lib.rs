//! Inbound email processing for Mailgate
//!
//! This crate turns provider-delivered inbound email into ticketing actions:
//! - heuristic header parsing and address/tenant resolution
//! - reply-to-ticket correlation (headers first, token patterns second)
//! - routing to "add comment" or "create ticket" on the ticketing system
//! - append-only Message-ID bookkeeping for future thread resolution

pub mod address;
pub mod email;
pub mod errors;
pub mod headers;
pub mod matcher;
pub mod message_ids;
pub mod quotes;
pub mod router;
pub mod ticketing;

// Re-export main types
pub use address::{parse_address, strip_display_name, ParsedAddress, TenantRef, TenantResolver};
pub use email::{AttachmentDescriptor, InboundEmail};
pub use errors::InboundError;
pub use matcher::{MatchMethod, TicketMatch, TicketMatcher};
pub use message_ids::MessageIdStore;
pub use quotes::strip_quoted_text;
pub use router::{InboundRouter, RouteOutcome};
pub use ticketing::{HttpTicketingClient, MockTicketingClient, TicketingClient};
