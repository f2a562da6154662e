//! Ticket correlation for inbound email
//!
//! Header-based correlation is authoritative: mail clients preserve
//! `In-Reply-To`/`References` across edits and forwards, so those are tried
//! before the ticket-number token patterns, which exist for clients that
//! strip headers. The first method to succeed wins; later methods are never
//! consulted.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::address::TenantRef;
use crate::email::InboundEmail;
use crate::errors::InboundError;
use crate::message_ids::MessageIdStore;
use crate::ticketing::TicketingClient;

/// Ticket-number token of the form `[PREFIX-123456]`, case-insensitive
static TICKET_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[[A-Z]+-(\d{6})\]").expect("valid ticket token regex"));

/// How a match was established, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    InReplyTo,
    References,
    SubjectPattern,
    BodyPattern,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InReplyTo => "in_reply_to",
            Self::References => "references",
            Self::SubjectPattern => "subject_pattern",
            Self::BodyPattern => "body_pattern",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A successful correlation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketMatch {
    pub ticket_id: i64,
    pub tenant_id: i32,
    pub method: MatchMethod,
}

pub struct TicketMatcher {
    store: Arc<MessageIdStore>,
    ticketing: Arc<dyn TicketingClient>,
}

impl TicketMatcher {
    pub fn new(store: Arc<MessageIdStore>, ticketing: Arc<dyn TicketingClient>) -> Self {
        Self { store, ticketing }
    }

    /// Correlate an inbound email with an existing ticket. `None` means
    /// "no match: create a new ticket" and is an expected outcome.
    pub async fn match_ticket(
        &self,
        email: &InboundEmail,
        tenant: &TenantRef,
    ) -> Result<Option<TicketMatch>, InboundError> {
        // 1. In-Reply-To header
        if let Some(in_reply_to) = email.in_reply_to() {
            if let Some(row) = self.store.find(tenant.id, in_reply_to).await? {
                debug!("Matched ticket {} via In-Reply-To", row.ticket_id);
                return Ok(Some(TicketMatch {
                    ticket_id: row.ticket_id,
                    tenant_id: tenant.id,
                    method: MatchMethod::InReplyTo,
                }));
            }
        }

        // 2. References header, candidates tried left to right
        if let Some(references) = email.references() {
            for candidate in references.split_whitespace() {
                if let Some(row) = self.store.find(tenant.id, candidate).await? {
                    debug!("Matched ticket {} via References", row.ticket_id);
                    return Ok(Some(TicketMatch {
                        ticket_id: row.ticket_id,
                        tenant_id: tenant.id,
                        method: MatchMethod::References,
                    }));
                }
            }
        }

        // 3. Ticket-number token in the subject
        if let Some(ticket_id) = self.resolve_token(&email.subject, tenant).await? {
            debug!("Matched ticket {} via subject token", ticket_id);
            return Ok(Some(TicketMatch {
                ticket_id,
                tenant_id: tenant.id,
                method: MatchMethod::SubjectPattern,
            }));
        }

        // 4. Ticket-number token in the plaintext body
        if let Some(ticket_id) = self.resolve_token(&email.text_body, tenant).await? {
            debug!("Matched ticket {} via body token", ticket_id);
            return Ok(Some(TicketMatch {
                ticket_id,
                tenant_id: tenant.id,
                method: MatchMethod::BodyPattern,
            }));
        }

        Ok(None)
    }

    /// Find a ticket-number token in `text` and resolve it through the
    /// ticketing system. An unresolvable number is "no match", not an error.
    async fn resolve_token(
        &self,
        text: &str,
        tenant: &TenantRef,
    ) -> Result<Option<i64>, InboundError> {
        let Some(captures) = TICKET_TOKEN.captures(text) else {
            return Ok(None);
        };

        let number: i64 = match captures[1].parse() {
            Ok(n) => n,
            Err(_) => return Ok(None),
        };

        let ticket = self.ticketing.find_ticket_by_number(tenant, number).await?;
        Ok(ticket.map(|t| t.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticketing::MockTicketingClient;
    use mailgate_database::test_utils::TestDatabase;
    use sea_orm::{ActiveModelTrait, ActiveValue::Set};
    use std::collections::HashMap;

    async fn setup() -> (TestDatabase, TenantRef, Arc<MessageIdStore>) {
        let db = TestDatabase::new().await.unwrap();
        let tenant = mailgate_entities::tenants::ActiveModel {
            name: Set("Acme".to_string()),
            subdomain: Set("acme".to_string()),
            ..Default::default()
        };
        let tenant = tenant.insert(db.connection()).await.unwrap();
        let store = Arc::new(MessageIdStore::new(db.connection_arc()));
        (
            db,
            TenantRef {
                id: tenant.id,
                subdomain: tenant.subdomain,
            },
            store,
        )
    }

    fn email_with_headers(pairs: &[(&str, &str)]) -> InboundEmail {
        let mut headers = HashMap::new();
        for (name, value) in pairs {
            headers.insert(name.to_string(), value.to_string());
        }
        InboundEmail {
            headers,
            ..Default::default()
        }
    }

    #[test]
    fn test_ticket_token_regex() {
        assert!(TICKET_TOKEN.is_match("Re: [SUP-123456] broken login"));
        assert!(TICKET_TOKEN.is_match("[sup-123456]"));
        assert!(!TICKET_TOKEN.is_match("[SUP-12345]")); // five digits
        assert!(!TICKET_TOKEN.is_match("SUP-123456")); // no brackets
    }

    #[tokio::test]
    async fn test_in_reply_to_match() {
        let (_db, tenant, store) = setup().await;
        store.record(tenant.id, 7, "<m1@host>", None).await.unwrap();

        let matcher = TicketMatcher::new(store, Arc::new(MockTicketingClient::new()));
        let email = email_with_headers(&[("in-reply-to", "<m1@host>")]);

        let matched = matcher.match_ticket(&email, &tenant).await.unwrap().unwrap();
        assert_eq!(matched.ticket_id, 7);
        assert_eq!(matched.method, MatchMethod::InReplyTo);
    }

    #[tokio::test]
    async fn test_references_first_hit_wins() {
        let (_db, tenant, store) = setup().await;
        store.record(tenant.id, 8, "m2@host", None).await.unwrap();
        store.record(tenant.id, 9, "m3@host", None).await.unwrap();

        let matcher = TicketMatcher::new(store, Arc::new(MockTicketingClient::new()));
        let email = email_with_headers(&[("references", "<m0@host> <m2@host> <m3@host>")]);

        let matched = matcher.match_ticket(&email, &tenant).await.unwrap().unwrap();
        assert_eq!(matched.ticket_id, 8);
        assert_eq!(matched.method, MatchMethod::References);
    }

    #[tokio::test]
    async fn test_in_reply_to_beats_subject_pattern() {
        let (_db, tenant, store) = setup().await;
        store.record(tenant.id, 7, "m1@host", None).await.unwrap();

        // The subject token points at a different ticket; header wins
        let ticketing = Arc::new(MockTicketingClient::new().with_ticket_number(123456, 99));
        let matcher = TicketMatcher::new(store, ticketing.clone());

        let mut email = email_with_headers(&[("in-reply-to", "<m1@host>")]);
        email.subject = "[SUP-123456] something".to_string();

        let matched = matcher.match_ticket(&email, &tenant).await.unwrap().unwrap();
        assert_eq!(matched.ticket_id, 7);
        assert_eq!(matched.method, MatchMethod::InReplyTo);
        // The ticketing system was never consulted
        assert_eq!(ticketing.call_count(), 0);
    }

    #[tokio::test]
    async fn test_subject_pattern_match() {
        let (_db, tenant, store) = setup().await;
        let ticketing = Arc::new(MockTicketingClient::new().with_ticket_number(123456, 55));
        let matcher = TicketMatcher::new(store, ticketing);

        let mut email = InboundEmail::default();
        email.subject = "Re: [SUP-123456] broken login".to_string();

        let matched = matcher.match_ticket(&email, &tenant).await.unwrap().unwrap();
        assert_eq!(matched.ticket_id, 55);
        assert_eq!(matched.method, MatchMethod::SubjectPattern);
    }

    #[tokio::test]
    async fn test_body_pattern_match() {
        let (_db, tenant, store) = setup().await;
        let ticketing = Arc::new(MockTicketingClient::new().with_ticket_number(654321, 66));
        let matcher = TicketMatcher::new(store, ticketing);

        let mut email = InboundEmail::default();
        email.text_body = "see ticket [SUP-654321] please".to_string();

        let matched = matcher.match_ticket(&email, &tenant).await.unwrap().unwrap();
        assert_eq!(matched.ticket_id, 66);
        assert_eq!(matched.method, MatchMethod::BodyPattern);
    }

    #[tokio::test]
    async fn test_unknown_number_is_no_match() {
        let (_db, tenant, store) = setup().await;
        let matcher = TicketMatcher::new(store, Arc::new(MockTicketingClient::new()));

        let mut email = InboundEmail::default();
        email.subject = "[SUP-123456]".to_string();

        let matched = matcher.match_ticket(&email, &tenant).await.unwrap();
        assert!(matched.is_none());
    }

    #[tokio::test]
    async fn test_no_signals_is_no_match() {
        let (_db, tenant, store) = setup().await;
        let matcher = TicketMatcher::new(store, Arc::new(MockTicketingClient::new()));

        let matched = matcher
            .match_ticket(&InboundEmail::default(), &tenant)
            .await
            .unwrap();
        assert!(matched.is_none());
    }
}
