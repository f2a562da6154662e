//! Inbound email routing
//!
//! Orchestrates tenant resolution, ticket matching and the external
//! ticketing call. Failures never escape this boundary: the webhook endpoint
//! must always be able to acknowledge receipt to the provider, so every
//! outcome folds into `RouteOutcome`.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::address::{self, TenantResolver};
use crate::email::InboundEmail;
use crate::matcher::TicketMatcher;
use crate::message_ids::MessageIdStore;
use crate::quotes::strip_quoted_text;
use crate::ticketing::{EmailComment, EmailTicket, TicketingClient};

/// Outcome of routing one inbound email
#[derive(Debug, Clone, Serialize)]
pub struct RouteOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_new: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RouteOutcome {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            ticket_id: None,
            is_new: None,
            error: Some(error.into()),
        }
    }

    fn matched(ticket_id: i64, is_new: bool) -> Self {
        Self {
            success: true,
            ticket_id: Some(ticket_id),
            is_new: Some(is_new),
            error: None,
        }
    }
}

pub struct InboundRouter {
    resolver: Arc<TenantResolver>,
    matcher: Arc<TicketMatcher>,
    store: Arc<MessageIdStore>,
    ticketing: Arc<dyn TicketingClient>,
}

impl InboundRouter {
    pub fn new(
        resolver: Arc<TenantResolver>,
        matcher: Arc<TicketMatcher>,
        store: Arc<MessageIdStore>,
        ticketing: Arc<dyn TicketingClient>,
    ) -> Self {
        Self {
            resolver,
            matcher,
            store,
            ticketing,
        }
    }

    /// Route one inbound email to "add comment" or "create ticket"
    pub async fn route(&self, email: &InboundEmail) -> RouteOutcome {
        let Some(primary_to) = email.primary_to() else {
            return RouteOutcome::failure("no recipient address");
        };

        let tenant = match self.resolver.resolve_recipient(&primary_to).await {
            Ok(Some(tenant)) => tenant,
            Ok(None) => {
                info!("No tenant for inbound recipient {}", primary_to);
                return RouteOutcome::failure("tenant not found");
            }
            Err(e) => {
                error!("Tenant resolution failed: {}", e);
                return RouteOutcome::failure(e.to_string());
            }
        };

        let matched = match self.matcher.match_ticket(email, &tenant).await {
            Ok(matched) => matched,
            Err(e) => {
                error!("Ticket matching failed: {}", e);
                return RouteOutcome::failure(e.to_string());
            }
        };

        let sender_email = address::strip_display_name(&email.from);
        let sender_name = address::display_name(&email.from);
        let support_address = self.resolver.support_address(&tenant);
        let additional_recipients = address::additional_recipients(
            &email.to_list(),
            &email.cc_list(),
            &support_address,
        );
        let text_body = strip_quoted_text(&email.text_body);
        let html_body = email.html_body.as_deref().map(strip_quoted_text);
        let message_id = email.message_id().map(|s| s.to_string());

        match matched {
            Some(matched) => {
                let comment = EmailComment {
                    sender_email,
                    sender_name,
                    additional_recipients,
                    subject: email.subject.clone(),
                    text_body,
                    html_body,
                    message_id: message_id.clone(),
                    attachments: email.attachments.clone(),
                };

                let created = match self
                    .ticketing
                    .add_comment_from_email(&tenant, matched.ticket_id, &comment)
                    .await
                {
                    Ok(created) => created,
                    Err(e) => {
                        error!(
                            "Failed to add comment to ticket {}: {}",
                            matched.ticket_id, e
                        );
                        return RouteOutcome::failure(e.to_string());
                    }
                };

                debug!(
                    "Added comment {} to ticket {} via {}",
                    created.id, matched.ticket_id, matched.method
                );

                self.persist_message_id(
                    tenant.id,
                    matched.ticket_id,
                    message_id.as_deref(),
                    Some(created.id),
                )
                .await;

                RouteOutcome::matched(matched.ticket_id, false)
            }
            None => {
                let ticket = EmailTicket {
                    sender_email,
                    sender_name,
                    additional_recipients,
                    subject: email.subject.clone(),
                    text_body,
                    html_body,
                    message_id: message_id.clone(),
                    in_reply_to: email.in_reply_to().map(|s| s.to_string()),
                    references: email.references().map(|s| s.to_string()),
                    attachments: email.attachments.clone(),
                };

                let created = match self
                    .ticketing
                    .create_ticket_from_email(&tenant, &ticket)
                    .await
                {
                    Ok(created) => created,
                    Err(e) => {
                        error!("Failed to create ticket: {}", e);
                        return RouteOutcome::failure(e.to_string());
                    }
                };

                info!(
                    "Created ticket {} for tenant {} from inbound email",
                    created.id, tenant.subdomain
                );

                self.persist_message_id(tenant.id, created.id, message_id.as_deref(), None)
                    .await;

                RouteOutcome::matched(created.id, true)
            }
        }
    }

    /// Persist the Message-ID association after the external call succeeded.
    /// A failure here loses the correlation key for the next reply (it will
    /// open a new ticket) but must not fail the routing that already
    /// happened, so it is logged and swallowed.
    async fn persist_message_id(
        &self,
        tenant_id: i32,
        ticket_id: i64,
        message_id: Option<&str>,
        comment_id: Option<i64>,
    ) {
        let Some(message_id) = message_id else {
            return;
        };
        if message_id.trim().is_empty() {
            return;
        }

        if let Err(e) = self
            .store
            .record(tenant_id, ticket_id, message_id, comment_id)
            .await
        {
            warn!(
                "Failed to persist message id for ticket {}: {}",
                ticket_id, e
            );
        }
    }
}
