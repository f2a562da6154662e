//! HTTP boundary for inbound provider callbacks and endpoint management
//!
//! The inbound endpoints acknowledge `200` no matter what happened
//! internally: once the payload is accepted for processing, a non-2xx answer
//! would only trigger provider-side retry storms. The single exception is a
//! cryptographic signature mismatch, which is rejected with `401` before any
//! processing.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mailgate_core::EmailEventKind;
use mailgate_inbound::{headers as header_parsing, AttachmentDescriptor, InboundEmail, InboundRouter};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::{OpenApi, ToSchema};

use crate::correlator::{EmailEventCorrelator, ProviderEvent};
use crate::signature::{verify_signature, SignatureCheck};
use crate::subscriptions::{CreateEndpointRequest, SubscriptionService};

pub struct AppState {
    pub router: Arc<InboundRouter>,
    pub correlator: Arc<EmailEventCorrelator>,
    pub subscriptions: Arc<SubscriptionService>,
    pub signing_secret: Option<String>,
}

/// Configure webhook routes
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/inbound/email", post(receive_inbound_email))
        .route("/inbound/events", post(receive_provider_event))
        .route(
            "/webhook-endpoints",
            post(create_endpoint).get(list_endpoints),
        )
}

const SIGNATURE_HEADER: &str = "x-provider-signature";

fn signature_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok())
}

/// Inbound email payload. Headers arrive either as one raw block or as a
/// structured `[{name, value}]` array depending on the provider.
#[derive(Debug, Deserialize)]
struct InboundEmailPayload {
    #[serde(default)]
    headers: Value,
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    cc: Option<String>,
    #[serde(default)]
    subject: String,
    #[serde(default, alias = "text")]
    text_body: String,
    #[serde(alias = "html")]
    html_body: Option<String>,
    #[serde(default)]
    attachments: Vec<AttachmentDescriptor>,
}

impl InboundEmailPayload {
    fn into_email(self) -> InboundEmail {
        let headers = match &self.headers {
            Value::String(raw) => header_parsing::parse_header_block(raw),
            Value::Array(_) => header_parsing::extract_structured_headers(&self.headers),
            _ => Default::default(),
        };

        InboundEmail {
            from: self.from,
            to: self.to,
            cc: self.cc,
            subject: self.subject,
            text_body: self.text_body,
            html_body: self.html_body,
            headers,
            attachments: self.attachments,
        }
    }
}

/// Receive an inbound email from the provider
#[utoipa::path(
    tag = "Inbound",
    post,
    path = "/inbound/email",
    request_body(content = String, description = "Raw inbound email payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Accepted; routing outcome in the body"),
        (status = 401, description = "Signature mismatch")
    )
)]
pub async fn receive_inbound_email(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Signature check runs over the raw body bytes, before any parsing
    match verify_signature(
        state.signing_secret.as_deref(),
        &body,
        signature_header(&headers),
    ) {
        SignatureCheck::Invalid => {
            warn!("Rejecting inbound email with invalid signature");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "invalid signature"})),
            )
                .into_response();
        }
        SignatureCheck::Valid | SignatureCheck::Skipped => {}
    }

    let payload: InboundEmailPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            // Still acknowledged: the payload will not get better on retry
            warn!("Malformed inbound email payload: {}", e);
            return Json(json!({
                "success": false,
                "error": format!("malformed payload: {}", e),
            }))
            .into_response();
        }
    };

    let outcome = state.router.route(&payload.into_email()).await;
    Json(outcome).into_response()
}

#[derive(Debug, Deserialize)]
struct ProviderEventEnvelope {
    #[serde(rename = "type")]
    kind: String,
    data: ProviderEventData,
}

#[derive(Debug, Deserialize)]
struct ProviderEventData {
    #[serde(alias = "provider_message_id")]
    message_id: String,
    recipient: Option<String>,
    reason: Option<String>,
}

/// Receive a delivery-status event from the provider
#[utoipa::path(
    tag = "Inbound",
    post,
    path = "/inbound/events",
    request_body(content = String, description = "Raw provider event payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Accepted; processing outcome in the body"),
        (status = 401, description = "Signature mismatch")
    )
)]
pub async fn receive_provider_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match verify_signature(
        state.signing_secret.as_deref(),
        &body,
        signature_header(&headers),
    ) {
        SignatureCheck::Invalid => {
            warn!("Rejecting provider event with invalid signature");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "invalid signature"})),
            )
                .into_response();
        }
        SignatureCheck::Valid | SignatureCheck::Skipped => {}
    }

    let envelope: ProviderEventEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Malformed provider event payload: {}", e);
            return Json(json!({
                "success": false,
                "error": format!("malformed payload: {}", e),
            }))
            .into_response();
        }
    };

    let event = ProviderEvent {
        kind: envelope.kind,
        provider_message_id: envelope.data.message_id,
        recipient: envelope.data.recipient,
        reason: envelope.data.reason,
    };

    // Internal failures are acknowledged too; the reason is surfaced in the
    // body for observability only
    match state.correlator.handle_provider_event(&event).await {
        Ok(()) => Json(json!({"success": true})).into_response(),
        Err(e) => {
            error!("Provider event processing failed: {}", e);
            Json(json!({"success": false, "error": e.to_string()})).into_response()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EndpointRequestBody {
    pub tenant_id: Option<i32>,
    pub url: String,
    pub secret: Option<String>,
    pub events: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EndpointResponse {
    pub id: i32,
    pub tenant_id: Option<i32>,
    pub url: String,
    pub events: Vec<String>,
    pub enabled: bool,
}

impl From<mailgate_entities::webhook_endpoints::Model> for EndpointResponse {
    fn from(row: mailgate_entities::webhook_endpoints::Model) -> Self {
        let events = row
            .events
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            url: row.url,
            events,
            enabled: row.enabled,
        }
    }
}

/// Register a subscriber endpoint
#[utoipa::path(
    tag = "Webhooks",
    post,
    path = "/webhook-endpoints",
    request_body = EndpointRequestBody,
    responses(
        (status = 201, description = "Endpoint created", body = EndpointResponse),
        (status = 400, description = "Unknown event name")
    )
)]
pub async fn create_endpoint(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EndpointRequestBody>,
) -> Response {
    let mut events = Vec::new();
    for name in &request.events {
        match EmailEventKind::parse(name) {
            Some(kind) => events.push(kind),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": format!("unknown event: {}", name)})),
                )
                    .into_response();
            }
        }
    }

    match state
        .subscriptions
        .create(CreateEndpointRequest {
            tenant_id: request.tenant_id,
            url: request.url,
            secret: request.secret,
            events,
        })
        .await
    {
        Ok(created) => (
            StatusCode::CREATED,
            Json(EndpointResponse::from(created)),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to create webhook endpoint: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

/// List subscriber endpoints
#[utoipa::path(
    tag = "Webhooks",
    get,
    path = "/webhook-endpoints",
    responses(
        (status = 200, description = "Endpoints", body = [EndpointResponse])
    )
)]
pub async fn list_endpoints(State(state): State<Arc<AppState>>) -> Response {
    match state.subscriptions.list().await {
        Ok(endpoints) => Json(
            endpoints
                .into_iter()
                .map(EndpointResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => {
            error!("Failed to list webhook endpoints: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        receive_inbound_email,
        receive_provider_event,
        create_endpoint,
        list_endpoints
    ),
    components(schemas(EndpointRequestBody, EndpointResponse))
)]
pub struct WebhooksApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::WebhookDispatcher;
    use crate::signature::sign;
    use axum::body::Body;
    use axum::http::Request;
    use mailgate_core::WebhookSettings;
    use mailgate_database::test_utils::TestDatabase;
    use mailgate_inbound::{
        MessageIdStore, MockTicketingClient, TenantResolver, TicketMatcher,
    };
    use sea_orm::{ActiveModelTrait, ActiveValue::Set};
    use tower::ServiceExt;

    async fn setup(signing_secret: Option<&str>) -> (TestDatabase, Router, Arc<MockTicketingClient>) {
        let db = TestDatabase::new().await.unwrap();

        let tenant = mailgate_entities::tenants::ActiveModel {
            name: Set("Acme".to_string()),
            subdomain: Set("acme".to_string()),
            ..Default::default()
        };
        tenant.insert(db.connection()).await.unwrap();

        let ticketing = Arc::new(MockTicketingClient::new());
        let store = Arc::new(MessageIdStore::new(db.connection_arc()));
        let resolver = Arc::new(TenantResolver::new(
            db.connection_arc(),
            "base.com",
            "support",
        ));
        let matcher = Arc::new(TicketMatcher::new(store.clone(), ticketing.clone()));
        let router = Arc::new(InboundRouter::new(
            resolver,
            matcher,
            store,
            ticketing.clone(),
        ));

        let dispatcher = Arc::new(WebhookDispatcher::new(
            db.connection_arc(),
            WebhookSettings::default(),
        ));
        let correlator = Arc::new(EmailEventCorrelator::new(db.connection_arc(), dispatcher));
        let subscriptions = Arc::new(SubscriptionService::new(db.connection_arc()));

        let state = Arc::new(AppState {
            router,
            correlator,
            subscriptions,
            signing_secret: signing_secret.map(|s| s.to_string()),
        });

        (db, routes().with_state(state), ticketing)
    }

    fn inbound_body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "headers": "Message-ID: <m1@x>\nSubject: Help",
            "from": "Jo <jo@example.com>",
            "to": "support@acme.base.com",
            "subject": "Help",
            "text": "Something broke"
        }))
        .unwrap()
    }

    fn post(uri: &str, body: Vec<u8>, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("x-provider-signature", signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn response_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_inbound_email_without_secret_is_permissive() {
        let (_db, app, ticketing) = setup(None).await;

        let response = app
            .oneshot(post("/inbound/email", inbound_body(), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["is_new"], true);
        assert_eq!(ticketing.created_tickets().len(), 1);
    }

    #[tokio::test]
    async fn test_inbound_email_with_valid_signature() {
        let (_db, app, _) = setup(Some("secret")).await;
        let body = inbound_body();
        let signature = sign("secret", &body);

        let response = app
            .oneshot(post("/inbound/email", body, Some(signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_inbound_email_bad_signature_is_rejected() {
        let (_db, app, ticketing) = setup(Some("secret")).await;
        let body = inbound_body();
        let signature = sign("wrong-secret", &body);

        let response = app
            .oneshot(post("/inbound/email", body, Some(signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ticketing.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_payload_still_acknowledged() {
        let (_db, app, _) = setup(None).await;

        let response = app
            .oneshot(post("/inbound/email", b"not json".to_vec(), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_unknown_tenant_acknowledged_with_error() {
        let (_db, app, _) = setup(None).await;
        let body = serde_json::to_vec(&json!({
            "from": "jo@example.com",
            "to": "someone@elsewhere.com",
            "subject": "Hi",
            "text": "body"
        }))
        .unwrap();

        let response = app.oneshot(post("/inbound/email", body, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "tenant not found");
    }

    #[tokio::test]
    async fn test_provider_event_acknowledged() {
        let (_db, app, _) = setup(None).await;
        let body = serde_json::to_vec(&json!({
            "type": "email.delivered",
            "data": {"message_id": "unknown-message"}
        }))
        .unwrap();

        let response = app
            .oneshot(post("/inbound/events", body, None))
            .await
            .unwrap();

        // Unknown message ids are dropped but still acknowledged
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_endpoint_crud() {
        let (_db, app, _) = setup(None).await;

        let create_body = serde_json::to_vec(&json!({
            "url": "https://hooks.example.com/email",
            "events": ["email.failed", "email.bounced"]
        }))
        .unwrap();

        let response = app
            .clone()
            .oneshot(post("/webhook-endpoints", create_body, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/webhook-endpoints")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_endpoint_unknown_event_rejected() {
        let (_db, app, _) = setup(None).await;

        let create_body = serde_json::to_vec(&json!({
            "url": "https://hooks.example.com/email",
            "events": ["email.opened"]
        }))
        .unwrap();

        let response = app
            .oneshot(post("/webhook-endpoints", create_body, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
