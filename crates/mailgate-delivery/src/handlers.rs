//! HTTP handlers for the delivery surface: enqueue, status, stats, domains

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::domains::{DomainService, DomainWithDnsRecords};
use crate::errors::DeliveryError;
use crate::providers::DnsRecord;
use crate::queue::{DeliveryQueue, EnqueueRequest};
use mailgate_entities::tenant_email_domains;

pub struct AppState {
    pub queue: Arc<DeliveryQueue>,
    pub domains: Arc<DomainService>,
}

/// Configure delivery routes
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/emails", post(send_email))
        .route("/emails/stats", get(get_email_stats))
        .route("/emails/{id}", get(get_email))
        .route("/domains", post(create_domain).get(list_domains))
        .route("/domains/{id}/verify", post(verify_domain))
}

/// Error body returned by all delivery endpoints
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<DeliveryError> for ApiError {
    fn from(e: DeliveryError) -> Self {
        let status = match &e {
            DeliveryError::TemplateNotFound(_)
            | DeliveryError::EmailNotFound(_)
            | DeliveryError::DomainNotFound(_) => StatusCode::NOT_FOUND,
            DeliveryError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => {
                error!("Delivery request failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendEmailRequestBody {
    pub to: String,
    pub template: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Map<String, Value>,
    pub tenant_id: Option<i32>,
    pub from: Option<String>,
    pub reply_to: Option<String>,
    pub subject: Option<String>,
    pub html: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SendEmailResponseBody {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EmailResponse {
    pub id: String,
    pub to: String,
    pub from: Option<String>,
    pub subject: String,
    pub template: Option<String>,
    pub status: String,
    pub attempts: i32,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub sent_at: Option<String>,
    pub created_at: String,
}

impl From<mailgate_entities::email_logs::Model> for EmailResponse {
    fn from(row: mailgate_entities::email_logs::Model) -> Self {
        Self {
            id: row.id.to_string(),
            to: row.to_address,
            from: row.from_address,
            subject: row.subject,
            template: row.template,
            status: row.status,
            attempts: row.attempts,
            provider_message_id: row.provider_message_id,
            error_message: row.error_message,
            sent_at: row.sent_at.map(|t| t.to_rfc3339()),
            created_at: row.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EmailStatsResponse {
    pub total: u64,
    pub queued: u64,
    pub sending: u64,
    pub sent: u64,
    pub delivered: u64,
    pub bounced: u64,
    pub complained: u64,
    pub failed: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDomainRequestBody {
    pub tenant_id: i32,
    pub domain: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DomainResponse {
    pub id: i32,
    pub tenant_id: i32,
    pub domain: String,
    pub status: String,
    pub dns_records: Option<Vec<DnsRecord>>,
    pub last_verified_at: Option<String>,
    pub verification_error: Option<String>,
}

impl DomainResponse {
    fn from_model(row: tenant_email_domains::Model, records: Option<Vec<DnsRecord>>) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            domain: row.domain,
            status: row.status,
            dns_records: records,
            last_verified_at: row.last_verified_at.map(|t| t.to_rfc3339()),
            verification_error: row.verification_error,
        }
    }
}

impl From<DomainWithDnsRecords> for DomainResponse {
    fn from(created: DomainWithDnsRecords) -> Self {
        let records = created.dns_records;
        Self::from_model(created.domain, Some(records))
    }
}

/// Enqueue an email for delivery
#[utoipa::path(
    tag = "Emails",
    post,
    path = "/emails",
    request_body = SendEmailRequestBody,
    responses(
        (status = 201, description = "Email queued", body = SendEmailResponseBody),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 404, description = "Template not found", body = ErrorBody)
    )
)]
pub async fn send_email(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendEmailRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let id = state
        .queue
        .enqueue(EnqueueRequest {
            to: request.to,
            template: request.template,
            data: request.data,
            tenant_id: request.tenant_id,
            from: request.from,
            reply_to: request.reply_to,
            subject: request.subject,
            html: request.html,
            text: request.text,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SendEmailResponseBody {
            id: id.to_string(),
            status: "queued".to_string(),
        }),
    ))
}

/// Fetch one email log
#[utoipa::path(
    tag = "Emails",
    get,
    path = "/emails/{id}",
    responses(
        (status = 200, description = "Email log", body = EmailResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_email(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<EmailResponse>, ApiError> {
    let row = state.queue.get(id).await?;
    Ok(Json(row.into()))
}

/// Email counts per status
#[utoipa::path(
    tag = "Emails",
    get,
    path = "/emails/stats",
    responses(
        (status = 200, description = "Email statistics", body = EmailStatsResponse)
    )
)]
pub async fn get_email_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EmailStatsResponse>, ApiError> {
    let stats = state.queue.count_by_status().await?;
    Ok(Json(EmailStatsResponse {
        total: stats.total,
        queued: stats.queued,
        sending: stats.sending,
        sent: stats.sent,
        delivered: stats.delivered,
        bounced: stats.bounced,
        complained: stats.complained,
        failed: stats.failed,
    }))
}

/// Provision a sending domain for a tenant
#[utoipa::path(
    tag = "Domains",
    post,
    path = "/domains",
    request_body = CreateDomainRequestBody,
    responses(
        (status = 201, description = "Domain created", body = DomainResponse),
        (status = 500, description = "Provider error", body = ErrorBody)
    )
)]
pub async fn create_domain(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateDomainRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state
        .domains
        .create(request.tenant_id, &request.domain)
        .await?;
    Ok((StatusCode::CREATED, Json(DomainResponse::from(created))))
}

/// Re-check a domain's verification status with the provider
#[utoipa::path(
    tag = "Domains",
    post,
    path = "/domains/{id}/verify",
    responses(
        (status = 200, description = "Updated domain", body = DomainResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn verify_domain(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<DomainResponse>, ApiError> {
    let updated = state.domains.verify(id).await?;
    Ok(Json(DomainResponse::from_model(updated, None)))
}

/// List all provisioned domains
#[utoipa::path(
    tag = "Domains",
    get,
    path = "/domains",
    responses(
        (status = 200, description = "Domains", body = [DomainResponse])
    )
)]
pub async fn list_domains(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DomainResponse>>, ApiError> {
    let domains = state.domains.list().await?;
    Ok(Json(
        domains
            .into_iter()
            .map(|d| DomainResponse::from_model(d, None))
            .collect(),
    ))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        send_email,
        get_email,
        get_email_stats,
        create_domain,
        verify_domain,
        list_domains
    ),
    components(schemas(
        SendEmailRequestBody,
        SendEmailResponseBody,
        EmailResponse,
        EmailStatsResponse,
        CreateDomainRequestBody,
        DomainResponse,
        DnsRecord,
        ErrorBody
    ))
)]
pub struct DeliveryApiDoc;
