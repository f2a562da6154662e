//! Error types for the delivery service

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Email not found: {0}")]
    EmailNotFound(String),

    #[error("Domain not found: {0}")]
    DomainNotFound(i32),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("DNS provider error: {0}")]
    Dns(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
