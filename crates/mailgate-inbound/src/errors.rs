//! Error types for inbound processing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InboundError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Ticketing error: {0}")]
    Ticketing(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
