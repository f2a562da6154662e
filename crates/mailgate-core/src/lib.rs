//! Core utilities and types shared across all Mailgate crates

pub mod error;
pub mod events;
pub mod settings;
pub mod templates;
pub mod types;

// Re-export commonly used types
pub use error::*;
pub use events::*;
pub use settings::*;
pub use types::*;

// Re-export external dependencies
pub use anyhow;
pub use async_trait;
pub use chrono;
pub use serde;
pub use serde_json;
pub use thiserror;
pub use tokio;
pub use tracing;
pub use uuid;
