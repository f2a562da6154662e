//! Test utilities for database integration tests
//!
//! Provides a migrated in-memory sqlite database so integration tests across
//! all mailgate crates run without external services.

use crate::DbConnection;
use mailgate_migrations::Migrator;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;

/// Test database backed by `sqlite::memory:`
pub struct TestDatabase {
    pub db: Arc<DbConnection>,
}

impl TestDatabase {
    /// Create a fresh in-memory database and run all migrations
    pub async fn new() -> anyhow::Result<Self> {
        // A single pooled connection keeps every query on the same in-memory
        // database instance
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1).sqlx_logging(false);

        let db = Database::connect(opt).await?;

        Migrator::up(&db, None)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

        Ok(TestDatabase { db: Arc::new(db) })
    }

    /// Get the database connection
    pub fn connection(&self) -> &DbConnection {
        &self.db
    }

    /// Get the database connection as Arc
    pub fn connection_arc(&self) -> Arc<DbConnection> {
        Arc::clone(&self.db)
    }
}
