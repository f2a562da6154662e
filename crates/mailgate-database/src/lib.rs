//! Database connection and test utilities

pub use sea_orm;
mod connection;

pub use connection::{establish_connection, DbConnection};

// Export test utilities for use by other crates in their tests
pub mod test_utils;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_establish_connection_runs_migrations() -> anyhow::Result<()> {
        let db = establish_connection("sqlite::memory:").await?;

        // A migrated database has the email_logs table
        use sea_orm::EntityTrait;
        let logs = mailgate_entities::email_logs::Entity::find()
            .all(db.as_ref())
            .await?;
        assert!(logs.is_empty());

        Ok(())
    }
}
