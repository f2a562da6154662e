pub use sea_orm_migration::prelude::*;

mod m20250715_000001_create_tenant_tables;
mod m20250715_000002_create_email_tables;
mod m20250715_000003_create_webhook_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250715_000001_create_tenant_tables::Migration),
            Box::new(m20250715_000002_create_email_tables::Migration),
            Box::new(m20250715_000003_create_webhook_tables::Migration),
        ]
    }
}
