//! Database migrations for the Mailgate gateway

pub use sea_orm_migration::prelude::*;

mod migration;

pub use migration::Migrator;
