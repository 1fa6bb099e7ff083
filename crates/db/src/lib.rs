//! Database layer with `SeaORM` entities and repositories.
//!
//! This crate provides:
//! - `SeaORM` entity definitions for the ledger tables
//! - [`FundRepository`], the Postgres implementation of the ledger store
//! - Database migrations, including the tenant RLS policies

pub mod entities;
pub mod migration;
pub mod repositories;
pub mod rls;

pub use repositories::{FundRepository, FundUnitOfWork};

use rights_shared::config::DatabaseConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// Builds pool options from the configured URL and pool bounds.
#[must_use]
pub fn connect_options(config: &DatabaseConfig) -> ConnectOptions {
    let mut opts = ConnectOptions::new(config.url.clone());
    opts.max_connections(config.max_connections)
        .min_connections(config.min_connections);
    opts
}

/// Establishes a pooled connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    Database::connect(connect_options(config)).await
}
