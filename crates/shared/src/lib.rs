//! Shared types, errors, and configuration for the rights ledger.
//!
//! This crate provides common types used across all other crates:
//! - Money types with decimal precision and currency scale rules
//! - Typed IDs for tenants, merchants, operators, funds and ledger entries
//! - Pagination types for list queries
//! - Application-wide error types
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, DatabaseConfig, EventConfig, LedgerConfig};
pub use error::AppError;
