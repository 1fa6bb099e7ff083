//! Core business logic for the rights ledger.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! All domain types, validation rules, and balance calculations live here, along
//! with the storage seam the database crate implements.
//!
//! # Modules
//!
//! - `fund` - Funds, fund transactions, rights balances and the ledger service

pub mod fund;
