//! Repository abstractions for data access.
//!
//! Repositories implement the storage seams of `rights-core`, hiding the
//! `SeaORM` implementation details from the service layer.

pub mod fund;

pub use fund::{FundRepository, FundUnitOfWork};
