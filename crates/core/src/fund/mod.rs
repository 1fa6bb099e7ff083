//! Fund and rights balance ledger.
//!
//! This module implements the merchant rights economy:
//! - Funds (deposits and allocations) and their lifecycle
//! - Append-only fund transactions
//! - Rights balances with freeze, unfreeze and consumption
//! - Tenant context resolution
//! - Audit and notification events
//! - The storage seam and an in-memory store
//! - The ledger service

pub mod balance;
pub mod context;
pub mod error;
pub mod events;
pub mod memory;
pub mod service;
pub mod store;
pub mod types;
pub mod validation;

#[cfg(test)]
mod balance_props;

pub use balance::{BalanceChange, RightsBalance};
pub use context::{IdentityResolver, RequestIdentity, TenantContext, TenantResolver};
pub use error::FundError;
pub use events::{
    AuditAction, AuditEvent, AuditOutcome, AuditSink, BalanceChangedEvent, EventPublisher,
    LedgerEvent, NoopNotificationSink, NotificationSink, SinkError, TracingAuditSink,
    event_channel, spawn_event_worker,
};
pub use memory::{FailPoint, InMemoryBalanceStore, MemoryUnitOfWork};
pub use service::FundLedgerService;
pub use store::{BalanceStore, UnitOfWork};
pub use types::{
    AllocateRequest, BatchDepositRequest, ConsumeRequest, DepositRequest, Fund, FundDraft,
    FundFilter, FundStatus, FundSummary, FundTransaction, FundType, RIGHTS_PER_CURRENCY_UNIT,
    TransactionKind, TransactionQuery, TransactionType,
};
