//! Persistence seam of the fund ledger.
//!
//! [`BalanceStore`] is the only component allowed to write funds, fund
//! transactions and balances. Writes happen through a [`UnitOfWork`] scoped to
//! one tenant; dropping a unit of work without committing discards its writes.

use async_trait::async_trait;
use rights_shared::types::{FundId, MerchantId, PageRequest, TenantId};

use super::balance::RightsBalance;
use super::error::FundError;
use super::types::{Fund, FundFilter, FundSummary, FundTransaction, TransactionQuery};

/// Tenant-scoped transaction over the ledger tables.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Tenant this unit of work is scoped to.
    fn tenant_id(&self) -> TenantId;

    /// Returns the merchant's balance, creating a zero row if none exists, and
    /// holds an exclusive lock on it until the unit of work ends.
    async fn lock_merchant_balance(&mut self, merchant_id: MerchantId) -> Result<RightsBalance, FundError>;

    /// Writes a balance previously returned by `lock_merchant_balance`.
    ///
    /// Compares and bumps `version`; a mismatch is `ConcurrencyConflict`.
    async fn update_merchant_balance(&mut self, balance: &RightsBalance) -> Result<RightsBalance, FundError>;

    /// Finds a fund by idempotency key within the tenant.
    async fn find_fund_by_idempotency_key(&mut self, key: &str) -> Result<Option<Fund>, FundError>;

    /// Inserts a fund.
    async fn create_fund(&mut self, fund: &Fund) -> Result<(), FundError>;

    /// Persists a status change. Only pending funds may change status.
    async fn update_fund_status(&mut self, fund: &Fund) -> Result<(), FundError>;

    /// Appends a ledger entry.
    async fn create_fund_transaction(&mut self, entry: &FundTransaction) -> Result<(), FundError>;

    /// Makes every write visible and releases the locks.
    async fn commit(self) -> Result<(), FundError>;

    /// Discards every write and releases the locks.
    async fn rollback(self) -> Result<(), FundError>;
}

/// Storage backend for the fund ledger.
///
/// Every read takes the tenant explicitly and filters on it; there is no
/// unscoped query.
#[async_trait]
pub trait BalanceStore: Send + Sync + 'static {
    /// Unit of work type.
    type Uow: UnitOfWork + 'static;

    /// Opens a unit of work scoped to `tenant_id`.
    async fn begin(&self, tenant_id: TenantId) -> Result<Self::Uow, FundError>;

    /// Reads a balance without locking. `None` if the merchant has no row yet.
    async fn get_merchant_balance(
        &self,
        tenant_id: TenantId,
        merchant_id: MerchantId,
    ) -> Result<Option<RightsBalance>, FundError>;

    /// Finds a fund by ID.
    async fn find_fund(&self, tenant_id: TenantId, fund_id: FundId) -> Result<Option<Fund>, FundError>;

    /// Lists funds matching `filter`, newest first, with the total match count.
    async fn find_page_with_filter(
        &self,
        tenant_id: TenantId,
        filter: &FundFilter,
        page: &PageRequest,
    ) -> Result<(Vec<Fund>, u64), FundError>;

    /// Lists ledger entries matching `query`, newest first, with the total match count.
    async fn list_fund_transactions(
        &self,
        tenant_id: TenantId,
        query: &TransactionQuery,
    ) -> Result<(Vec<FundTransaction>, u64), FundError>;

    /// Aggregates balances and entries for one merchant or the whole tenant.
    async fn summarize(
        &self,
        tenant_id: TenantId,
        merchant_id: Option<MerchantId>,
    ) -> Result<FundSummary, FundError>;
}
