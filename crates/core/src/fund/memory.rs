//! In-memory [`BalanceStore`] with fault injection.
//!
//! Balance rows are locked with a per-(tenant, merchant) async mutex held by
//! the unit of work. Writes are staged in the unit of work and applied under
//! the table lock at commit, so an uncommitted or dropped unit of work leaves
//! no trace.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rights_shared::types::{FundId, MerchantId, PageRequest, TenantId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::balance::RightsBalance;
use super::error::FundError;
use super::store::{BalanceStore, UnitOfWork};
use super::types::{Fund, FundFilter, FundStatus, FundSummary, FundTransaction, TransactionKind, TransactionQuery};

/// Write step that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// `create_fund`.
    CreateFund,
    /// `create_fund_transaction`.
    CreateFundTransaction,
    /// `update_merchant_balance`.
    UpdateBalance,
    /// `commit`.
    Commit,
}

#[derive(Debug, Default)]
struct Faults {
    fail_points: Vec<FailPoint>,
    conflicts_remaining: u32,
    commit_delay: Option<Duration>,
    unscoped_reads: bool,
}

#[derive(Debug, Default)]
struct Tables {
    funds: Vec<Fund>,
    transactions: Vec<FundTransaction>,
    balances: HashMap<(TenantId, MerchantId), RightsBalance>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: RwLock<Tables>,
    row_locks: DashMap<(TenantId, MerchantId), Arc<Mutex<()>>>,
    faults: RwLock<Faults>,
}

/// Balance store kept entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBalanceStore {
    inner: Arc<Inner>,
}

impl InMemoryBalanceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call at `point` fail until [`Self::clear_faults`].
    pub async fn fail_on(&self, point: FailPoint) {
        self.inner.faults.write().await.fail_points.push(point);
    }

    /// Makes the next `n` balance updates report a version conflict.
    pub async fn inject_conflicts(&self, n: u32) {
        self.inner.faults.write().await.conflicts_remaining = n;
    }

    /// Delays every commit by `delay` before applying it.
    pub async fn set_commit_delay(&self, delay: Option<Duration>) {
        self.inner.faults.write().await.commit_delay = delay;
    }

    /// Makes `find_fund` ignore the tenant filter, as a store with broken
    /// scoping would.
    pub async fn set_unscoped_reads(&self, unscoped: bool) {
        self.inner.faults.write().await.unscoped_reads = unscoped;
    }

    /// Removes every injected fault.
    pub async fn clear_faults(&self) {
        *self.inner.faults.write().await = Faults::default();
    }

    /// Every committed fund of a tenant, in insertion order.
    pub async fn funds(&self, tenant_id: TenantId) -> Vec<Fund> {
        let tables = self.inner.tables.read().await;
        tables
            .funds
            .iter()
            .filter(|f| f.tenant_id == tenant_id)
            .cloned()
            .collect()
    }

    /// Every committed entry of a merchant, in insertion order.
    pub async fn transactions(&self, tenant_id: TenantId, merchant_id: MerchantId) -> Vec<FundTransaction> {
        let tables = self.inner.tables.read().await;
        tables
            .transactions
            .iter()
            .filter(|t| t.tenant_id == tenant_id && t.merchant_id == merchant_id)
            .cloned()
            .collect()
    }

    async fn check(&self, point: FailPoint) -> Result<(), FundError> {
        if self.inner.faults.read().await.fail_points.contains(&point) {
            return Err(FundError::Persistence(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    async fn take_conflict(&self) -> bool {
        let mut faults = self.inner.faults.write().await;
        if faults.conflicts_remaining > 0 {
            faults.conflicts_remaining -= 1;
            return true;
        }
        false
    }

    fn row_lock(&self, tenant_id: TenantId, merchant_id: MerchantId) -> Arc<Mutex<()>> {
        self.inner
            .row_locks
            .entry((tenant_id, merchant_id))
            .or_default()
            .clone()
    }
}

/// Unit of work over an [`InMemoryBalanceStore`].
pub struct MemoryUnitOfWork {
    store: InMemoryBalanceStore,
    tenant_id: TenantId,
    guards: HashMap<MerchantId, OwnedMutexGuard<()>>,
    balances: HashMap<MerchantId, RightsBalance>,
    dirty: Vec<MerchantId>,
    funds: Vec<Fund>,
    transactions: Vec<FundTransaction>,
}

impl std::fmt::Debug for MemoryUnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryUnitOfWork")
            .field("tenant_id", &self.tenant_id)
            .field("locked", &self.guards.keys().collect::<Vec<_>>())
            .field("staged_funds", &self.funds.len())
            .field("staged_transactions", &self.transactions.len())
            .finish_non_exhaustive()
    }
}

impl MemoryUnitOfWork {
    fn ensure_tenant(&self, found: TenantId) -> Result<(), FundError> {
        if found != self.tenant_id {
            return Err(FundError::CrossTenantAccess {
                expected: self.tenant_id,
                found,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    async fn lock_merchant_balance(&mut self, merchant_id: MerchantId) -> Result<RightsBalance, FundError> {
        if let Some(balance) = self.balances.get(&merchant_id) {
            return Ok(balance.clone());
        }

        let lock = self.store.row_lock(self.tenant_id, merchant_id);
        let guard = lock.lock_owned().await;
        self.guards.insert(merchant_id, guard);

        let balance = self
            .store
            .inner
            .tables
            .read()
            .await
            .balances
            .get(&(self.tenant_id, merchant_id))
            .cloned()
            .unwrap_or_else(|| RightsBalance::zero(self.tenant_id, merchant_id));
        self.balances.insert(merchant_id, balance.clone());
        Ok(balance)
    }

    async fn update_merchant_balance(&mut self, balance: &RightsBalance) -> Result<RightsBalance, FundError> {
        self.store.check(FailPoint::UpdateBalance).await?;
        self.ensure_tenant(balance.tenant_id)?;

        let merchant_id = balance.merchant_id;
        let Some(current) = self.balances.get(&merchant_id) else {
            return Err(FundError::Persistence(format!(
                "balance of merchant {merchant_id} updated without a lock"
            )));
        };
        if current.version != balance.version || self.store.take_conflict().await {
            return Err(FundError::ConcurrencyConflict { merchant_id });
        }
        balance.check_invariants()?;

        let updated = RightsBalance {
            version: balance.version + 1,
            updated_at: Utc::now(),
            ..balance.clone()
        };
        self.balances.insert(merchant_id, updated.clone());
        if !self.dirty.contains(&merchant_id) {
            self.dirty.push(merchant_id);
        }
        Ok(updated)
    }

    async fn find_fund_by_idempotency_key(&mut self, key: &str) -> Result<Option<Fund>, FundError> {
        let staged = self
            .funds
            .iter()
            .find(|f| f.idempotency_key.as_deref() == Some(key))
            .cloned();
        if staged.is_some() {
            return Ok(staged);
        }

        let tables = self.store.inner.tables.read().await;
        Ok(tables
            .funds
            .iter()
            .find(|f| f.tenant_id == self.tenant_id && f.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn create_fund(&mut self, fund: &Fund) -> Result<(), FundError> {
        self.store.check(FailPoint::CreateFund).await?;
        self.ensure_tenant(fund.tenant_id)?;

        if let Some(key) = fund.idempotency_key.as_deref() {
            if self.find_fund_by_idempotency_key(key).await?.is_some() {
                return Err(FundError::ConcurrencyConflict {
                    merchant_id: fund.merchant_id,
                });
            }
        }
        self.funds.push(fund.clone());
        Ok(())
    }

    async fn update_fund_status(&mut self, fund: &Fund) -> Result<(), FundError> {
        self.ensure_tenant(fund.tenant_id)?;
        let Some(staged) = self
            .funds
            .iter_mut()
            .find(|f| f.id == fund.id && f.status == FundStatus::Pending)
        else {
            return Err(FundError::NotFound(format!("pending fund {}", fund.id)));
        };
        staged.status = fund.status;
        staged.updated_at = fund.updated_at;
        Ok(())
    }

    async fn create_fund_transaction(&mut self, entry: &FundTransaction) -> Result<(), FundError> {
        self.store.check(FailPoint::CreateFundTransaction).await?;
        self.ensure_tenant(entry.tenant_id)?;

        if !entry.is_consistent() {
            return Err(FundError::Persistence(format!(
                "entry {} does not match its balance delta",
                entry.id
            )));
        }
        self.transactions.push(entry.clone());
        Ok(())
    }

    async fn commit(self) -> Result<(), FundError> {
        let delay = self.store.inner.faults.read().await.commit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.store.check(FailPoint::Commit).await?;

        let mut tables = self.store.inner.tables.write().await;

        // Unique idempotency key, checked again under the table lock.
        for fund in &self.funds {
            if let Some(key) = fund.idempotency_key.as_deref() {
                let taken = tables
                    .funds
                    .iter()
                    .any(|f| f.tenant_id == self.tenant_id && f.idempotency_key.as_deref() == Some(key));
                if taken {
                    return Err(FundError::ConcurrencyConflict {
                        merchant_id: fund.merchant_id,
                    });
                }
            }
        }

        for merchant_id in &self.dirty {
            if let Some(balance) = self.balances.get(merchant_id) {
                tables
                    .balances
                    .insert((self.tenant_id, *merchant_id), balance.clone());
            }
        }
        tables.funds.extend(self.funds);
        tables.transactions.extend(self.transactions);
        Ok(())
    }

    async fn rollback(self) -> Result<(), FundError> {
        Ok(())
    }
}

fn page_of<T>(mut rows: Vec<T>, page: &PageRequest) -> (Vec<T>, u64) {
    let total = rows.len() as u64;
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
    let rows = if offset >= rows.len() {
        Vec::new()
    } else {
        rows.drain(offset..).take(limit).collect()
    };
    (rows, total)
}

#[async_trait]
impl BalanceStore for InMemoryBalanceStore {
    type Uow = MemoryUnitOfWork;

    async fn begin(&self, tenant_id: TenantId) -> Result<Self::Uow, FundError> {
        Ok(MemoryUnitOfWork {
            store: self.clone(),
            tenant_id,
            guards: HashMap::new(),
            balances: HashMap::new(),
            dirty: Vec::new(),
            funds: Vec::new(),
            transactions: Vec::new(),
        })
    }

    async fn get_merchant_balance(
        &self,
        tenant_id: TenantId,
        merchant_id: MerchantId,
    ) -> Result<Option<RightsBalance>, FundError> {
        let tables = self.inner.tables.read().await;
        Ok(tables.balances.get(&(tenant_id, merchant_id)).cloned())
    }

    async fn find_fund(&self, tenant_id: TenantId, fund_id: FundId) -> Result<Option<Fund>, FundError> {
        let unscoped = self.inner.faults.read().await.unscoped_reads;
        let tables = self.inner.tables.read().await;
        Ok(tables
            .funds
            .iter()
            .find(|f| f.id == fund_id && (unscoped || f.tenant_id == tenant_id))
            .cloned())
    }

    async fn find_page_with_filter(
        &self,
        tenant_id: TenantId,
        filter: &FundFilter,
        page: &PageRequest,
    ) -> Result<(Vec<Fund>, u64), FundError> {
        let tables = self.inner.tables.read().await;
        let mut rows: Vec<Fund> = tables
            .funds
            .iter()
            .filter(|f| f.tenant_id == tenant_id && filter.matches(f))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(page_of(rows, page))
    }

    async fn list_fund_transactions(
        &self,
        tenant_id: TenantId,
        query: &TransactionQuery,
    ) -> Result<(Vec<FundTransaction>, u64), FundError> {
        let tables = self.inner.tables.read().await;
        let mut rows: Vec<FundTransaction> = tables
            .transactions
            .iter()
            .filter(|t| t.tenant_id == tenant_id && query.matches(t))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(page_of(rows, &query.page))
    }

    async fn summarize(
        &self,
        tenant_id: TenantId,
        merchant_id: Option<MerchantId>,
    ) -> Result<FundSummary, FundError> {
        let tables = self.inner.tables.read().await;
        let in_scope = |t: TenantId, m: MerchantId| t == tenant_id && merchant_id.is_none_or(|id| id == m);

        let mut summary = FundSummary::empty(merchant_id);
        for balance in tables
            .balances
            .values()
            .filter(|b| in_scope(b.tenant_id, b.merchant_id))
        {
            summary.total_balance += balance.total_balance;
            summary.total_consumed += balance.used_balance;
            summary.total_frozen += balance.frozen_balance;
            summary.available_balance += balance.available_balance();
            summary.merchant_count += 1;
        }
        for entry in tables
            .transactions
            .iter()
            .filter(|t| in_scope(t.tenant_id, t.merchant_id))
        {
            match entry.kind {
                TransactionKind::Deposit => summary.total_deposits += entry.amount,
                TransactionKind::Allocation => summary.total_allocations += entry.amount,
                TransactionKind::Freeze | TransactionKind::Unfreeze | TransactionKind::Consume => {}
            }
            summary.transaction_count += 1;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fund::types::{FundDraft, FundType};
    use rights_shared::types::{Currency, OperatorId};
    use rust_decimal_macros::dec;

    const TENANT: TenantId = TenantId::new(1);
    const MERCHANT: MerchantId = MerchantId::new(7);

    fn fund(key: Option<&str>) -> Fund {
        let draft = FundDraft {
            merchant_id: MERCHANT,
            fund_type: FundType::Deposit,
            amount: dec!(10),
            currency: Currency::Cny,
            description: String::new(),
            idempotency_key: key.map(str::to_string),
        };
        Fund::pending(TENANT, OperatorId::new(1), &draft)
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_leaves_no_trace() {
        let store = InMemoryBalanceStore::new();
        {
            let mut uow = store.begin(TENANT).await.unwrap();
            let mut balance = uow.lock_merchant_balance(MERCHANT).await.unwrap();
            balance.total_balance = dec!(10);
            uow.update_merchant_balance(&balance).await.unwrap();
            uow.create_fund(&fund(None)).await.unwrap();
        }
        assert!(store.get_merchant_balance(TENANT, MERCHANT).await.unwrap().is_none());
        assert!(store.funds(TENANT).await.is_empty());
    }

    #[tokio::test]
    async fn test_commit_applies_and_bumps_version() {
        let store = InMemoryBalanceStore::new();
        let mut uow = store.begin(TENANT).await.unwrap();
        let mut balance = uow.lock_merchant_balance(MERCHANT).await.unwrap();
        balance.total_balance = dec!(10);
        let updated = uow.update_merchant_balance(&balance).await.unwrap();
        assert_eq!(updated.version, 1);
        uow.commit().await.unwrap();

        let stored = store.get_merchant_balance(TENANT, MERCHANT).await.unwrap().unwrap();
        assert_eq!(stored.total_balance, dec!(10));
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = InMemoryBalanceStore::new();
        let mut uow = store.begin(TENANT).await.unwrap();
        let balance = uow.lock_merchant_balance(MERCHANT).await.unwrap();
        uow.update_merchant_balance(&balance).await.unwrap();

        let err = uow.update_merchant_balance(&balance).await.unwrap_err();
        assert!(matches!(err, FundError::ConcurrencyConflict { .. }));
    }

    #[tokio::test]
    async fn test_row_lock_is_held_until_commit() {
        let store = InMemoryBalanceStore::new();
        let mut first = store.begin(TENANT).await.unwrap();
        first.lock_merchant_balance(MERCHANT).await.unwrap();

        let mut second = store.begin(TENANT).await.unwrap();
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            second.lock_merchant_balance(MERCHANT),
        )
        .await;
        assert!(blocked.is_err());

        first.commit().await.unwrap();
        second.lock_merchant_balance(MERCHANT).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_idempotency_key_conflicts() {
        let store = InMemoryBalanceStore::new();
        let mut uow = store.begin(TENANT).await.unwrap();
        uow.create_fund(&fund(Some("k1"))).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin(TENANT).await.unwrap();
        let err = uow.create_fund(&fund(Some("k1"))).await.unwrap_err();
        assert!(matches!(err, FundError::ConcurrencyConflict { .. }));
    }

    #[tokio::test]
    async fn test_fail_point() {
        let store = InMemoryBalanceStore::new();
        store.fail_on(FailPoint::CreateFund).await;
        let mut uow = store.begin(TENANT).await.unwrap();
        assert!(matches!(
            uow.create_fund(&fund(None)).await,
            Err(FundError::Persistence(_))
        ));

        store.clear_faults().await;
        uow.create_fund(&fund(None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_writes_for_other_tenant_rejected() {
        let store = InMemoryBalanceStore::new();
        let mut uow = store.begin(TenantId::new(2)).await.unwrap();
        assert!(matches!(
            uow.create_fund(&fund(None)).await,
            Err(FundError::CrossTenantAccess { .. })
        ));
    }

    #[test]
    fn test_page_of() {
        let rows: Vec<u32> = (1..=25).collect();
        let (page, total) = page_of(rows.clone(), &PageRequest::new(3, 10));
        assert_eq!(total, 25);
        assert_eq!(page, vec![21, 22, 23, 24, 25]);

        let (page, _) = page_of(rows, &PageRequest::new(4, 10));
        assert!(page.is_empty());
    }
}
