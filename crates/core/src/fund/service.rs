//! Fund ledger service.
//!
//! Orchestrates deposits, allocations, freezes and consumption on top of a
//! [`BalanceStore`]. Each mutation runs in one unit of work that locks the
//! merchant's balance row, writes the fund and its entry, updates the balance
//! and commits. Conflicts are retried, every attempt is bounded by the
//! configured timeout, and audit and notification events are published without
//! waiting on their consumers.

use futures::future::BoxFuture;
use rights_shared::LedgerConfig;
use rights_shared::types::{FundId, MerchantId, OperatorId, PageRequest, PageResponse, TenantId};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::balance::{BalanceChange, RightsBalance};
use super::context::TenantContext;
use super::error::FundError;
use super::events::{AuditAction, AuditEvent, AuditOutcome, BalanceChangedEvent, EventPublisher};
use super::store::{BalanceStore, UnitOfWork};
use super::types::{
    AllocateRequest, BatchDepositRequest, ConsumeRequest, DepositRequest, Fund, FundDraft,
    FundFilter, FundStatus, FundSummary, FundTransaction, FundType, TransactionQuery,
};
use super::validation;

/// Outcome of one committed balance mutation.
#[derive(Debug, Clone)]
struct Applied {
    fund: Option<Fund>,
    entry: Option<FundTransaction>,
    balance: Option<RightsBalance>,
    change: Option<BalanceChange>,
}

impl Applied {
    fn replay(fund: Fund) -> Self {
        Self {
            fund: Some(fund),
            entry: None,
            balance: None,
            change: None,
        }
    }
}

/// Service for fund ledger operations.
#[derive(Debug, Clone)]
pub struct FundLedgerService<S: BalanceStore> {
    store: S,
    events: EventPublisher,
    config: LedgerConfig,
}

impl<S: BalanceStore> FundLedgerService<S> {
    /// Creates a new fund ledger service.
    pub fn new(store: S, events: EventPublisher, config: LedgerConfig) -> Self {
        Self {
            store,
            events,
            config,
        }
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Active configuration.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Deposits money into a merchant's rights balance.
    #[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), merchant_id = %request.merchant_id))]
    pub async fn deposit(&self, ctx: &TenantContext, request: DepositRequest) -> Result<Fund, FundError> {
        let result = self.deposit_one(ctx, &request).await;
        self.audit(
            ctx,
            AuditAction::Deposit,
            Some(request.merchant_id),
            &result,
            json!({
                "fund_id": result.as_ref().ok().map(|f| f.id),
                "amount": request.amount,
                "currency": request.currency,
                "idempotency_key": request.idempotency_key,
            }),
        );
        result
    }

    /// Applies deposits in order, each committed on its own.
    ///
    /// Stops at the first failure with `BatchItemFailed`; deposits before it
    /// stay committed.
    #[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), items = request.deposits.len()))]
    pub async fn batch_deposit(
        &self,
        ctx: &TenantContext,
        request: BatchDepositRequest,
    ) -> Result<Vec<Fund>, FundError> {
        let mut committed: Vec<Fund> = Vec::with_capacity(request.deposits.len());
        let result = match validation::validate_batch(&request, self.config.max_batch_size) {
            Err(err) => Err(err),
            Ok(()) => {
                let mut failure = None;
                for (position, item) in request.deposits.iter().enumerate() {
                    match self.deposit_one(ctx, item).await {
                        Ok(fund) => committed.push(fund),
                        Err(source) => {
                            warn!(
                                index = position + 1,
                                committed = committed.len(),
                                error = %source,
                                "Batch deposit stopped"
                            );
                            failure = Some(FundError::BatchItemFailed {
                                index: position + 1,
                                committed: committed.iter().map(|f| f.id).collect(),
                                source: Box::new(source),
                            });
                            break;
                        }
                    }
                }
                match failure {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
        };

        let failed_index = match &result {
            Err(FundError::BatchItemFailed { index, .. }) => Some(*index),
            _ => None,
        };
        self.audit(
            ctx,
            AuditAction::BatchDeposit,
            None,
            &result,
            json!({
                "requested": request.deposits.len(),
                "committed": committed.iter().map(|f| f.id).collect::<Vec<_>>(),
                "failed_index": failed_index,
            }),
        );
        result.map(|()| committed)
    }

    /// Grants rights to a merchant in the configured base currency.
    #[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), merchant_id = %request.merchant_id))]
    pub async fn allocate(&self, ctx: &TenantContext, request: AllocateRequest) -> Result<Fund, FundError> {
        let result = match validation::validate_allocation(&request, self.config.base_currency) {
            Ok(draft) => self.record(ctx, draft).await,
            Err(err) => Err(err),
        };
        self.audit(
            ctx,
            AuditAction::Allocate,
            Some(request.merchant_id),
            &result,
            json!({
                "fund_id": result.as_ref().ok().map(|f| f.id),
                "amount": request.amount,
                "currency": self.config.base_currency,
                "idempotency_key": request.idempotency_key,
            }),
        );
        result
    }

    /// Puts `amount` of the available balance on hold.
    #[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), merchant_id = %merchant_id, amount = %amount))]
    pub async fn freeze_balance(
        &self,
        ctx: &TenantContext,
        merchant_id: MerchantId,
        amount: Decimal,
        reason: &str,
    ) -> Result<(), FundError> {
        let result = self.freeze_inner(ctx, merchant_id, amount, reason).await;
        self.audit(
            ctx,
            AuditAction::Freeze,
            Some(merchant_id),
            &result,
            json!({
                "fund_id": result.as_ref().ok(),
                "amount": amount,
                "reason": reason,
            }),
        );
        result.map(|_| ())
    }

    /// Releases `amount` of the frozen balance.
    #[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), merchant_id = %merchant_id, amount = %amount))]
    pub async fn unfreeze_balance(
        &self,
        ctx: &TenantContext,
        merchant_id: MerchantId,
        amount: Decimal,
        reason: &str,
    ) -> Result<(), FundError> {
        let result = self.unfreeze_inner(ctx, merchant_id, amount, reason).await;
        self.audit(
            ctx,
            AuditAction::Unfreeze,
            Some(merchant_id),
            &result,
            json!({ "amount": amount, "reason": reason }),
        );
        result
    }

    /// Draws rights down to fulfil an order.
    #[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), merchant_id = %request.merchant_id))]
    pub async fn consume(&self, ctx: &TenantContext, request: ConsumeRequest) -> Result<FundTransaction, FundError> {
        let result = self.consume_inner(ctx, &request).await;
        self.audit(
            ctx,
            AuditAction::Consume,
            Some(request.merchant_id),
            &result,
            json!({
                "transaction_id": result.as_ref().ok().map(|t| t.id),
                "amount": request.amount,
                "reference": request.reference,
            }),
        );
        result
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns a merchant's balance. Merchants without a row read as zero.
    #[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), merchant_id = %merchant_id))]
    pub async fn get_balance(&self, ctx: &TenantContext, merchant_id: MerchantId) -> Result<RightsBalance, FundError> {
        let result = self.read_balance(ctx, merchant_id).await;
        self.audit(
            ctx,
            AuditAction::BalanceQuery,
            Some(merchant_id),
            &result,
            json!({
                "available_balance": result.as_ref().ok().map(RightsBalance::available_balance),
            }),
        );
        result
    }

    /// Returns a fund of the caller's tenant.
    pub async fn get_fund(&self, ctx: &TenantContext, fund_id: FundId) -> Result<Fund, FundError> {
        let fund = self
            .store
            .find_fund(ctx.tenant_id(), fund_id)
            .await?
            .ok_or_else(|| FundError::NotFound(format!("fund {fund_id}")))?;
        ensure_tenant(ctx, fund.tenant_id)?;
        Ok(fund)
    }

    /// Lists funds matching `filter`, newest first.
    pub async fn list_funds(
        &self,
        ctx: &TenantContext,
        filter: FundFilter,
        page: PageRequest,
    ) -> Result<PageResponse<Fund>, FundError> {
        if let Some(merchant_id) = filter.merchant_id {
            validation::validate_merchant(merchant_id)?;
        }
        validation::validate_time_range(filter.start_time, filter.end_time)?;
        let page = page.clamped(self.config.max_page_size);
        let (funds, total) = self
            .store
            .find_page_with_filter(ctx.tenant_id(), &filter, &page)
            .await?;
        for fund in &funds {
            ensure_tenant(ctx, fund.tenant_id)?;
        }
        Ok(PageResponse::new(funds, page, total))
    }

    /// Lists ledger entries matching `query`, newest first.
    pub async fn list_transactions(
        &self,
        ctx: &TenantContext,
        mut query: TransactionQuery,
    ) -> Result<PageResponse<FundTransaction>, FundError> {
        if let Some(merchant_id) = query.merchant_id {
            validation::validate_merchant(merchant_id)?;
        }
        validation::validate_time_range(query.start_time, query.end_time)?;
        query.page = query.page.clamped(self.config.max_page_size);
        let (entries, total) = self
            .store
            .list_fund_transactions(ctx.tenant_id(), &query)
            .await?;
        for entry in &entries {
            ensure_tenant(ctx, entry.tenant_id)?;
        }
        Ok(PageResponse::new(entries, query.page, total))
    }

    /// Aggregates one merchant, or the whole tenant when `merchant_id` is `None`.
    pub async fn get_summary(
        &self,
        ctx: &TenantContext,
        merchant_id: Option<MerchantId>,
    ) -> Result<FundSummary, FundError> {
        if let Some(merchant_id) = merchant_id {
            validation::validate_merchant(merchant_id)?;
        }
        self.store.summarize(ctx.tenant_id(), merchant_id).await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn deposit_one(&self, ctx: &TenantContext, request: &DepositRequest) -> Result<Fund, FundError> {
        let draft = validation::validate_deposit(request)?;
        self.record(ctx, draft).await
    }

    async fn record(&self, ctx: &TenantContext, draft: FundDraft) -> Result<Fund, FundError> {
        let operator_id = ctx.operator_id();
        let applied = self
            .with_transaction(ctx, move |uow| {
                Box::pin(record_fund(uow, operator_id, draft.clone()))
            })
            .await?;
        self.notify(&applied);

        let fund = applied
            .fund
            .ok_or_else(|| FundError::Persistence("fund missing after commit".to_string()))?;
        if applied.change.is_some() {
            info!(fund_id = %fund.id, amount = %fund.amount, currency = %fund.currency, "Fund recorded");
        } else {
            debug!(fund_id = %fund.id, "Idempotent replay, returning existing fund");
        }
        Ok(fund)
    }

    async fn freeze_inner(
        &self,
        ctx: &TenantContext,
        merchant_id: MerchantId,
        amount: Decimal,
        reason: &str,
    ) -> Result<FundId, FundError> {
        validation::validate_hold(merchant_id, amount, reason, self.config.base_currency)?;
        let hold = FundDraft {
            merchant_id,
            fund_type: FundType::Allocation,
            amount,
            currency: self.config.base_currency,
            description: reason.to_string(),
            idempotency_key: None,
        };
        let operator_id = ctx.operator_id();
        let applied = self
            .with_transaction(ctx, move |uow| {
                Box::pin(freeze_hold(uow, operator_id, hold.clone()))
            })
            .await?;
        self.notify(&applied);

        let fund_id = applied
            .fund
            .map(|f| f.id)
            .ok_or_else(|| FundError::Persistence("freeze fund missing after commit".to_string()))?;
        info!(fund_id = %fund_id, amount = %amount, "Balance frozen");
        Ok(fund_id)
    }

    async fn unfreeze_inner(
        &self,
        ctx: &TenantContext,
        merchant_id: MerchantId,
        amount: Decimal,
        reason: &str,
    ) -> Result<(), FundError> {
        validation::validate_hold(merchant_id, amount, reason, self.config.base_currency)?;
        let operator_id = ctx.operator_id();
        let reason = reason.to_string();
        let applied = self
            .with_transaction(ctx, move |uow| {
                Box::pin(release_hold(uow, operator_id, merchant_id, amount, reason.clone()))
            })
            .await?;
        self.notify(&applied);
        info!(amount = %amount, "Balance unfrozen");
        Ok(())
    }

    async fn consume_inner(&self, ctx: &TenantContext, request: &ConsumeRequest) -> Result<FundTransaction, FundError> {
        validation::validate_consume(request, self.config.base_currency)?;
        let operator_id = ctx.operator_id();
        let merchant_id = request.merchant_id;
        let amount = request.amount;
        let description = if request.description.is_empty() {
            request.reference.clone()
        } else {
            format!("{} {}", request.reference, request.description)
        };
        let applied = self
            .with_transaction(ctx, move |uow| {
                Box::pin(consume_rights(uow, operator_id, merchant_id, amount, description.clone()))
            })
            .await?;
        self.notify(&applied);

        let entry = applied
            .entry
            .ok_or_else(|| FundError::Persistence("consume entry missing after commit".to_string()))?;
        info!(transaction_id = %entry.id, amount = %amount, "Rights consumed");
        Ok(entry)
    }

    async fn read_balance(&self, ctx: &TenantContext, merchant_id: MerchantId) -> Result<RightsBalance, FundError> {
        validation::validate_merchant(merchant_id)?;
        let balance = self
            .store
            .get_merchant_balance(ctx.tenant_id(), merchant_id)
            .await?
            .unwrap_or_else(|| RightsBalance::zero(ctx.tenant_id(), merchant_id));
        ensure_tenant(ctx, balance.tenant_id)?;
        Ok(balance)
    }

    /// Runs `op` in a tenant-scoped unit of work.
    ///
    /// Commits on success and rolls back on error. Concurrency conflicts are
    /// retried up to `max_conflict_retries` times; each attempt is bounded by
    /// `operation_timeout`, and an expired attempt is dropped, which discards
    /// its unit of work.
    pub async fn with_transaction<T, F>(&self, ctx: &TenantContext, op: F) -> Result<T, FundError>
    where
        T: Send,
        F: for<'u> Fn(&'u mut S::Uow) -> BoxFuture<'u, Result<T, FundError>> + Send + Sync,
    {
        let timeout = self.config.operation_timeout();
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(timeout, self.run_once(ctx.tenant_id(), &op)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(tenant_id = %ctx.tenant_id(), timeout_ms = timeout.as_millis(), "Ledger operation timed out");
                    Err(FundError::Timeout(timeout))
                }
            };

            match result {
                Err(err) if err.is_retryable() && attempt < self.config.max_conflict_retries => {
                    attempt += 1;
                    warn!(
                        tenant_id = %ctx.tenant_id(),
                        attempt,
                        error = %err,
                        "Concurrency conflict, retrying"
                    );
                    tokio::time::sleep(self.config.retry_backoff(attempt)).await;
                }
                other => return other,
            }
        }
    }

    async fn run_once<T, F>(&self, tenant_id: TenantId, op: &F) -> Result<T, FundError>
    where
        T: Send,
        F: for<'u> Fn(&'u mut S::Uow) -> BoxFuture<'u, Result<T, FundError>> + Send + Sync,
    {
        let mut uow = self.store.begin(tenant_id).await?;
        match op(&mut uow).await {
            Ok(value) => {
                uow.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    fn notify(&self, applied: &Applied) {
        if let (Some(balance), Some(change)) = (&applied.balance, &applied.change) {
            let fund_id = applied.fund.as_ref().map(|f| f.id);
            self.events
                .balance_changed(BalanceChangedEvent::new(balance, change, fund_id));
        }
    }

    fn audit<T>(
        &self,
        ctx: &TenantContext,
        action: AuditAction,
        merchant_id: Option<MerchantId>,
        result: &Result<T, FundError>,
        payload: serde_json::Value,
    ) {
        if let Err(err) = result {
            debug!(action = ?action, error = %err, "Ledger operation failed");
        }
        self.events.audit(AuditEvent::new(
            ctx,
            action,
            merchant_id,
            AuditOutcome::of(result),
            payload,
        ));
    }
}

fn ensure_tenant(ctx: &TenantContext, found: TenantId) -> Result<(), FundError> {
    if found != ctx.tenant_id() {
        error!(
            expected = %ctx.tenant_id(),
            found = %found,
            "Store returned a row of another tenant"
        );
        return Err(FundError::CrossTenantAccess {
            expected: ctx.tenant_id(),
            found,
        });
    }
    Ok(())
}

// ============================================================================
// Unit-of-work bodies
// ============================================================================

/// Writes a fund, its entry and the credited balance, then confirms the fund.
async fn record_fund<U: UnitOfWork>(
    uow: &mut U,
    operator_id: OperatorId,
    draft: FundDraft,
) -> Result<Applied, FundError> {
    let mut balance = uow.lock_merchant_balance(draft.merchant_id).await?;

    if let Some(key) = draft.idempotency_key.as_deref() {
        if let Some(existing) = uow.find_fund_by_idempotency_key(key).await? {
            if existing.merchant_id != draft.merchant_id
                || existing.fund_type != draft.fund_type
                || existing.amount != draft.amount
                || existing.currency != draft.currency
            {
                return Err(FundError::Validation(format!(
                    "idempotency_key {key} was already used for a different request"
                )));
            }
            return Ok(Applied::replay(existing));
        }
    }

    let mut fund = Fund::pending(uow.tenant_id(), operator_id, &draft);
    uow.create_fund(&fund).await?;

    let change = balance.credit(draft.fund_type.into(), fund.rights_amount())?;
    let entry = FundTransaction::record(
        uow.tenant_id(),
        draft.merchant_id,
        operator_id,
        Some(fund.id),
        &change,
        draft.description,
    );
    uow.create_fund_transaction(&entry).await?;
    let balance = uow.update_merchant_balance(&balance).await?;

    fund.transition_to(FundStatus::Confirmed)?;
    uow.update_fund_status(&fund).await?;

    Ok(Applied {
        fund: Some(fund),
        entry: Some(entry),
        balance: Some(balance),
        change: Some(change),
    })
}

/// Freezes part of the available balance behind a placeholder fund.
async fn freeze_hold<U: UnitOfWork>(
    uow: &mut U,
    operator_id: OperatorId,
    hold: FundDraft,
) -> Result<Applied, FundError> {
    let mut balance = uow.lock_merchant_balance(hold.merchant_id).await?;
    let change = balance.freeze(hold.amount)?;

    let mut fund = Fund::pending(uow.tenant_id(), operator_id, &hold);
    uow.create_fund(&fund).await?;
    let entry = FundTransaction::record(
        uow.tenant_id(),
        hold.merchant_id,
        operator_id,
        Some(fund.id),
        &change,
        hold.description,
    );
    uow.create_fund_transaction(&entry).await?;
    let balance = uow.update_merchant_balance(&balance).await?;

    fund.transition_to(FundStatus::Confirmed)?;
    uow.update_fund_status(&fund).await?;

    Ok(Applied {
        fund: Some(fund),
        entry: Some(entry),
        balance: Some(balance),
        change: Some(change),
    })
}

async fn release_hold<U: UnitOfWork>(
    uow: &mut U,
    operator_id: OperatorId,
    merchant_id: MerchantId,
    amount: Decimal,
    reason: String,
) -> Result<Applied, FundError> {
    let mut balance = uow.lock_merchant_balance(merchant_id).await?;
    let change = balance.unfreeze(amount)?;
    apply_entry(uow, operator_id, balance, change, reason).await
}

async fn consume_rights<U: UnitOfWork>(
    uow: &mut U,
    operator_id: OperatorId,
    merchant_id: MerchantId,
    amount: Decimal,
    description: String,
) -> Result<Applied, FundError> {
    let mut balance = uow.lock_merchant_balance(merchant_id).await?;
    let change = balance.consume(amount)?;
    apply_entry(uow, operator_id, balance, change, description).await
}

/// Writes a fund-less entry and the balance it describes.
async fn apply_entry<U: UnitOfWork>(
    uow: &mut U,
    operator_id: OperatorId,
    balance: RightsBalance,
    change: BalanceChange,
    description: String,
) -> Result<Applied, FundError> {
    let entry = FundTransaction::record(
        uow.tenant_id(),
        balance.merchant_id,
        operator_id,
        None,
        &change,
        description,
    );
    uow.create_fund_transaction(&entry).await?;
    let balance = uow.update_merchant_balance(&balance).await?;

    Ok(Applied {
        fund: None,
        entry: Some(entry),
        balance: Some(balance),
        change: Some(change),
    })
}
