//! Fund ledger domain types.
//!
//! Funds record balance-affecting events, fund transactions are the
//! append-only trail, and the request/query types describe what callers
//! may ask of the ledger.

use chrono::{DateTime, Utc};
use rights_shared::types::{
    Currency, FundId, FundTransactionId, MerchantId, OperatorId, PageRequest, TenantId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::balance::BalanceChange;
use super::error::FundError;

/// Rights credited per unit of deposited currency.
///
/// Rights are not exchanged at market rates; every accepted currency converts
/// at this fixed constant.
pub const RIGHTS_PER_CURRENCY_UNIT: Decimal = Decimal::ONE;

/// Kind of balance-affecting event a fund records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundType {
    /// Money paid in by the merchant.
    Deposit,
    /// Rights granted by the tenant (also used for freeze placeholders).
    Allocation,
}

/// Fund lifecycle status.
///
/// `Pending -> Confirmed` when all paired writes succeed, `Pending -> Failed`
/// otherwise. Both terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundStatus {
    /// Created inside an open ledger transaction.
    Pending,
    /// Paired entry and balance update committed.
    Confirmed,
    /// The paired writes failed.
    Failed,
}

impl FundStatus {
    /// Returns true if `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed | Self::Failed)
        )
    }
}

/// Direction of a fund transaction relative to the available balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Increases the available balance.
    Credit,
    /// Decreases the available balance.
    Debit,
}

impl TransactionType {
    /// Applies the direction to an unsigned amount.
    #[must_use]
    pub fn signed(self, amount: Decimal) -> Decimal {
        match self {
            Self::Credit => amount,
            Self::Debit => -amount,
        }
    }
}

/// Business operation that produced a fund transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Deposit credited to the total balance.
    Deposit,
    /// Allocation credited to the total balance.
    Allocation,
    /// Portion of the available balance put on hold.
    Freeze,
    /// Hold released back to the available balance.
    Unfreeze,
    /// Rights drawn down to fulfil an order.
    Consume,
}

impl TransactionKind {
    /// Direction this kind always records.
    #[must_use]
    pub const fn transaction_type(self) -> TransactionType {
        match self {
            Self::Deposit | Self::Allocation | Self::Unfreeze => TransactionType::Credit,
            Self::Freeze | Self::Consume => TransactionType::Debit,
        }
    }

    /// Returns true if entries of this kind change `total_balance`.
    #[must_use]
    pub const fn affects_total(self) -> bool {
        matches!(self, Self::Deposit | Self::Allocation)
    }
}

impl From<FundType> for TransactionKind {
    fn from(fund_type: FundType) -> Self {
        match fund_type {
            FundType::Deposit => Self::Deposit,
            FundType::Allocation => Self::Allocation,
        }
    }
}

/// One balance-affecting event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fund {
    /// Fund ID.
    pub id: FundId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Merchant whose balance the fund affects.
    pub merchant_id: MerchantId,
    /// Deposit or allocation.
    pub fund_type: FundType,
    /// Amount in `currency`.
    pub amount: Decimal,
    /// Currency of `amount`.
    pub currency: Currency,
    /// Lifecycle status.
    pub status: FundStatus,
    /// Free-form description.
    pub description: String,
    /// Operator who requested the fund.
    pub operator_id: OperatorId,
    /// Caller-supplied key making retries safe.
    pub idempotency_key: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

impl Fund {
    /// Creates a pending fund from a validated draft.
    #[must_use]
    pub fn pending(tenant_id: TenantId, operator_id: OperatorId, draft: &FundDraft) -> Self {
        let now = Utc::now();
        Self {
            id: FundId::new(),
            tenant_id,
            merchant_id: draft.merchant_id,
            fund_type: draft.fund_type,
            amount: draft.amount,
            currency: draft.currency,
            status: FundStatus::Pending,
            description: draft.description.clone(),
            operator_id,
            idempotency_key: draft.idempotency_key.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the fund to `next`, refusing illegal transitions.
    pub fn transition_to(&mut self, next: FundStatus) -> Result<(), FundError> {
        if !self.status.can_transition_to(next) {
            return Err(FundError::InvalidStatusTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Rights credited when this fund is confirmed.
    #[must_use]
    pub fn rights_amount(&self) -> Decimal {
        self.amount * RIGHTS_PER_CURRENCY_UNIT
    }
}

/// Everything needed to record a fund, independent of the tenant context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundDraft {
    /// Target merchant.
    pub merchant_id: MerchantId,
    /// Deposit or allocation.
    pub fund_type: FundType,
    /// Amount in `currency`.
    pub amount: Decimal,
    /// Currency of `amount`.
    pub currency: Currency,
    /// Description copied onto the fund and its entry.
    pub description: String,
    /// Optional idempotency key.
    pub idempotency_key: Option<String>,
}

/// Immutable ledger entry; one per balance mutation.
///
/// `balance_before` and `balance_after` are the merchant's available balance
/// around the mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundTransaction {
    /// Entry ID.
    pub id: FundTransactionId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Merchant whose balance changed.
    pub merchant_id: MerchantId,
    /// Fund that produced the entry, if any.
    pub fund_id: Option<FundId>,
    /// Credit or debit.
    pub transaction_type: TransactionType,
    /// Operation that produced the entry.
    pub kind: TransactionKind,
    /// Unsigned amount.
    pub amount: Decimal,
    /// Available balance before the mutation.
    pub balance_before: Decimal,
    /// Available balance after the mutation.
    pub balance_after: Decimal,
    /// Operator who performed the mutation.
    pub operator_id: OperatorId,
    /// Free-form description.
    pub description: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl FundTransaction {
    /// Builds the entry describing an applied balance change.
    #[must_use]
    pub fn record(
        tenant_id: TenantId,
        merchant_id: MerchantId,
        operator_id: OperatorId,
        fund_id: Option<FundId>,
        change: &BalanceChange,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: FundTransactionId::new(),
            tenant_id,
            merchant_id,
            fund_id,
            transaction_type: change.kind.transaction_type(),
            kind: change.kind,
            amount: change.amount,
            balance_before: change.available_before,
            balance_after: change.available_after,
            operator_id,
            description: description.into(),
            created_at: Utc::now(),
        }
    }

    /// Signed amount: positive for credits, negative for debits.
    #[must_use]
    pub fn signed_amount(&self) -> Decimal {
        self.transaction_type.signed(self.amount)
    }

    /// Returns true if `balance_after - balance_before` matches the signed amount.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.balance_after - self.balance_before == self.signed_amount()
    }
}

/// Deposit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRequest {
    /// Target merchant.
    pub merchant_id: MerchantId,
    /// Amount, must be positive and fit the currency's scale.
    pub amount: Decimal,
    /// Currency of the deposit.
    pub currency: Currency,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Optional idempotency key.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Batch of deposits applied in order, each committed on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDepositRequest {
    /// Deposits in application order.
    pub deposits: Vec<DepositRequest>,
}

/// Allocation request; the currency is the tenant's base currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateRequest {
    /// Target merchant.
    pub merchant_id: MerchantId,
    /// Amount, must be positive.
    pub amount: Decimal,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Optional idempotency key.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Consumption of rights for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeRequest {
    /// Merchant drawing rights down.
    pub merchant_id: MerchantId,
    /// Amount, must be positive.
    pub amount: Decimal,
    /// External reference (usually an order number).
    pub reference: String,
    /// Description.
    #[serde(default)]
    pub description: String,
}

/// Filters for listing fund transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionQuery {
    /// Filter by merchant.
    pub merchant_id: Option<MerchantId>,
    /// Filter by originating fund.
    pub fund_id: Option<FundId>,
    /// Filter by direction.
    pub transaction_type: Option<TransactionType>,
    /// Filter by operation.
    pub kind: Option<TransactionKind>,
    /// Filter by operator.
    pub operator_id: Option<OperatorId>,
    /// Inclusive lower bound on `created_at`.
    pub start_time: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub end_time: Option<DateTime<Utc>>,
    /// Page to return.
    #[serde(default)]
    pub page: PageRequest,
}

impl TransactionQuery {
    /// Returns true if `entry` passes every filter.
    #[must_use]
    pub fn matches(&self, entry: &FundTransaction) -> bool {
        self.merchant_id.is_none_or(|m| entry.merchant_id == m)
            && self.fund_id.is_none_or(|f| entry.fund_id == Some(f))
            && self
                .transaction_type
                .is_none_or(|t| entry.transaction_type == t)
            && self.kind.is_none_or(|k| entry.kind == k)
            && self.operator_id.is_none_or(|o| entry.operator_id == o)
            && self.start_time.is_none_or(|s| entry.created_at >= s)
            && self.end_time.is_none_or(|e| entry.created_at < e)
    }
}

/// Filters for listing funds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundFilter {
    /// Filter by merchant.
    pub merchant_id: Option<MerchantId>,
    /// Filter by fund type.
    pub fund_type: Option<FundType>,
    /// Filter by status.
    pub status: Option<FundStatus>,
    /// Inclusive lower bound on `created_at`.
    pub start_time: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub end_time: Option<DateTime<Utc>>,
}

impl FundFilter {
    /// Returns true if `fund` passes every filter.
    #[must_use]
    pub fn matches(&self, fund: &Fund) -> bool {
        self.merchant_id.is_none_or(|m| fund.merchant_id == m)
            && self.fund_type.is_none_or(|t| fund.fund_type == t)
            && self.status.is_none_or(|s| fund.status == s)
            && self.start_time.is_none_or(|s| fund.created_at >= s)
            && self.end_time.is_none_or(|e| fund.created_at < e)
    }
}

/// Aggregated view over one merchant or a whole tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundSummary {
    /// Merchant the summary covers; `None` for the whole tenant.
    pub merchant_id: Option<MerchantId>,
    /// Sum of deposit entries.
    pub total_deposits: Decimal,
    /// Sum of allocation entries.
    pub total_allocations: Decimal,
    /// Sum of `used_balance`.
    pub total_consumed: Decimal,
    /// Sum of `frozen_balance`.
    pub total_frozen: Decimal,
    /// Sum of `total_balance`.
    pub total_balance: Decimal,
    /// Sum of available balances.
    pub available_balance: Decimal,
    /// Number of merchants with a balance row.
    pub merchant_count: u64,
    /// Number of fund transactions.
    pub transaction_count: u64,
}

impl FundSummary {
    /// Summary with every figure at zero.
    #[must_use]
    pub fn empty(merchant_id: Option<MerchantId>) -> Self {
        Self {
            merchant_id,
            total_deposits: Decimal::ZERO,
            total_allocations: Decimal::ZERO,
            total_consumed: Decimal::ZERO,
            total_frozen: Decimal::ZERO,
            total_balance: Decimal::ZERO,
            available_balance: Decimal::ZERO,
            merchant_count: 0,
            transaction_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn draft() -> FundDraft {
        FundDraft {
            merchant_id: MerchantId::new(7),
            fund_type: FundType::Deposit,
            amount: dec!(1000),
            currency: Currency::Cny,
            description: "top up".to_string(),
            idempotency_key: None,
        }
    }

    #[test]
    fn test_status_transitions() {
        assert!(FundStatus::Pending.can_transition_to(FundStatus::Confirmed));
        assert!(FundStatus::Pending.can_transition_to(FundStatus::Failed));
        assert!(!FundStatus::Confirmed.can_transition_to(FundStatus::Failed));
        assert!(!FundStatus::Failed.can_transition_to(FundStatus::Confirmed));
        assert!(!FundStatus::Pending.can_transition_to(FundStatus::Pending));
    }

    #[test]
    fn test_fund_transition_to() {
        let mut fund = Fund::pending(TenantId::new(1), OperatorId::new(9), &draft());
        assert_eq!(fund.status, FundStatus::Pending);
        fund.transition_to(FundStatus::Confirmed).unwrap();
        assert_eq!(fund.status, FundStatus::Confirmed);

        let err = fund.transition_to(FundStatus::Failed).unwrap_err();
        assert!(matches!(
            err,
            FundError::InvalidStatusTransition {
                from: FundStatus::Confirmed,
                to: FundStatus::Failed
            }
        ));
    }

    #[test]
    fn test_kind_directions() {
        assert_eq!(TransactionKind::Deposit.transaction_type(), TransactionType::Credit);
        assert_eq!(TransactionKind::Unfreeze.transaction_type(), TransactionType::Credit);
        assert_eq!(TransactionKind::Freeze.transaction_type(), TransactionType::Debit);
        assert_eq!(TransactionKind::Consume.transaction_type(), TransactionType::Debit);
        assert!(TransactionKind::Allocation.affects_total());
        assert!(!TransactionKind::Freeze.affects_total());
    }

    #[test]
    fn test_signed_amount() {
        assert_eq!(TransactionType::Credit.signed(dec!(5)), dec!(5));
        assert_eq!(TransactionType::Debit.signed(dec!(5)), dec!(-5));
    }

    #[test]
    fn test_transaction_query_matches() {
        let change = BalanceChange {
            kind: TransactionKind::Deposit,
            amount: dec!(10),
            available_before: dec!(0),
            available_after: dec!(10),
        };
        let entry = FundTransaction::record(
            TenantId::new(1),
            MerchantId::new(7),
            OperatorId::new(3),
            None,
            &change,
            "d",
        );
        assert!(entry.is_consistent());
        assert!(TransactionQuery::default().matches(&entry));

        let by_merchant = TransactionQuery {
            merchant_id: Some(MerchantId::new(8)),
            ..TransactionQuery::default()
        };
        assert!(!by_merchant.matches(&entry));

        let by_kind = TransactionQuery {
            kind: Some(TransactionKind::Deposit),
            operator_id: Some(OperatorId::new(3)),
            ..TransactionQuery::default()
        };
        assert!(by_kind.matches(&entry));

        let ended = TransactionQuery {
            end_time: Some(entry.created_at),
            ..TransactionQuery::default()
        };
        assert!(!ended.matches(&entry));
    }
}
