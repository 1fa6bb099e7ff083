//! Merchant rights balance and its mutation rules.
//!
//! Every mutation checks its precondition first and leaves the balance
//! untouched on failure, so a rejected operation never needs compensation.

use chrono::{DateTime, Utc};
use rights_shared::types::{MerchantId, TenantId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::FundError;
use super::types::TransactionKind;

/// Rights balance of one merchant within one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RightsBalance {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Merchant.
    pub merchant_id: MerchantId,
    /// Everything ever deposited or allocated.
    pub total_balance: Decimal,
    /// Rights consumed by orders.
    pub used_balance: Decimal,
    /// Rights on hold.
    pub frozen_balance: Decimal,
    /// Bumped by the store on every update.
    pub version: i64,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Effect of one applied mutation, in available-balance terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    /// Operation applied.
    pub kind: TransactionKind,
    /// Unsigned amount.
    pub amount: Decimal,
    /// Available balance before.
    pub available_before: Decimal,
    /// Available balance after.
    pub available_after: Decimal,
}

impl RightsBalance {
    /// A zeroed balance, as created lazily on a merchant's first operation.
    #[must_use]
    pub fn zero(tenant_id: TenantId, merchant_id: MerchantId) -> Self {
        Self {
            tenant_id,
            merchant_id,
            total_balance: Decimal::ZERO,
            used_balance: Decimal::ZERO,
            frozen_balance: Decimal::ZERO,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    /// `total - used - frozen`.
    #[must_use]
    pub fn available_balance(&self) -> Decimal {
        self.total_balance - self.used_balance - self.frozen_balance
    }

    /// Checks the invariants every committed balance must satisfy.
    pub fn check_invariants(&self) -> Result<(), FundError> {
        if [self.total_balance, self.used_balance, self.frozen_balance]
            .iter()
            .any(|component| *component < Decimal::ZERO)
        {
            return Err(FundError::Persistence(format!(
                "negative balance component for merchant {}",
                self.merchant_id
            )));
        }
        if self.frozen_balance > self.total_balance - self.used_balance {
            return Err(FundError::Persistence(format!(
                "frozen balance exceeds unused balance for merchant {}",
                self.merchant_id
            )));
        }
        Ok(())
    }

    /// Credits the total balance (deposit or allocation).
    pub fn credit(&mut self, kind: TransactionKind, amount: Decimal) -> Result<BalanceChange, FundError> {
        debug_assert!(kind.affects_total());
        let total = self
            .total_balance
            .checked_add(amount)
            .ok_or_else(|| self.overflow())?;
        let before = self.available_balance();
        self.total_balance = total;
        Ok(self.change(kind, amount, before))
    }

    /// Moves `amount` from available to frozen.
    pub fn freeze(&mut self, amount: Decimal) -> Result<BalanceChange, FundError> {
        let before = self.available_balance();
        if before < amount {
            return Err(FundError::insufficient_balance(self.merchant_id, before, amount));
        }
        self.frozen_balance += amount;
        Ok(self.change(TransactionKind::Freeze, amount, before))
    }

    /// Moves `amount` from frozen back to available.
    pub fn unfreeze(&mut self, amount: Decimal) -> Result<BalanceChange, FundError> {
        if self.frozen_balance < amount {
            return Err(FundError::insufficient_frozen(
                self.merchant_id,
                self.frozen_balance,
                amount,
            ));
        }
        let before = self.available_balance();
        self.frozen_balance -= amount;
        Ok(self.change(TransactionKind::Unfreeze, amount, before))
    }

    /// Moves `amount` from available to used.
    pub fn consume(&mut self, amount: Decimal) -> Result<BalanceChange, FundError> {
        let before = self.available_balance();
        if before < amount {
            return Err(FundError::insufficient_balance(self.merchant_id, before, amount));
        }
        self.used_balance += amount;
        Ok(self.change(TransactionKind::Consume, amount, before))
    }

    fn change(&self, kind: TransactionKind, amount: Decimal, before: Decimal) -> BalanceChange {
        BalanceChange {
            kind,
            amount,
            available_before: before,
            available_after: self.available_balance(),
        }
    }

    fn overflow(&self) -> FundError {
        FundError::Validation(format!(
            "balance overflow for merchant {}",
            self.merchant_id
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn balance() -> RightsBalance {
        RightsBalance::zero(TenantId::new(1), MerchantId::new(7))
    }

    #[test]
    fn test_zero_balance() {
        let b = balance();
        assert_eq!(b.available_balance(), Decimal::ZERO);
        assert_eq!(b.version, 0);
        assert!(b.check_invariants().is_ok());
    }

    #[test]
    fn test_freeze_scenario() {
        let mut b = balance();

        let change = b.credit(TransactionKind::Deposit, dec!(1000)).unwrap();
        assert_eq!(change.available_before, dec!(0));
        assert_eq!(change.available_after, dec!(1000));

        let change = b.freeze(dec!(400)).unwrap();
        assert_eq!(b.frozen_balance, dec!(400));
        assert_eq!(b.available_balance(), dec!(600));
        assert_eq!(change.available_after - change.available_before, dec!(-400));

        let err = b.freeze(dec!(700)).unwrap_err();
        assert!(matches!(
            err,
            FundError::InsufficientBalance { available, requested, shortfall, .. }
                if available == dec!(600) && requested == dec!(700) && shortfall == dec!(100)
        ));
        // Rejected freeze leaves the balance untouched.
        assert_eq!(b.frozen_balance, dec!(400));

        b.unfreeze(dec!(400)).unwrap();
        assert_eq!(b.frozen_balance, dec!(0));
        assert_eq!(b.available_balance(), dec!(1000));
    }

    #[test]
    fn test_unfreeze_more_than_frozen() {
        let mut b = balance();
        b.credit(TransactionKind::Allocation, dec!(50)).unwrap();
        b.freeze(dec!(10)).unwrap();

        let err = b.unfreeze(dec!(11)).unwrap_err();
        assert_eq!(err.error_code(), "INSUFFICIENT_FROZEN_BALANCE");
        assert_eq!(b.frozen_balance, dec!(10));
    }

    #[test]
    fn test_consume() {
        let mut b = balance();
        b.credit(TransactionKind::Deposit, dec!(100)).unwrap();
        b.freeze(dec!(30)).unwrap();

        let change = b.consume(dec!(70)).unwrap();
        assert_eq!(change.available_after, dec!(0));
        assert_eq!(b.used_balance, dec!(70));
        assert!(b.check_invariants().is_ok());

        assert!(b.consume(dec!(0.01)).is_err());
    }

    #[test]
    fn test_check_invariants_rejects_overfrozen() {
        let mut b = balance();
        b.total_balance = dec!(10);
        b.used_balance = dec!(5);
        b.frozen_balance = dec!(6);
        assert!(b.check_invariants().is_err());
    }

    #[test]
    fn test_credit_overflow() {
        let mut b = balance();
        b.total_balance = Decimal::MAX;
        assert!(b.credit(TransactionKind::Deposit, dec!(1)).is_err());
        assert_eq!(b.total_balance, Decimal::MAX);
    }
}
