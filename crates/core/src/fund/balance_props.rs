//! Property tests for balance mutations.

use super::balance::RightsBalance;
use super::types::TransactionKind;
use rights_shared::types::{MerchantId, TenantId};
use rust_decimal::Decimal;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Deposit(Decimal),
    Freeze(Decimal),
    Unfreeze(Decimal),
    Consume(Decimal),
}

fn amount() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        amount().prop_map(Op::Deposit),
        amount().prop_map(Op::Freeze),
        amount().prop_map(Op::Unfreeze),
        amount().prop_map(Op::Consume),
    ]
}

proptest! {
    /// Any sequence of operations, accepted or rejected, keeps the
    /// invariants and the entry trail in step with the balance.
    #[test]
    fn prop_invariants_hold(ops in prop::collection::vec(op(), 1..60)) {
        let mut b = RightsBalance::zero(TenantId::new(1), MerchantId::new(1));
        let mut signed_sum = Decimal::ZERO;
        let mut total_sum = Decimal::ZERO;

        for op in ops {
            let result = match op {
                Op::Deposit(a) => b.credit(TransactionKind::Deposit, a),
                Op::Freeze(a) => b.freeze(a),
                Op::Unfreeze(a) => b.unfreeze(a),
                Op::Consume(a) => b.consume(a),
            };
            if let Ok(change) = result {
                let signed = change.kind.transaction_type().signed(change.amount);
                prop_assert_eq!(change.available_after - change.available_before, signed);
                signed_sum += signed;
                if change.kind.affects_total() {
                    total_sum += signed;
                }
            }
            prop_assert!(b.check_invariants().is_ok());
            prop_assert!(b.available_balance() >= Decimal::ZERO);
        }

        prop_assert_eq!(signed_sum, b.available_balance());
        prop_assert_eq!(total_sum, b.total_balance);
    }

    /// Freeze followed by unfreeze of the same amount restores the balance.
    #[test]
    fn prop_freeze_unfreeze_round_trip(deposit in amount(), hold in amount()) {
        let mut b = RightsBalance::zero(TenantId::new(1), MerchantId::new(1));
        b.credit(TransactionKind::Deposit, deposit).unwrap();
        let before = b.clone();

        if b.freeze(hold).is_ok() {
            b.unfreeze(hold).unwrap();
        }
        prop_assert_eq!(b.frozen_balance, before.frozen_balance);
        prop_assert_eq!(b.available_balance(), before.available_balance());
    }
}
