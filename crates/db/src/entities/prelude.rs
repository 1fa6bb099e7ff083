//! Entity re-exports.

pub use super::fund_transactions::Entity as FundTransactions;
pub use super::funds::Entity as Funds;
pub use super::merchant_rights_balances::Entity as MerchantRightsBalances;
