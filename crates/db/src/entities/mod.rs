//! `SeaORM` entities for the fund ledger tables.

pub mod prelude;

pub mod fund_transactions;
pub mod funds;
pub mod merchant_rights_balances;
pub mod sea_orm_active_enums;
