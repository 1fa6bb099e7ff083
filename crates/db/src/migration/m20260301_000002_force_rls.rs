//! Migration to enable FORCE ROW LEVEL SECURITY on the ledger tables.
//!
//! Tenant policies then also apply to the table owner, which is the role the
//! service usually connects as.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(FORCE_RLS_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DISABLE_FORCE_RLS_SQL).await?;
        Ok(())
    }
}

const FORCE_RLS_SQL: &str = r"
ALTER TABLE merchant_rights_balances FORCE ROW LEVEL SECURITY;
ALTER TABLE funds FORCE ROW LEVEL SECURITY;
ALTER TABLE fund_transactions FORCE ROW LEVEL SECURITY;
";

const DISABLE_FORCE_RLS_SQL: &str = r"
ALTER TABLE merchant_rights_balances NO FORCE ROW LEVEL SECURITY;
ALTER TABLE funds NO FORCE ROW LEVEL SECURITY;
ALTER TABLE fund_transactions NO FORCE ROW LEVEL SECURITY;
";
