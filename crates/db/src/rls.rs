//! Row-Level Security (RLS) context management.
//!
//! Every ledger query runs inside a transaction that has
//! `app.current_tenant_id` set, so the `tenant_isolation` policies filter
//! rows even if a query forgets its own tenant predicate.
//!
//! # Usage
//!
//! ```ignore
//! use rights_db::rls::RlsConnection;
//!
//! let rls = RlsConnection::new(&db, tenant_id).await?;
//! let funds = Funds::find().all(rls.transaction()).await?;
//! rls.commit().await?;
//! ```

use rights_shared::types::TenantId;
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};

/// A database transaction with the tenant RLS context set.
///
/// Dropping it without calling `commit` rolls the transaction back.
pub struct RlsConnection {
    txn: DatabaseTransaction,
    tenant_id: TenantId,
}

impl RlsConnection {
    /// Begins a transaction and sets `app.current_tenant_id` with `SET LOCAL`,
    /// which scopes the setting to this transaction only.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started or the RLS
    /// context cannot be set.
    pub async fn new(db: &DatabaseConnection, tenant_id: TenantId) -> Result<Self, DbErr> {
        let txn = db.begin().await?;
        set_rls_context(&txn, tenant_id).await?;
        Ok(Self { txn, tenant_id })
    }

    /// Tenant the context was set to.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the underlying transaction for executing queries.
    #[must_use]
    pub fn transaction(&self) -> &DatabaseTransaction {
        &self.txn
    }

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub async fn commit(self) -> Result<(), DbErr> {
        self.txn.commit().await
    }

    /// Rolls back the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback fails.
    pub async fn rollback(self) -> Result<(), DbErr> {
        self.txn.rollback().await
    }
}

/// Sets the RLS context on an existing transaction.
///
/// # Errors
///
/// Returns an error if the RLS context cannot be set.
pub async fn set_rls_context(txn: &DatabaseTransaction, tenant_id: TenantId) -> Result<(), DbErr> {
    txn.execute_unprepared(&rls_context_sql(tenant_id)).await?;
    Ok(())
}

// `SET` takes no bind parameters; the id is an integer so formatting is safe.
fn rls_context_sql(tenant_id: TenantId) -> String {
    format!("SET LOCAL app.current_tenant_id = '{}'", tenant_id.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rls_sql_format() {
        assert_eq!(
            rls_context_sql(TenantId::new(42)),
            "SET LOCAL app.current_tenant_id = '42'"
        );
    }
}
