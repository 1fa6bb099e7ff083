//! Fund repository: the Postgres implementation of the ledger store.
//!
//! Every query runs inside an [`RlsConnection`], so the tenant policies apply
//! on top of the explicit `tenant_id` predicates below. Balance rows are
//! locked with `SELECT ... FOR UPDATE` and written back with a version
//! compare-and-swap.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use rights_core::fund::{
    BalanceStore, Fund, FundError, FundFilter, FundStatus, FundSummary, FundTransaction, FundType,
    RightsBalance, TransactionKind, TransactionQuery, TransactionType, UnitOfWork,
};
use rights_shared::types::{FundId, FundTransactionId, MerchantId, OperatorId, PageRequest, TenantId};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::sqlx;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, FromQueryResult, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, RuntimeErr, Set, SqlErr,
};
use tracing::{debug, warn};

use crate::entities::{
    fund_transactions, funds, merchant_rights_balances, sea_orm_active_enums as db_enums,
};
use crate::rls::RlsConnection;

/// Postgres `SQLSTATE` for `serialization_failure`.
const SERIALIZATION_FAILURE: &str = "40001";
/// Postgres `SQLSTATE` for `deadlock_detected`.
const DEADLOCK_DETECTED: &str = "40P01";

/// Repository for funds, fund transactions and merchant rights balances.
#[derive(Debug, Clone)]
pub struct FundRepository {
    db: DatabaseConnection,
}

impl FundRepository {
    /// Creates a new fund repository.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn scoped(&self, tenant_id: TenantId) -> Result<RlsConnection, FundError> {
        RlsConnection::new(&self.db, tenant_id)
            .await
            .map_err(|e| map_db_err(e, None))
    }
}

/// A tenant-scoped database transaction over the ledger tables.
///
/// Dropping it without `commit` rolls the transaction back.
pub struct FundUnitOfWork {
    rls: RlsConnection,
    merchant_id: Option<MerchantId>,
}

impl FundUnitOfWork {
    fn ensure_tenant(&self, found: TenantId) -> Result<(), FundError> {
        let expected = self.rls.tenant_id();
        if found == expected {
            Ok(())
        } else {
            Err(FundError::CrossTenantAccess { expected, found })
        }
    }

    fn err(&self, merchant_id: Option<MerchantId>) -> impl Fn(DbErr) -> FundError + use<> {
        let merchant_id = merchant_id.or(self.merchant_id);
        move |e| map_db_err(e, merchant_id)
    }
}

#[async_trait]
impl UnitOfWork for FundUnitOfWork {
    fn tenant_id(&self) -> TenantId {
        self.rls.tenant_id()
    }

    async fn lock_merchant_balance(&mut self, merchant_id: MerchantId) -> Result<RightsBalance, FundError> {
        let tenant = self.tenant_id().into_inner();
        let map_err = self.err(Some(merchant_id));
        let txn = self.rls.transaction();

        // First operation for a merchant creates its zero row.
        merchant_rights_balances::Entity::insert(merchant_rights_balances::ActiveModel {
            tenant_id: Set(tenant),
            merchant_id: Set(merchant_id.into_inner()),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([
                merchant_rights_balances::Column::TenantId,
                merchant_rights_balances::Column::MerchantId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(txn)
        .await
        .map_err(&map_err)?;

        let row = merchant_rights_balances::Entity::find_by_id((tenant, merchant_id.into_inner()))
            .lock_exclusive()
            .one(txn)
            .await
            .map_err(&map_err)?
            .ok_or_else(|| {
                FundError::Persistence(format!("balance row for merchant {merchant_id} is not visible"))
            })?;

        self.merchant_id = Some(merchant_id);
        let balance = balance_from_model(row);
        balance.check_invariants()?;
        Ok(balance)
    }

    async fn update_merchant_balance(&mut self, balance: &RightsBalance) -> Result<RightsBalance, FundError> {
        self.ensure_tenant(balance.tenant_id)?;
        balance.check_invariants()?;

        let now = Utc::now();
        let result = merchant_rights_balances::Entity::update_many()
            .set(merchant_rights_balances::ActiveModel {
                total_balance: Set(balance.total_balance),
                used_balance: Set(balance.used_balance),
                frozen_balance: Set(balance.frozen_balance),
                version: Set(balance.version + 1),
                updated_at: Set(now.fixed_offset()),
                ..Default::default()
            })
            .filter(merchant_rights_balances::Column::TenantId.eq(balance.tenant_id.into_inner()))
            .filter(merchant_rights_balances::Column::MerchantId.eq(balance.merchant_id.into_inner()))
            .filter(merchant_rights_balances::Column::Version.eq(balance.version))
            .exec(self.rls.transaction())
            .await
            .map_err(self.err(Some(balance.merchant_id)))?;

        if result.rows_affected == 0 {
            warn!(
                merchant_id = %balance.merchant_id,
                version = balance.version,
                "balance version moved underneath the lock"
            );
            return Err(FundError::ConcurrencyConflict {
                merchant_id: balance.merchant_id,
            });
        }

        Ok(RightsBalance {
            version: balance.version + 1,
            updated_at: now,
            ..balance.clone()
        })
    }

    async fn find_fund_by_idempotency_key(&mut self, key: &str) -> Result<Option<Fund>, FundError> {
        funds::Entity::find()
            .filter(funds::Column::TenantId.eq(self.tenant_id().into_inner()))
            .filter(funds::Column::IdempotencyKey.eq(key))
            .one(self.rls.transaction())
            .await
            .map_err(self.err(None))?
            .map(fund_from_model)
            .transpose()
    }

    async fn create_fund(&mut self, fund: &Fund) -> Result<(), FundError> {
        self.ensure_tenant(fund.tenant_id)?;
        funds::Entity::insert(fund_active_model(fund))
            .exec_without_returning(self.rls.transaction())
            .await
            .map_err(self.err(Some(fund.merchant_id)))?;
        debug!(fund_id = %fund.id, merchant_id = %fund.merchant_id, "fund inserted");
        Ok(())
    }

    async fn update_fund_status(&mut self, fund: &Fund) -> Result<(), FundError> {
        self.ensure_tenant(fund.tenant_id)?;
        let result = funds::Entity::update_many()
            .set(funds::ActiveModel {
                status: Set(fund.status.into()),
                updated_at: Set(fund.updated_at.fixed_offset()),
                ..Default::default()
            })
            .filter(funds::Column::Id.eq(fund.id.into_inner()))
            .filter(funds::Column::TenantId.eq(fund.tenant_id.into_inner()))
            .filter(funds::Column::Status.eq(db_enums::FundStatus::Pending))
            .exec(self.rls.transaction())
            .await
            .map_err(self.err(Some(fund.merchant_id)))?;

        if result.rows_affected == 0 {
            return Err(FundError::NotFound(format!("pending fund {}", fund.id)));
        }
        Ok(())
    }

    async fn create_fund_transaction(&mut self, entry: &FundTransaction) -> Result<(), FundError> {
        self.ensure_tenant(entry.tenant_id)?;
        fund_transactions::Entity::insert(entry_active_model(entry))
            .exec_without_returning(self.rls.transaction())
            .await
            .map_err(self.err(Some(entry.merchant_id)))?;
        Ok(())
    }

    async fn commit(self) -> Result<(), FundError> {
        let merchant_id = self.merchant_id;
        self.rls.commit().await.map_err(|e| map_db_err(e, merchant_id))
    }

    async fn rollback(self) -> Result<(), FundError> {
        self.rls.rollback().await.map_err(|e| map_db_err(e, None))
    }
}

#[derive(Debug, FromQueryResult)]
struct BalanceTotals {
    total_balance: Option<Decimal>,
    used_balance: Option<Decimal>,
    frozen_balance: Option<Decimal>,
    merchant_count: i64,
}

#[derive(Debug, FromQueryResult)]
struct KindTotals {
    kind: db_enums::FundTransactionKind,
    amount: Option<Decimal>,
    entries: i64,
}

#[async_trait]
impl BalanceStore for FundRepository {
    type Uow = FundUnitOfWork;

    async fn begin(&self, tenant_id: TenantId) -> Result<Self::Uow, FundError> {
        Ok(FundUnitOfWork {
            rls: self.scoped(tenant_id).await?,
            merchant_id: None,
        })
    }

    async fn get_merchant_balance(
        &self,
        tenant_id: TenantId,
        merchant_id: MerchantId,
    ) -> Result<Option<RightsBalance>, FundError> {
        let rls = self.scoped(tenant_id).await?;
        let row = merchant_rights_balances::Entity::find_by_id((
            tenant_id.into_inner(),
            merchant_id.into_inner(),
        ))
        .one(rls.transaction())
        .await
        .map_err(|e| map_db_err(e, None))?;
        rls.commit().await.map_err(|e| map_db_err(e, None))?;
        Ok(row.map(balance_from_model))
    }

    async fn find_fund(&self, tenant_id: TenantId, fund_id: FundId) -> Result<Option<Fund>, FundError> {
        let rls = self.scoped(tenant_id).await?;
        let row = funds::Entity::find_by_id(fund_id.into_inner())
            .filter(funds::Column::TenantId.eq(tenant_id.into_inner()))
            .one(rls.transaction())
            .await
            .map_err(|e| map_db_err(e, None))?;
        rls.commit().await.map_err(|e| map_db_err(e, None))?;
        row.map(fund_from_model).transpose()
    }

    async fn find_page_with_filter(
        &self,
        tenant_id: TenantId,
        filter: &FundFilter,
        page: &PageRequest,
    ) -> Result<(Vec<Fund>, u64), FundError> {
        let mut query = funds::Entity::find().filter(funds::Column::TenantId.eq(tenant_id.into_inner()));
        if let Some(merchant_id) = filter.merchant_id {
            query = query.filter(funds::Column::MerchantId.eq(merchant_id.into_inner()));
        }
        if let Some(fund_type) = filter.fund_type {
            query = query.filter(funds::Column::FundType.eq(db_enums::FundType::from(fund_type)));
        }
        if let Some(status) = filter.status {
            query = query.filter(funds::Column::Status.eq(db_enums::FundStatus::from(status)));
        }
        if let Some(start) = filter.start_time {
            query = query.filter(funds::Column::CreatedAt.gte(start));
        }
        if let Some(end) = filter.end_time {
            query = query.filter(funds::Column::CreatedAt.lt(end));
        }

        let rls = self.scoped(tenant_id).await?;
        let paginator = query
            .order_by_desc(funds::Column::CreatedAt)
            .order_by_desc(funds::Column::Id)
            .paginate(rls.transaction(), page.limit());
        let total = paginator.num_items().await.map_err(|e| map_db_err(e, None))?;
        let rows = paginator
            .fetch_page(u64::from(page.page.saturating_sub(1)))
            .await
            .map_err(|e| map_db_err(e, None))?;
        rls.commit().await.map_err(|e| map_db_err(e, None))?;

        let funds = rows.into_iter().map(fund_from_model).collect::<Result<Vec<_>, _>>()?;
        Ok((funds, total))
    }

    async fn list_fund_transactions(
        &self,
        tenant_id: TenantId,
        query: &TransactionQuery,
    ) -> Result<(Vec<FundTransaction>, u64), FundError> {
        let mut select = fund_transactions::Entity::find()
            .filter(fund_transactions::Column::TenantId.eq(tenant_id.into_inner()));
        if let Some(merchant_id) = query.merchant_id {
            select = select.filter(fund_transactions::Column::MerchantId.eq(merchant_id.into_inner()));
        }
        if let Some(fund_id) = query.fund_id {
            select = select.filter(fund_transactions::Column::FundId.eq(fund_id.into_inner()));
        }
        if let Some(transaction_type) = query.transaction_type {
            select = select.filter(
                fund_transactions::Column::TransactionType
                    .eq(db_enums::FundTransactionType::from(transaction_type)),
            );
        }
        if let Some(kind) = query.kind {
            select = select.filter(fund_transactions::Column::Kind.eq(db_enums::FundTransactionKind::from(kind)));
        }
        if let Some(operator_id) = query.operator_id {
            select = select.filter(fund_transactions::Column::OperatorId.eq(operator_id.into_inner()));
        }
        if let Some(start) = query.start_time {
            select = select.filter(fund_transactions::Column::CreatedAt.gte(start));
        }
        if let Some(end) = query.end_time {
            select = select.filter(fund_transactions::Column::CreatedAt.lt(end));
        }

        let rls = self.scoped(tenant_id).await?;
        let paginator = select
            .order_by_desc(fund_transactions::Column::CreatedAt)
            .order_by_desc(fund_transactions::Column::Id)
            .paginate(rls.transaction(), query.page.limit());
        let total = paginator.num_items().await.map_err(|e| map_db_err(e, None))?;
        let rows = paginator
            .fetch_page(u64::from(query.page.page.saturating_sub(1)))
            .await
            .map_err(|e| map_db_err(e, None))?;
        rls.commit().await.map_err(|e| map_db_err(e, None))?;

        Ok((rows.into_iter().map(entry_from_model).collect(), total))
    }

    async fn summarize(
        &self,
        tenant_id: TenantId,
        merchant_id: Option<MerchantId>,
    ) -> Result<FundSummary, FundError> {
        let mut balances = merchant_rights_balances::Entity::find()
            .select_only()
            .column_as(Expr::col(merchant_rights_balances::Column::TotalBalance).sum(), "total_balance")
            .column_as(Expr::col(merchant_rights_balances::Column::UsedBalance).sum(), "used_balance")
            .column_as(Expr::col(merchant_rights_balances::Column::FrozenBalance).sum(), "frozen_balance")
            .column_as(Expr::col(merchant_rights_balances::Column::MerchantId).count(), "merchant_count")
            .filter(merchant_rights_balances::Column::TenantId.eq(tenant_id.into_inner()));
        let mut entries = fund_transactions::Entity::find()
            .select_only()
            .column(fund_transactions::Column::Kind)
            .column_as(Expr::col(fund_transactions::Column::Amount).sum(), "amount")
            .column_as(Expr::col(fund_transactions::Column::Id).count(), "entries")
            .filter(fund_transactions::Column::TenantId.eq(tenant_id.into_inner()))
            .group_by(fund_transactions::Column::Kind);
        if let Some(merchant_id) = merchant_id {
            balances = balances.filter(merchant_rights_balances::Column::MerchantId.eq(merchant_id.into_inner()));
            entries = entries.filter(fund_transactions::Column::MerchantId.eq(merchant_id.into_inner()));
        }

        let rls = self.scoped(tenant_id).await?;
        let totals = balances
            .into_model::<BalanceTotals>()
            .one(rls.transaction())
            .await
            .map_err(|e| map_db_err(e, None))?;
        let by_kind = entries
            .into_model::<KindTotals>()
            .all(rls.transaction())
            .await
            .map_err(|e| map_db_err(e, None))?;
        rls.commit().await.map_err(|e| map_db_err(e, None))?;

        let mut summary = FundSummary::empty(merchant_id);
        if let Some(totals) = totals {
            summary.total_balance = totals.total_balance.unwrap_or_default();
            summary.total_consumed = totals.used_balance.unwrap_or_default();
            summary.total_frozen = totals.frozen_balance.unwrap_or_default();
            summary.available_balance = summary.total_balance - summary.total_consumed - summary.total_frozen;
            summary.merchant_count = u64::try_from(totals.merchant_count).unwrap_or_default();
        }
        for row in by_kind {
            let amount = row.amount.unwrap_or_default();
            match TransactionKind::from(row.kind) {
                TransactionKind::Deposit => summary.total_deposits = amount,
                TransactionKind::Allocation => summary.total_allocations = amount,
                TransactionKind::Freeze | TransactionKind::Unfreeze | TransactionKind::Consume => {}
            }
            summary.transaction_count += u64::try_from(row.entries).unwrap_or_default();
        }
        Ok(summary)
    }
}

/// Maps a database error onto the ledger taxonomy.
///
/// Unique violations, deadlocks and serialization failures are retryable
/// conflicts when the merchant is known; everything else is a persistence
/// failure.
fn map_db_err(err: DbErr, merchant_id: Option<MerchantId>) -> FundError {
    let conflict = matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        || sqlstate(&err).is_some_and(|code| code == SERIALIZATION_FAILURE || code == DEADLOCK_DETECTED);
    match merchant_id {
        Some(merchant_id) if conflict => {
            debug!(%merchant_id, error = %err, "database conflict");
            FundError::ConcurrencyConflict { merchant_id }
        }
        _ => FundError::Persistence(err.to_string()),
    }
}

fn sqlstate(err: &DbErr) -> Option<String> {
    match err {
        DbErr::Exec(RuntimeErr::SqlxError(sqlx::Error::Database(e)))
        | DbErr::Query(RuntimeErr::SqlxError(sqlx::Error::Database(e))) => {
            e.code().map(|code| code.into_owned())
        }
        _ => None,
    }
}

fn utc(at: DateTime<FixedOffset>) -> DateTime<Utc> {
    at.with_timezone(&Utc)
}

fn balance_from_model(model: merchant_rights_balances::Model) -> RightsBalance {
    RightsBalance {
        tenant_id: TenantId::new(model.tenant_id),
        merchant_id: MerchantId::new(model.merchant_id),
        total_balance: model.total_balance,
        used_balance: model.used_balance,
        frozen_balance: model.frozen_balance,
        version: model.version,
        updated_at: utc(model.updated_at),
    }
}

fn fund_from_model(model: funds::Model) -> Result<Fund, FundError> {
    let currency = model
        .currency
        .trim()
        .parse()
        .map_err(|e: String| FundError::Persistence(format!("fund {}: {e}", model.id)))?;
    Ok(Fund {
        id: FundId::from_uuid(model.id),
        tenant_id: TenantId::new(model.tenant_id),
        merchant_id: MerchantId::new(model.merchant_id),
        fund_type: model.fund_type.into(),
        amount: model.amount,
        currency,
        status: model.status.into(),
        description: model.description,
        operator_id: OperatorId::new(model.operator_id),
        idempotency_key: model.idempotency_key,
        created_at: utc(model.created_at),
        updated_at: utc(model.updated_at),
    })
}

fn fund_active_model(fund: &Fund) -> funds::ActiveModel {
    funds::ActiveModel {
        id: Set(fund.id.into_inner()),
        tenant_id: Set(fund.tenant_id.into_inner()),
        merchant_id: Set(fund.merchant_id.into_inner()),
        fund_type: Set(fund.fund_type.into()),
        amount: Set(fund.amount),
        currency: Set(fund.currency.code().to_string()),
        status: Set(fund.status.into()),
        description: Set(fund.description.clone()),
        operator_id: Set(fund.operator_id.into_inner()),
        idempotency_key: Set(fund.idempotency_key.clone()),
        created_at: Set(fund.created_at.fixed_offset()),
        updated_at: Set(fund.updated_at.fixed_offset()),
    }
}

fn entry_from_model(model: fund_transactions::Model) -> FundTransaction {
    FundTransaction {
        id: FundTransactionId::from_uuid(model.id),
        tenant_id: TenantId::new(model.tenant_id),
        merchant_id: MerchantId::new(model.merchant_id),
        fund_id: model.fund_id.map(FundId::from_uuid),
        transaction_type: model.transaction_type.into(),
        kind: model.kind.into(),
        amount: model.amount,
        balance_before: model.balance_before,
        balance_after: model.balance_after,
        operator_id: OperatorId::new(model.operator_id),
        description: model.description,
        created_at: utc(model.created_at),
    }
}

fn entry_active_model(entry: &FundTransaction) -> fund_transactions::ActiveModel {
    fund_transactions::ActiveModel {
        id: Set(entry.id.into_inner()),
        tenant_id: Set(entry.tenant_id.into_inner()),
        merchant_id: Set(entry.merchant_id.into_inner()),
        fund_id: Set(entry.fund_id.map(FundId::into_inner)),
        transaction_type: Set(entry.transaction_type.into()),
        kind: Set(entry.kind.into()),
        amount: Set(entry.amount),
        balance_before: Set(entry.balance_before),
        balance_after: Set(entry.balance_after),
        operator_id: Set(entry.operator_id.into_inner()),
        description: Set(entry.description.clone()),
        created_at: Set(entry.created_at.fixed_offset()),
    }
}

// ========== Enum Conversions ==========

impl From<FundType> for db_enums::FundType {
    fn from(value: FundType) -> Self {
        match value {
            FundType::Deposit => Self::Deposit,
            FundType::Allocation => Self::Allocation,
        }
    }
}

impl From<db_enums::FundType> for FundType {
    fn from(value: db_enums::FundType) -> Self {
        match value {
            db_enums::FundType::Deposit => Self::Deposit,
            db_enums::FundType::Allocation => Self::Allocation,
        }
    }
}

impl From<FundStatus> for db_enums::FundStatus {
    fn from(value: FundStatus) -> Self {
        match value {
            FundStatus::Pending => Self::Pending,
            FundStatus::Confirmed => Self::Confirmed,
            FundStatus::Failed => Self::Failed,
        }
    }
}

impl From<db_enums::FundStatus> for FundStatus {
    fn from(value: db_enums::FundStatus) -> Self {
        match value {
            db_enums::FundStatus::Pending => Self::Pending,
            db_enums::FundStatus::Confirmed => Self::Confirmed,
            db_enums::FundStatus::Failed => Self::Failed,
        }
    }
}

impl From<TransactionType> for db_enums::FundTransactionType {
    fn from(value: TransactionType) -> Self {
        match value {
            TransactionType::Credit => Self::Credit,
            TransactionType::Debit => Self::Debit,
        }
    }
}

impl From<db_enums::FundTransactionType> for TransactionType {
    fn from(value: db_enums::FundTransactionType) -> Self {
        match value {
            db_enums::FundTransactionType::Credit => Self::Credit,
            db_enums::FundTransactionType::Debit => Self::Debit,
        }
    }
}

impl From<TransactionKind> for db_enums::FundTransactionKind {
    fn from(value: TransactionKind) -> Self {
        match value {
            TransactionKind::Deposit => Self::Deposit,
            TransactionKind::Allocation => Self::Allocation,
            TransactionKind::Freeze => Self::Freeze,
            TransactionKind::Unfreeze => Self::Unfreeze,
            TransactionKind::Consume => Self::Consume,
        }
    }
}

impl From<db_enums::FundTransactionKind> for TransactionKind {
    fn from(value: db_enums::FundTransactionKind) -> Self {
        match value {
            db_enums::FundTransactionKind::Deposit => Self::Deposit,
            db_enums::FundTransactionKind::Allocation => Self::Allocation,
            db_enums::FundTransactionKind::Freeze => Self::Freeze,
            db_enums::FundTransactionKind::Unfreeze => Self::Unfreeze,
            db_enums::FundTransactionKind::Consume => Self::Consume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_non_conflict_errors_are_persistence() {
        let err = map_db_err(DbErr::Custom("boom".into()), Some(MerchantId::new(7)));
        assert!(matches!(err, FundError::Persistence(_)));

        let err = map_db_err(DbErr::RecordNotFound("x".into()), None);
        assert_eq!(err.error_code(), "PERSISTENCE_ERROR");
    }

    #[test]
    fn test_kind_conversion_round_trips() {
        for kind in [
            TransactionKind::Deposit,
            TransactionKind::Allocation,
            TransactionKind::Freeze,
            TransactionKind::Unfreeze,
            TransactionKind::Consume,
        ] {
            assert_eq!(TransactionKind::from(db_enums::FundTransactionKind::from(kind)), kind);
        }
    }

    #[test]
    fn test_fund_model_with_unknown_currency_is_persistence_error() {
        let now = Utc::now().fixed_offset();
        let model = funds::Model {
            id: uuid::Uuid::now_v7(),
            tenant_id: 1,
            merchant_id: 7,
            fund_type: db_enums::FundType::Deposit,
            amount: dec!(10),
            currency: "XXX".into(),
            status: db_enums::FundStatus::Confirmed,
            description: String::new(),
            operator_id: 3,
            idempotency_key: None,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(fund_from_model(model.clone()), Err(FundError::Persistence(_))));

        let fund = fund_from_model(funds::Model {
            currency: "CNY".into(),
            ..model
        })
        .unwrap();
        assert_eq!(fund.merchant_id, MerchantId::new(7));
        assert_eq!(fund.status, FundStatus::Confirmed);
    }
}
