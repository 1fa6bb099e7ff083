//! `SeaORM` Entity for funds table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{FundStatus, FundType};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "funds")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: i64,
    pub merchant_id: i64,
    pub fund_type: FundType,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub amount: Decimal,
    #[sea_orm(column_type = "Char(Some(3))")]
    pub currency: String,
    pub status: FundStatus,
    pub description: String,
    pub operator_id: i64,
    pub idempotency_key: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::fund_transactions::Entity")]
    FundTransactions,
}

impl Related<super::fund_transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FundTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
