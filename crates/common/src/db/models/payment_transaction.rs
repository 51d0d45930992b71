//! Payment transaction entity

use chrono::Utc;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub paper_id: i64,

    pub user_id: i64,

    /// Gateway purchase id
    #[sea_orm(column_type = "Text", unique)]
    pub session_id: String,

    #[sea_orm(column_type = "Text")]
    pub reference: String,

    pub amount: i64,

    #[sea_orm(column_type = "Text")]
    pub currency: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text")]
    pub payment_method: String,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub payload: Option<serde_json::Value>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::paper::Entity",
        from = "Column::PaperId",
        to = "super::paper::Column::Id"
    )]
    Paper,
}

impl Related<super::paper::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Paper.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for domain::PaymentTransaction {
    fn from(row: Model) -> Self {
        Self {
            id: row.id,
            paper_id: row.paper_id,
            user_id: row.user_id,
            session_id: row.session_id,
            reference: row.reference,
            amount: row.amount,
            currency: row.currency,
            status: row.status,
            payment_method: row.payment_method,
            payload: row.payload,
            created_at: row.created_at.with_timezone(&Utc),
            updated_at: row.updated_at.with_timezone(&Utc),
        }
    }
}
