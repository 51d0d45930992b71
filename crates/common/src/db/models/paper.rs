//! Paper entity

use chrono::Utc;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{self, PaperStatus};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "papers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub owner_id: i64,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    #[sea_orm(column_type = "Text")]
    pub author_name: String,

    #[sea_orm(column_type = "Text")]
    pub co_authors: String,

    /// Storage-relative path of the uploaded PDF
    #[sea_orm(column_type = "Text")]
    pub document_url: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub submitted_at: DateTimeWithTimeZone,

    /// Fee in minor units
    pub payment_amount: Option<i64>,

    #[sea_orm(column_type = "Text", nullable)]
    pub payment_currency: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub payment_reference: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub gateway_session_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub checkout_url: Option<String>,

    pub checkout_expires_at: Option<DateTimeWithTimeZone>,

    pub paid_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(column_type = "Text", nullable)]
    pub payment_method: Option<String>,

    /// Raw gateway callback body
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub payment_payload: Option<serde_json::Value>,

    #[sea_orm(column_type = "Text", nullable)]
    pub pass_html: Option<String>,

    pub pass_generated_at: Option<DateTimeWithTimeZone>,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::OwnerId",
        to = "super::user::Column::Id"
    )]
    Owner,

    #[sea_orm(has_many = "super::payment_transaction::Entity")]
    Transactions,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl Related<super::payment_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for domain::Paper {
    fn from(row: Model) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            description: row.description,
            author_name: row.author_name,
            co_authors: row.co_authors,
            document_url: row.document_url,
            submitted_at: row.submitted_at.with_timezone(&Utc),
            status: PaperStatus::from_stored(Some(&row.status)),
            payment_amount: row.payment_amount,
            payment_currency: row.payment_currency,
            payment_reference: row.payment_reference,
            gateway_session_id: row.gateway_session_id,
            checkout_url: row.checkout_url,
            checkout_expires_at: row.checkout_expires_at.map(|t| t.with_timezone(&Utc)),
            paid_at: row.paid_at.map(|t| t.with_timezone(&Utc)),
            payment_method: row.payment_method,
            payment_payload: row.payment_payload,
            pass_html: row.pass_html,
            pass_generated_at: row.pass_generated_at.map(|t| t.with_timezone(&Utc)),
            updated_at: row.updated_at.with_timezone(&Utc),
        }
    }
}
