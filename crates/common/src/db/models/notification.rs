//! Email outbox entity

use chrono::Utc;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{self, NotificationKind, NotificationStatus};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "Text")]
    pub kind: String,

    pub paper_id: Option<i64>,

    #[sea_orm(column_type = "Text")]
    pub recipient: String,

    #[sea_orm(column_type = "Text")]
    pub subject: String,

    #[sea_orm(column_type = "Text")]
    pub body_html: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub attempts: i32,

    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,

    pub next_attempt_at: DateTimeWithTimeZone,

    pub sent_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Kind of email; unknown kinds read back as a submission receipt
    pub fn notification_kind(&self) -> NotificationKind {
        NotificationKind::parse(&self.kind).unwrap_or(NotificationKind::SubmissionReceived)
    }
}

impl From<Model> for domain::Notification {
    fn from(row: Model) -> Self {
        Self {
            kind: row.notification_kind(),
            id: row.id,
            paper_id: row.paper_id,
            recipient: row.recipient,
            subject: row.subject,
            body_html: row.body_html,
            status: NotificationStatus::from_stored(&row.status),
            attempts: row.attempts,
            last_error: row.last_error,
            next_attempt_at: row.next_attempt_at.with_timezone(&Utc),
            sent_at: row.sent_at.map(|t| t.with_timezone(&Utc)),
            created_at: row.created_at.with_timezone(&Utc),
        }
    }
}
