//! Repository pattern for database operations
//!
//! Implements the store traits on top of SeaORM. Reads go to the replica
//! when one is configured; every mutation goes to the primary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr,
    EntityTrait, NotSet, PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr, Statement,
    TransactionTrait,
};
use std::collections::HashMap;

use crate::db::models::*;
use crate::db::DbPool;
use crate::domain::{
    ConferenceSettings, NewNotification, NewPaper, NewPaymentTransaction, NewUser, Notification,
    NotificationStatus, Paper, PaperFilter, PaperStatus, PaymentTransaction, Role, User,
    PAYMENT_METHOD_CHIP, STATUS_PAID, STATUS_PENDING,
};
use crate::errors::{AppError, Result};
use crate::store::{OutboxStore, PaperStore, PaymentStore, SettingsStore, Store, UserStore};

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }
}

fn paper_active_model(paper: &Paper, now: DateTime<Utc>) -> PaperActiveModel {
    PaperActiveModel {
        id: Set(paper.id),
        owner_id: Set(paper.owner_id),
        title: Set(paper.title.clone()),
        description: Set(paper.description.clone()),
        author_name: Set(paper.author_name.clone()),
        co_authors: Set(paper.co_authors.clone()),
        document_url: Set(paper.document_url.clone()),
        status: Set(paper.status.as_str().to_string()),
        submitted_at: Set(paper.submitted_at.into()),
        payment_amount: Set(paper.payment_amount),
        payment_currency: Set(paper.payment_currency.clone()),
        payment_reference: Set(paper.payment_reference.clone()),
        gateway_session_id: Set(paper.gateway_session_id.clone()),
        checkout_url: Set(paper.checkout_url.clone()),
        checkout_expires_at: Set(paper.checkout_expires_at.map(Into::into)),
        paid_at: Set(paper.paid_at.map(Into::into)),
        payment_method: Set(paper.payment_method.clone()),
        payment_payload: Set(paper.payment_payload.clone()),
        pass_html: Set(paper.pass_html.clone()),
        pass_generated_at: Set(paper.pass_generated_at.map(Into::into)),
        updated_at: Set(now.into()),
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

// ========================================================================
// Paper Operations
// ========================================================================

#[async_trait]
impl PaperStore for Repository {
    async fn insert_paper(&self, paper: NewPaper) -> Result<Paper> {
        let row = PaperActiveModel {
            id: NotSet,
            owner_id: Set(paper.owner_id),
            title: Set(paper.title),
            description: Set(paper.description),
            author_name: Set(paper.author_name),
            co_authors: Set(paper.co_authors),
            document_url: Set(paper.document_url),
            status: Set(PaperStatus::Review.as_str().to_string()),
            submitted_at: Set(paper.submitted_at.into()),
            payment_amount: Set(None),
            payment_currency: Set(None),
            payment_reference: Set(None),
            gateway_session_id: Set(None),
            checkout_url: Set(None),
            checkout_expires_at: Set(None),
            paid_at: Set(None),
            payment_method: Set(None),
            payment_payload: Set(None),
            pass_html: Set(None),
            pass_generated_at: Set(None),
            updated_at: Set(paper.submitted_at.into()),
        };

        let row = row.insert(self.write_conn()).await?;
        Ok(row.into())
    }

    async fn find_paper(&self, id: i64) -> Result<Option<Paper>> {
        let row = PaperEntity::find_by_id(id).one(self.read_conn()).await?;
        Ok(row.map(Into::into))
    }

    async fn list_papers(&self, filter: &PaperFilter) -> Result<Vec<Paper>> {
        let mut query = PaperEntity::find();

        if let Some(owner_id) = filter.owner_id {
            query = query.filter(PaperColumn::OwnerId.eq(owner_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(PaperColumn::Status.eq(status.as_str()));
        }

        let rows = query
            .order_by_desc(PaperColumn::Id)
            .all(self.read_conn())
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn save_paper(&self, paper: &Paper) -> Result<Paper> {
        let row = paper_active_model(paper, Utc::now())
            .update(self.write_conn())
            .await
            .map_err(|e| match e {
                DbErr::RecordNotUpdated => AppError::PaperNotFound { id: paper.id },
                other => other.into(),
            })?;

        Ok(row.into())
    }

    async fn count_papers(&self, status: Option<PaperStatus>) -> Result<u64> {
        let mut query = PaperEntity::find();
        if let Some(status) = status {
            query = query.filter(PaperColumn::Status.eq(status.as_str()));
        }

        query.count(self.read_conn()).await.map_err(Into::into)
    }
}

// ========================================================================
// User Operations
// ========================================================================

#[async_trait]
impl UserStore for Repository {
    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let email = user.email.to_lowercase();

        let row = UserActiveModel {
            id: NotSet,
            email: Set(email.clone()),
            display_name: Set(user.display_name),
            role: Set(user.role.as_str().to_string()),
            password_hash: Set(user.password_hash),
            phone: Set(user.profile.phone),
            organization: Set(user.profile.organization),
            address: Set(user.profile.address),
            postcode: Set(user.profile.postcode),
            country: Set(user.profile.country),
            created_at: Set(Utc::now().into()),
        };

        let row = row.insert(self.write_conn()).await.map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateEmail { email }
            } else {
                e.into()
            }
        })?;

        Ok(row.into())
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        let row = UserEntity::find_by_id(id).one(self.read_conn()).await?;
        Ok(row.map(Into::into))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = UserEntity::find()
            .filter(UserColumn::Email.eq(email.to_lowercase()))
            .one(self.read_conn())
            .await?;
        Ok(row.map(Into::into))
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>> {
        let rows = UserEntity::find()
            .filter(UserColumn::Role.eq(role.as_str()))
            .order_by_asc(UserColumn::Id)
            .all(self.read_conn())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// ========================================================================
// Payment Transaction Operations
// ========================================================================

#[async_trait]
impl PaymentStore for Repository {
    async fn insert_transaction(&self, tx: NewPaymentTransaction) -> Result<PaymentTransaction> {
        let now = Utc::now();

        let row = PaymentTransactionActiveModel {
            id: NotSet,
            paper_id: Set(tx.paper_id),
            user_id: Set(tx.user_id),
            session_id: Set(tx.session_id),
            reference: Set(tx.reference),
            amount: Set(tx.amount),
            currency: Set(tx.currency),
            status: Set(STATUS_PENDING.to_string()),
            payment_method: Set(PAYMENT_METHOD_CHIP.to_string()),
            payload: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let row = row.insert(self.write_conn()).await?;
        Ok(row.into())
    }

    async fn find_transaction_by_session(&self, session_id: &str) -> Result<Option<PaymentTransaction>> {
        // Webhooks can race the insert on a lagging replica
        let row = PaymentTransactionEntity::find()
            .filter(PaymentTransactionColumn::SessionId.eq(session_id))
            .one(self.write_conn())
            .await?;
        Ok(row.map(Into::into))
    }

    async fn update_transaction_status(
        &self,
        session_id: &str,
        status: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<()> {
        let mut update = PaymentTransactionEntity::update_many()
            .col_expr(PaymentTransactionColumn::Status, Expr::value(status))
            .col_expr(PaymentTransactionColumn::UpdatedAt, Expr::value(Utc::now()));

        if let Some(payload) = payload {
            update = update.col_expr(PaymentTransactionColumn::Payload, Expr::value(payload));
        }

        let result = update
            .filter(PaymentTransactionColumn::SessionId.eq(session_id))
            .exec(self.write_conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::TransactionNotFound { session_id: session_id.to_string() });
        }

        Ok(())
    }

    async fn total_paid(&self) -> Result<i64> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT FROM (
                SELECT DISTINCT ON (t.paper_id) t.amount
                FROM payment_transactions t
                JOIN papers p ON p.id = t.paper_id
                WHERE t.status = $1 AND p.status = $2
                ORDER BY t.paper_id, t.updated_at DESC, t.id DESC
            ) collected
            "#,
            vec![STATUS_PAID.into(), PaperStatus::Completed.as_str().into()],
        );

        let total = match self.read_conn().query_one(stmt).await? {
            Some(row) => row.try_get_by_index::<i64>(0)?,
            None => 0,
        };

        Ok(total)
    }
}

// ========================================================================
// Outbox Operations
// ========================================================================

#[async_trait]
impl OutboxStore for Repository {
    async fn enqueue(&self, notification: NewNotification) -> Result<Notification> {
        let now = Utc::now();

        let row = NotificationActiveModel {
            id: NotSet,
            kind: Set(notification.kind.as_str().to_string()),
            paper_id: Set(notification.paper_id),
            recipient: Set(notification.recipient),
            subject: Set(notification.subject),
            body_html: Set(notification.body_html),
            status: Set(NotificationStatus::Pending.as_str().to_string()),
            attempts: Set(0),
            last_error: Set(None),
            next_attempt_at: Set(now.into()),
            sent_at: Set(None),
            created_at: Set(now.into()),
        };

        let row = row.insert(self.write_conn()).await?;
        Ok(row.into())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<Notification>> {

        // A `sending` row whose lease has run out belongs to a worker that
        // died mid-send, so it is claimable again.
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE notifications
            SET status = 'sending',
                attempts = attempts + 1,
                next_attempt_at = $3
            WHERE id IN (
                SELECT id FROM notifications
                WHERE status IN ('pending', 'sending')
                  AND next_attempt_at <= $1
                ORDER BY next_attempt_at, id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
            vec![now.into(), (limit as i64).into(), lease_until.into()],
        );

        let mut rows = NotificationEntity::find()
            .from_raw_sql(stmt)
            .all(self.write_conn())
            .await?;
        rows.sort_by_key(|row| row.id);

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_sent(&self, id: i64, sent_at: DateTime<Utc>) -> Result<()> {
        NotificationEntity::update_many()
            .col_expr(NotificationColumn::Status, Expr::value(NotificationStatus::Sent.as_str()))
            .col_expr(NotificationColumn::SentAt, Expr::value(sent_at))
            .col_expr(NotificationColumn::LastError, Expr::value(Option::<String>::None))
            .filter(NotificationColumn::Id.eq(id))
            .exec(self.write_conn())
            .await?;
        Ok(())
    }

    async fn mark_retry(&self, id: i64, error: &str, next_attempt_at: DateTime<Utc>) -> Result<()> {
        NotificationEntity::update_many()
            .col_expr(NotificationColumn::Status, Expr::value(NotificationStatus::Pending.as_str()))
            .col_expr(NotificationColumn::LastError, Expr::value(error))
            .col_expr(NotificationColumn::NextAttemptAt, Expr::value(next_attempt_at))
            .filter(NotificationColumn::Id.eq(id))
            .exec(self.write_conn())
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        NotificationEntity::update_many()
            .col_expr(NotificationColumn::Status, Expr::value(NotificationStatus::Failed.as_str()))
            .col_expr(NotificationColumn::LastError, Expr::value(error))
            .filter(NotificationColumn::Id.eq(id))
            .exec(self.write_conn())
            .await?;
        Ok(())
    }
}

// ========================================================================
// Settings Operations
// ========================================================================

#[async_trait]
impl SettingsStore for Repository {
    async fn load_settings(&self) -> Result<ConferenceSettings> {
        // Fee and credential edits must be visible to the very next request
        let rows = SettingEntity::find().all(self.write_conn()).await?;

        let map: HashMap<String, String> = rows.into_iter().map(|row| (row.key, row.value)).collect();
        Ok(ConferenceSettings::from_map(&map))
    }

    async fn save_settings(&self, settings: &ConferenceSettings) -> Result<()> {
        let now = Utc::now();
        let txn = self.write_conn().begin().await?;

        for (key, value) in settings.to_map() {
            let row = SettingActiveModel {
                key: Set(key),
                value: Set(value),
                updated_at: Set(now.into()),
            };

            SettingEntity::insert(row)
                .on_conflict(
                    OnConflict::column(SettingColumn::Key)
                        .update_columns([SettingColumn::Value, SettingColumn::UpdatedAt])
                        .to_owned(),
                )
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(())
    }
}

// ========================================================================
// Health Check
// ========================================================================

#[async_trait]
impl Store for Repository {
    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}
