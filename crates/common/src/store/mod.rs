//! Persistence seams used by the workflow services
//!
//! The Postgres [`Repository`](crate::db::Repository) implements every trait
//! here; the `test-util` feature adds an in-memory implementation so
//! workflow logic can be exercised without a database.

#[cfg(any(test, feature = "test-util"))]
mod memory;

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::{
    ConferenceSettings, NewNotification, NewPaper, NewPaymentTransaction, NewUser, Notification,
    Paper, PaperFilter, PaperStatus, PaymentTransaction, Role, User,
};
use crate::errors::Result;

#[async_trait]
pub trait PaperStore: Send + Sync {
    /// Insert a new paper with status `review`
    async fn insert_paper(&self, paper: NewPaper) -> Result<Paper>;

    async fn find_paper(&self, id: i64) -> Result<Option<Paper>>;

    /// Newest first
    async fn list_papers(&self, filter: &PaperFilter) -> Result<Vec<Paper>>;

    /// Overwrite every mutable column of the paper (last write wins)
    async fn save_paper(&self, paper: &Paper) -> Result<Paper>;

    async fn count_papers(&self, status: Option<PaperStatus>) -> Result<u64>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `DuplicateEmail` when the address is taken
    async fn insert_user(&self, user: NewUser) -> Result<User>;

    async fn find_user(&self, id: i64) -> Result<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_transaction(&self, tx: NewPaymentTransaction) -> Result<PaymentTransaction>;

    async fn find_transaction_by_session(&self, session_id: &str) -> Result<Option<PaymentTransaction>>;

    /// Record the latest gateway status and payload for a session
    async fn update_transaction_status(
        &self,
        session_id: &str,
        status: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<()>;

    /// Money collected for completed papers, in minor units. Each paper
    /// counts once, at its most recent paid transaction; paid sessions for
    /// papers that never completed are left out.
    async fn total_paid(&self) -> Result<i64>;
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn enqueue(&self, notification: NewNotification) -> Result<Notification>;

    /// Claim up to `limit` pending notifications due at `now`, plus
    /// `sending` rows whose lease has expired. Claimed rows move to
    /// `sending`, their attempt count is incremented, and they stay
    /// reserved until `lease_until`.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<Notification>>;

    async fn mark_sent(&self, id: i64, sent_at: DateTime<Utc>) -> Result<()>;

    /// Return a claimed notification to `pending` for another attempt
    async fn mark_retry(&self, id: i64, error: &str, next_attempt_at: DateTime<Utc>) -> Result<()>;

    async fn mark_failed(&self, id: i64, error: &str) -> Result<()>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_settings(&self) -> Result<ConferenceSettings>;

    async fn save_settings(&self, settings: &ConferenceSettings) -> Result<()>;
}

/// Everything the services need from persistence
#[async_trait]
pub trait Store: PaperStore + UserStore + PaymentStore + OutboxStore + SettingsStore {
    /// Check connectivity
    async fn ping(&self) -> Result<()>;
}

pub type SharedStore = Arc<dyn Store>;
