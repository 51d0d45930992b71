//! In-memory store for tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{OutboxStore, PaperStore, PaymentStore, SettingsStore, Store, UserStore};
use crate::domain::{
    ConferenceSettings, NewNotification, NewPaper, NewPaymentTransaction, NewUser, Notification,
    NotificationStatus, Paper, PaperFilter, PaperStatus, PaymentTransaction, Role, User, STATUS_PAID,
    STATUS_PENDING, PAYMENT_METHOD_CHIP,
};
use crate::errors::{AppError, Result};

#[derive(Default)]
struct Inner {
    papers: BTreeMap<i64, Paper>,
    users: BTreeMap<i64, User>,
    transactions: BTreeMap<i64, PaymentTransaction>,
    notifications: BTreeMap<i64, Notification>,
    settings: ConferenceSettings,
    next_paper_id: i64,
    next_user_id: i64,
    next_tx_id: i64,
    next_notification_id: i64,
}

/// Store backed by maps behind a mutex
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_enqueue: AtomicBool,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a paper as-is, keeping its id
    pub fn put_paper(&self, paper: Paper) {
        let mut inner = self.lock();
        inner.next_paper_id = inner.next_paper_id.max(paper.id);
        inner.papers.insert(paper.id, paper);
    }

    pub fn set_settings(&self, settings: ConferenceSettings) {
        self.lock().settings = settings;
    }

    /// Every notification ever enqueued, oldest first
    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.values().cloned().collect()
    }

    pub fn transactions(&self) -> Vec<PaymentTransaction> {
        self.lock().transactions.values().cloned().collect()
    }

    /// Make every subsequent `enqueue` fail
    pub fn fail_enqueue(&self, fail: bool) {
        self.fail_enqueue.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaperStore for MemoryStore {
    async fn insert_paper(&self, paper: NewPaper) -> Result<Paper> {
        let mut inner = self.lock();
        let id = next(&mut inner.next_paper_id);
        let paper = Paper {
            id,
            owner_id: paper.owner_id,
            title: paper.title,
            description: paper.description,
            author_name: paper.author_name,
            co_authors: paper.co_authors,
            document_url: paper.document_url,
            submitted_at: paper.submitted_at,
            status: PaperStatus::Review,
            payment_amount: None,
            payment_currency: None,
            payment_reference: None,
            gateway_session_id: None,
            checkout_url: None,
            checkout_expires_at: None,
            paid_at: None,
            payment_method: None,
            payment_payload: None,
            pass_html: None,
            pass_generated_at: None,
            updated_at: paper.submitted_at,
        };
        inner.papers.insert(id, paper.clone());
        Ok(paper)
    }

    async fn find_paper(&self, id: i64) -> Result<Option<Paper>> {
        Ok(self.lock().papers.get(&id).cloned())
    }

    async fn list_papers(&self, filter: &PaperFilter) -> Result<Vec<Paper>> {
        let inner = self.lock();
        Ok(inner
            .papers
            .values()
            .rev()
            .filter(|p| filter.owner_id.map_or(true, |owner| p.owner_id == owner))
            .filter(|p| filter.status.map_or(true, |status| p.status == status))
            .cloned()
            .collect())
    }

    async fn save_paper(&self, paper: &Paper) -> Result<Paper> {
        let mut inner = self.lock();
        if !inner.papers.contains_key(&paper.id) {
            return Err(AppError::PaperNotFound { id: paper.id });
        }
        let mut saved = paper.clone();
        saved.updated_at = Utc::now();
        inner.papers.insert(paper.id, saved.clone());
        Ok(saved)
    }

    async fn count_papers(&self, status: Option<PaperStatus>) -> Result<u64> {
        let inner = self.lock();
        Ok(inner
            .papers
            .values()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .count() as u64)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let mut inner = self.lock();
        let email = user.email.to_lowercase();
        if inner.users.values().any(|u| u.email == email) {
            return Err(AppError::DuplicateEmail { email });
        }
        let id = next(&mut inner.next_user_id);
        let user = User {
            id,
            email,
            display_name: user.display_name,
            role: user.role,
            password_hash: user.password_hash,
            profile: user.profile,
            created_at: Utc::now(),
        };
        inner.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.to_lowercase();
        Ok(self.lock().users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>> {
        Ok(self
            .lock()
            .users
            .values()
            .filter(|u| u.role == role)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert_transaction(&self, tx: NewPaymentTransaction) -> Result<PaymentTransaction> {
        let mut inner = self.lock();
        let id = next(&mut inner.next_tx_id);
        let now = Utc::now();
        let tx = PaymentTransaction {
            id,
            paper_id: tx.paper_id,
            user_id: tx.user_id,
            session_id: tx.session_id,
            reference: tx.reference,
            amount: tx.amount,
            currency: tx.currency,
            status: STATUS_PENDING.to_string(),
            payment_method: PAYMENT_METHOD_CHIP.to_string(),
            payload: None,
            created_at: now,
            updated_at: now,
        };
        inner.transactions.insert(id, tx.clone());
        Ok(tx)
    }

    async fn find_transaction_by_session(&self, session_id: &str) -> Result<Option<PaymentTransaction>> {
        Ok(self
            .lock()
            .transactions
            .values()
            .find(|t| t.session_id == session_id)
            .cloned())
    }

    async fn update_transaction_status(
        &self,
        session_id: &str,
        status: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<()> {
        let mut inner = self.lock();
        let tx = inner
            .transactions
            .values_mut()
            .find(|t| t.session_id == session_id)
            .ok_or_else(|| AppError::TransactionNotFound { session_id: session_id.to_string() })?;
        tx.status = status.to_string();
        if payload.is_some() {
            tx.payload = payload;
        }
        tx.updated_at = Utc::now();
        Ok(())
    }

    async fn total_paid(&self) -> Result<i64> {
        let inner = self.lock();
        let mut latest: BTreeMap<i64, &PaymentTransaction> = BTreeMap::new();
        for t in inner.transactions.values().filter(|t| t.status == STATUS_PAID) {
            let completed = inner
                .papers
                .get(&t.paper_id)
                .is_some_and(|p| p.status == PaperStatus::Completed);
            if !completed {
                continue;
            }
            let newer = latest
                .get(&t.paper_id)
                .map_or(true, |seen| (t.updated_at, t.id) > (seen.updated_at, seen.id));
            if newer {
                latest.insert(t.paper_id, t);
            }
        }
        Ok(latest.values().map(|t| t.amount).sum())
    }
}

#[async_trait]
impl OutboxStore for MemoryStore {
    async fn enqueue(&self, notification: NewNotification) -> Result<Notification> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(AppError::Internal { message: "outbox unavailable".to_string() });
        }
        let mut inner = self.lock();
        let id = next(&mut inner.next_notification_id);
        let now = Utc::now();
        let notification = Notification {
            id,
            kind: notification.kind,
            paper_id: notification.paper_id,
            recipient: notification.recipient,
            subject: notification.subject,
            body_html: notification.body_html,
            status: NotificationStatus::Pending,
            attempts: 0,
            last_error: None,
            next_attempt_at: now,
            sent_at: None,
            created_at: now,
        };
        inner.notifications.insert(id, notification.clone());
        Ok(notification)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<Notification>> {
        let mut inner = self.lock();
        let mut claimed = Vec::new();
        for n in inner.notifications.values_mut() {
            if claimed.len() as u64 >= limit {
                break;
            }
            let claimable = matches!(n.status, NotificationStatus::Pending | NotificationStatus::Sending);
            if claimable && n.next_attempt_at <= now {
                n.status = NotificationStatus::Sending;
                n.attempts += 1;
                n.next_attempt_at = lease_until;
                claimed.push(n.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_sent(&self, id: i64, sent_at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.lock();
        if let Some(n) = inner.notifications.get_mut(&id) {
            n.status = NotificationStatus::Sent;
            n.sent_at = Some(sent_at);
            n.last_error = None;
        }
        Ok(())
    }

    async fn mark_retry(&self, id: i64, error: &str, next_attempt_at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.lock();
        if let Some(n) = inner.notifications.get_mut(&id) {
            n.status = NotificationStatus::Pending;
            n.last_error = Some(error.to_string());
            n.next_attempt_at = next_attempt_at;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        let mut inner = self.lock();
        if let Some(n) = inner.notifications.get_mut(&id) {
            n.status = NotificationStatus::Failed;
            n.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load_settings(&self) -> Result<ConferenceSettings> {
        Ok(self.lock().settings.clone())
    }

    async fn save_settings(&self, settings: &ConferenceSettings) -> Result<()> {
        self.lock().settings = settings.clone();
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
