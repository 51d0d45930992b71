//! Paper workflow services
//!
//! - [`ReviewService`]: the status engine for reviewer decisions
//! - [`SubmissionService`]: validates and stores new papers
//! - [`PaymentService`]: checkout initiation, verification and confirmation
//! - [`pass`]: participant pass rendering
//!
//! Services persist their state change first and only then hand events to
//! the [`Notifier`](crate::notify::Notifier).

pub mod pass;
mod payment;
mod review;
mod submission;

pub use payment::{Checkout, PaymentService, VerifyOutcome, WebhookOutcome};
pub use review::{ReviewService, TransitionOutcome};
pub use submission::{SubmissionInput, SubmissionService};

use serde::Serialize;
use tracing::warn;

use crate::auth::AuthContext;
use crate::domain::{ConferenceSettings, Paper, PaperStatus, Role, User};
use crate::errors::{AppError, Result};
use crate::store::{PaperStore, PaymentStore, SettingsStore, SharedStore, UserStore};

/// Who is performing an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: i64, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn owns(&self, paper: &Paper) -> bool {
        paper.owner_id == self.user_id
    }

    pub fn can_view(&self, paper: &Paper) -> bool {
        self.owns(paper) || self.role.can_manage_papers()
    }
}

impl From<&AuthContext> for Actor {
    fn from(ctx: &AuthContext) -> Self {
        Self::new(ctx.user_id, ctx.role)
    }
}

pub(crate) async fn load_paper(store: &SharedStore, id: i64) -> Result<Paper> {
    store
        .find_paper(id)
        .await?
        .ok_or(AppError::PaperNotFound { id })
}

pub(crate) async fn load_user(store: &SharedStore, id: i64) -> Result<User> {
    store
        .find_user(id)
        .await?
        .ok_or(AppError::UserNotFound { id })
}

/// Settings for email rendering; a read failure falls back to defaults
pub(crate) async fn settings_or_default(store: &SharedStore) -> ConferenceSettings {
    store.load_settings().await.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load settings, using defaults");
        ConferenceSettings::default()
    })
}

/// Figures shown on the management dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_papers: u64,
    pub by_status: Vec<StatusCount>,
    pub participants: u64,
    /// Sum of paid transactions, in minor units
    pub total_collected: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: PaperStatus,
    pub label: &'static str,
    pub count: u64,
}

pub async fn dashboard_stats(store: &SharedStore) -> Result<DashboardStats> {
    let total_papers = store.count_papers(None).await?;

    let mut by_status = Vec::with_capacity(PaperStatus::ALL.len());
    for status in PaperStatus::ALL {
        by_status.push(StatusCount {
            status,
            label: status.label(),
            count: store.count_papers(Some(status)).await?,
        });
    }

    let participants = store.list_users_by_role(Role::Participant).await?.len() as u64;
    let total_collected = store.total_paid().await?;

    Ok(DashboardStats {
        total_papers,
        by_status,
        participants,
        total_collected,
    })
}

#[cfg(any(test, feature = "test-util"))]
pub mod testing {
    //! Fixtures shared by workflow and API tests

    use super::*;
    use crate::domain::{NewUser, Profile};
    use crate::store::MemoryStore;
    use chrono::Utc;

    pub async fn add_user(store: &MemoryStore, email: &str, role: Role) -> User {
        store
            .insert_user(NewUser {
                email: email.to_string(),
                display_name: email.split('@').next().unwrap_or(email).to_string(),
                role,
                password_hash: String::new(),
                profile: Profile {
                    phone: "+60123456789".to_string(),
                    organization: "University of Malaya".to_string(),
                    address: "Jalan Universiti".to_string(),
                    postcode: "50603".to_string(),
                    country: "Malaysia".to_string(),
                },
            })
            .await
            .expect("insert user")
    }

    /// A paper with the given id, owner and status and no payment data
    pub fn paper(id: i64, owner_id: i64, status: PaperStatus) -> Paper {
        let now = Utc::now();
        Paper {
            id,
            owner_id,
            title: "Borrow Checking in Practice".to_string(),
            description: "Lifetimes at scale".to_string(),
            author_name: "Ada".to_string(),
            co_authors: String::new(),
            document_url: "paper.pdf".to_string(),
            submitted_at: now,
            status,
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
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::domain::NewPaymentTransaction;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_dashboard_stats() {
        let store = Arc::new(MemoryStore::new());
        let ada = add_user(&store, "ada@example.com", Role::Participant).await;
        add_user(&store, "chair@example.com", Role::ConferenceManager).await;

        store.put_paper(paper(1, ada.id, PaperStatus::Review));
        store.put_paper(paper(2, ada.id, PaperStatus::Completed));
        store.put_paper(paper(3, ada.id, PaperStatus::Completed));

        store
            .insert_transaction(NewPaymentTransaction {
                paper_id: 2,
                user_id: ada.id,
                session_id: "purch_1".into(),
                reference: "PAPER-2-1".into(),
                amount: 30_000,
                currency: "MYR".into(),
            })
            .await
            .unwrap();
        store.update_transaction_status("purch_1", "paid", None).await.unwrap();

        let shared: SharedStore = store.clone();
        let stats = dashboard_stats(&shared).await.unwrap();

        assert_eq!(stats.total_papers, 3);
        assert_eq!(stats.participants, 1);
        assert_eq!(stats.total_collected, 30_000);
        let completed = stats.by_status.iter().find(|s| s.status == PaperStatus::Completed).unwrap();
        assert_eq!(completed.count, 2);
    }

    #[tokio::test]
    async fn test_collected_counts_each_completed_paper_once() {
        let store = Arc::new(MemoryStore::new());
        let ada = add_user(&store, "ada@example.com", Role::Participant).await;
        store.put_paper(paper(2, ada.id, PaperStatus::Completed));
        store.put_paper(paper(4, ada.id, PaperStatus::PendingPayment));

        // Paper 2 paid twice through separate sessions; paper 4 never completed
        for (paper_id, session, amount) in [(2, "purch_a", 25_000), (2, "purch_b", 30_000), (4, "purch_c", 30_000)] {
            store
                .insert_transaction(NewPaymentTransaction {
                    paper_id,
                    user_id: ada.id,
                    session_id: session.into(),
                    reference: format!("PAPER-{}-{}", paper_id, session),
                    amount,
                    currency: "MYR".into(),
                })
                .await
                .unwrap();
            store.update_transaction_status(session, "paid", None).await.unwrap();
        }

        let shared: SharedStore = store.clone();
        let stats = dashboard_stats(&shared).await.unwrap();

        assert_eq!(stats.total_collected, 30_000);
    }

    #[test]
    fn test_actor_visibility() {
        let p = paper(1, 10, PaperStatus::Review);
        assert!(Actor::new(10, Role::Participant).can_view(&p));
        assert!(!Actor::new(11, Role::Participant).can_view(&p));
        assert!(Actor::new(11, Role::ConferenceManager).can_view(&p));
    }
}
