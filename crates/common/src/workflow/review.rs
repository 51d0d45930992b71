use tracing::{info, instrument, warn};

use super::{load_paper, settings_or_default, Actor};
use crate::domain::{Paper, PaperStatus};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::notify::Notifier;
use crate::store::{PaperStore, SharedStore, UserStore};

/// Result of a status change request
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// Requested status equals the current one; nothing was written
    Unchanged(Paper),
    /// Status was persisted; `notifications` rows were queued
    Changed { paper: Paper, notifications: usize },
}

impl TransitionOutcome {
    pub fn paper(&self) -> &Paper {
        match self {
            TransitionOutcome::Unchanged(paper) => paper,
            TransitionOutcome::Changed { paper, .. } => paper,
        }
    }

    pub fn into_paper(self) -> Paper {
        match self {
            TransitionOutcome::Unchanged(paper) => paper,
            TransitionOutcome::Changed { paper, .. } => paper,
        }
    }

    pub fn changed(&self) -> bool {
        matches!(self, TransitionOutcome::Changed { .. })
    }
}

/// Status engine for reviewer decisions
#[derive(Clone)]
pub struct ReviewService {
    store: SharedStore,
    notifier: Notifier,
}

impl ReviewService {
    pub fn new(store: SharedStore, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    /// Apply a reviewer decision to a paper.
    ///
    /// `requested` accepts `accept` as an alias of `pending_payment`. Only
    /// review decisions may be requested here; `paid` and `completed` are
    /// reached through payment confirmation.
    #[instrument(skip(self), fields(actor = actor.user_id))]
    pub async fn change_status(&self, actor: &Actor, paper_id: i64, requested: &str) -> Result<TransitionOutcome> {
        if !actor.role.can_manage_papers() {
            return Err(AppError::Forbidden {
                message: "Conference manager role required".to_string(),
            });
        }

        let mut paper = load_paper(&self.store, paper_id).await?;

        let target = PaperStatus::parse_requested(requested).ok_or_else(|| AppError::Validation {
            message: format!("Invalid status: {}", requested.trim()),
            field: Some("status".to_string()),
        })?;

        if target == paper.status {
            info!(paper_id, status = %target, "Status unchanged");
            return Ok(TransitionOutcome::Unchanged(paper));
        }

        let from = paper.status;
        if !target.is_review_decision() || !from.can_transition_to(target) {
            warn!(paper_id, from = %from, to = %target, "Rejected status transition");
            return Err(AppError::InvalidTransition { from, to: target });
        }

        paper.status = target;
        let paper = self.store.save_paper(&paper).await?;
        metrics::record_transition(from.as_str(), target.as_str());
        info!(paper_id, from = %from, to = %target, "Paper status updated");

        // The status change stands even when the email cannot be queued
        let notifications = match self.store.find_user(paper.owner_id).await {
            Ok(Some(owner)) => {
                let settings = settings_or_default(&self.store).await;
                self.notifier.review_decision(&paper, &owner, &settings).await
            }
            Ok(None) => {
                warn!(paper_id, owner_id = paper.owner_id, "Paper owner missing, no decision email");
                0
            }
            Err(e) => {
                warn!(paper_id, error = %e, "Failed to load paper owner, no decision email");
                0
            }
        };

        Ok(TransitionOutcome::Changed { paper, notifications })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{add_user, paper};
    use super::*;
    use crate::domain::{NotificationKind, Role};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: ReviewService,
        chair: Actor,
    }

    async fn fixture(status: PaperStatus) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let owner = add_user(&store, "ada@example.com", Role::Participant).await;
        let chair = add_user(&store, "chair@example.com", Role::ConferenceManager).await;
        store.put_paper(paper(7, owner.id, status));

        let notifier = Notifier::new(store.clone(), "http://localhost:8080");
        Fixture {
            service: ReviewService::new(store.clone(), notifier),
            chair: Actor::new(chair.id, chair.role),
            store,
        }
    }

    fn kinds(store: &MemoryStore) -> Vec<NotificationKind> {
        store.notifications().into_iter().map(|n| n.kind).collect()
    }

    #[tokio::test]
    async fn test_accept_alias_emits_one_acceptance() {
        let f = fixture(PaperStatus::Review).await;

        let outcome = f.service.change_status(&f.chair, 7, "accept").await.unwrap();

        assert!(outcome.changed());
        assert_eq!(outcome.paper().status, PaperStatus::PendingPayment);
        assert_eq!(kinds(&f.store), vec![NotificationKind::Acceptance]);

        let stored = f.store.find_paper(7).await.unwrap().unwrap();
        assert_eq!(stored.status, PaperStatus::PendingPayment);
    }

    #[tokio::test]
    async fn test_repeated_decision_is_suppressed() {
        let f = fixture(PaperStatus::Review).await;

        f.service.change_status(&f.chair, 7, "pending_payment").await.unwrap();
        let second = f.service.change_status(&f.chair, 7, "accept").await.unwrap();

        assert!(!second.changed());
        assert_eq!(kinds(&f.store), vec![NotificationKind::Acceptance]);
    }

    #[tokio::test]
    async fn test_reject_emits_one_rejection() {
        let f = fixture(PaperStatus::Review).await;

        f.service.change_status(&f.chair, 7, "reject").await.unwrap();
        f.service.change_status(&f.chair, 7, "reject").await.unwrap();

        assert_eq!(kinds(&f.store), vec![NotificationKind::Rejection]);
    }

    #[tokio::test]
    async fn test_reject_is_terminal() {
        let f = fixture(PaperStatus::Reject).await;

        let err = f.service.change_status(&f.chair, 7, "accept").await.unwrap_err();

        assert!(matches!(
            err,
            AppError::InvalidTransition { from: PaperStatus::Reject, to: PaperStatus::PendingPayment }
        ));
        assert_eq!(f.store.find_paper(7).await.unwrap().unwrap().status, PaperStatus::Reject);
        assert!(f.store.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_paid_cannot_be_requested() {
        let f = fixture(PaperStatus::PendingPayment).await;

        for requested in ["paid", "completed"] {
            let err = f.service.change_status(&f.chair, 7, requested).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidTransition { .. }));
        }
        assert_eq!(f.store.find_paper(7).await.unwrap().unwrap().status, PaperStatus::PendingPayment);
    }

    #[tokio::test]
    async fn test_participant_is_forbidden() {
        let f = fixture(PaperStatus::Review).await;
        let participant = Actor::new(1, Role::Participant);

        let err = f.service.change_status(&participant, 7, "accept").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_unknown_status_and_paper() {
        let f = fixture(PaperStatus::Review).await;

        let err = f.service.change_status(&f.chair, 7, "maybe").await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let err = f.service.change_status(&f.chair, 99, "accept").await.unwrap_err();
        assert!(matches!(err, AppError::PaperNotFound { id: 99 }));
    }

    #[tokio::test]
    async fn test_status_persists_when_outbox_fails() {
        let f = fixture(PaperStatus::Review).await;
        f.store.fail_enqueue(true);

        let outcome = f.service.change_status(&f.chair, 7, "accept").await.unwrap();

        assert!(matches!(outcome, TransitionOutcome::Changed { notifications: 0, .. }));
        assert_eq!(f.store.find_paper(7).await.unwrap().unwrap().status, PaperStatus::PendingPayment);
    }
}
