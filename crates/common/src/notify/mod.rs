//! Transactional email notifications
//!
//! Provides:
//! - Pure HTML templates for the five workflow emails
//! - [`Notifier`], which renders an event and writes one outbox row per recipient
//! - [`OutboxDispatcher`], which the mailer worker runs to deliver rows
//! - SMTP and log-only [`Mailer`] transports
//!
//! Workflow services call the notifier only after their state change is
//! persisted. Enqueue failures are logged here and never surface to callers.

mod dispatcher;
mod mailer;
pub mod templates;

pub use dispatcher::{
    DispatchReport, OutboxDispatcher, RetryPolicy, MAX_RETRY_DELAY, SEND_ATTEMPT_TIMEOUT,
};
pub use mailer::{LogMailer, Mailer, SmtpMailer};
#[cfg(any(test, feature = "test-util"))]
pub use mailer::{RecordingMailer, SentEmail};
pub use templates::{escape_html, RenderedEmail, TemplateContext};

use crate::domain::{ConferenceSettings, NewNotification, NotificationKind, Paper, PaperStatus, Role, User};
use crate::errors::Result;
use crate::metrics;
use crate::store::{OutboxStore, SharedStore, UserStore};
use tracing::{error, info, warn};

/// Renders workflow events into outbox rows
#[derive(Clone)]
pub struct Notifier {
    store: SharedStore,
    public_url: String,
}

impl Notifier {
    pub fn new(store: SharedStore, public_url: impl Into<String>) -> Self {
        Self {
            store,
            public_url: public_url.into(),
        }
    }

    fn context<'a>(&'a self, settings: &'a ConferenceSettings) -> TemplateContext<'a> {
        TemplateContext {
            conference_name: settings.conference_name(),
            public_url: &self.public_url,
        }
    }

    /// Confirmation to the participant who submitted `paper`
    pub async fn submission_received(&self, paper: &Paper, owner: &User, settings: &ConferenceSettings) -> usize {
        let email = templates::submission_received(&self.context(settings), paper);
        self.enqueue_all(NotificationKind::SubmissionReceived, paper.id, &[owner.email.clone()], email)
            .await
    }

    /// Alert every conference manager (administrators when there are none)
    /// plus the configured notification address
    pub async fn new_submission(&self, paper: &Paper, author: &User, settings: &ConferenceSettings) -> usize {
        let recipients = match self.staff_recipients(settings).await {
            Ok(recipients) => recipients,
            Err(e) => {
                error!(paper_id = paper.id, error = %e, "Failed to resolve submission alert recipients");
                return 0;
            }
        };

        if recipients.is_empty() {
            warn!(paper_id = paper.id, "No recipients for new submission alert");
            return 0;
        }

        let email = templates::new_submission_alert(&self.context(settings), paper, author);
        self.enqueue_all(NotificationKind::NewSubmissionAlert, paper.id, &recipients, email)
            .await
    }

    /// Acceptance or rejection, chosen from the paper's new status
    pub async fn review_decision(&self, paper: &Paper, owner: &User, settings: &ConferenceSettings) -> usize {
        let ctx = self.context(settings);
        let (kind, email) = match paper.status {
            PaperStatus::PendingPayment => (
                NotificationKind::Acceptance,
                templates::acceptance(&ctx, paper, settings.fee(), settings.currency()),
            ),
            PaperStatus::Reject => (NotificationKind::Rejection, templates::rejection(&ctx, paper)),
            other => {
                warn!(paper_id = paper.id, status = %other, "No review email for status");
                return 0;
            }
        };

        self.enqueue_all(kind, paper.id, &[owner.email.clone()], email).await
    }

    /// Receipt after the gateway confirmed payment
    pub async fn payment_confirmed(&self, paper: &Paper, owner: &User, settings: &ConferenceSettings) -> usize {
        let email = templates::payment_confirmation(&self.context(settings), paper);
        self.enqueue_all(NotificationKind::PaymentConfirmation, paper.id, &[owner.email.clone()], email)
            .await
    }

    async fn staff_recipients(&self, settings: &ConferenceSettings) -> Result<Vec<String>> {
        let mut staff = self.store.list_users_by_role(Role::ConferenceManager).await?;
        if staff.is_empty() {
            staff = self.store.list_users_by_role(Role::Administrator).await?;
        }

        let mut recipients: Vec<String> = staff.into_iter().map(|u| u.email).collect();
        if let Some(extra) = &settings.notification_email {
            if !recipients.iter().any(|r| r.eq_ignore_ascii_case(extra)) {
                recipients.push(extra.clone());
            }
        }

        Ok(recipients)
    }

    /// Returns how many rows were written
    async fn enqueue_all(
        &self,
        kind: NotificationKind,
        paper_id: i64,
        recipients: &[String],
        email: RenderedEmail,
    ) -> usize {
        let mut written = 0;

        for recipient in recipients {
            let row = NewNotification {
                kind,
                paper_id: Some(paper_id),
                recipient: recipient.clone(),
                subject: email.subject.clone(),
                body_html: email.body_html.clone(),
            };

            match self.store.enqueue(row).await {
                Ok(n) => {
                    written += 1;
                    metrics::record_notification_enqueued(kind.as_str());
                    info!(id = n.id, paper_id = paper_id, kind = kind.as_str(), recipient = %recipient, "Email queued");
                }
                Err(e) => {
                    error!(paper_id = paper_id, kind = kind.as_str(), recipient = %recipient, error = %e, "Failed to queue email");
                }
            }
        }

        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewUser, Profile};
    use crate::store::MemoryStore;
    use chrono::Utc;
    use std::sync::Arc;

    async fn user(store: &MemoryStore, email: &str, role: Role) -> User {
        store
            .insert_user(NewUser {
                email: email.into(),
                display_name: email.into(),
                role,
                password_hash: String::new(),
                profile: Profile::default(),
            })
            .await
            .unwrap()
    }

    fn paper(status: PaperStatus) -> Paper {
        let now = Utc::now();
        Paper {
            id: 3,
            owner_id: 1,
            title: "Ownership Types".into(),
            description: String::new(),
            author_name: "Ada".into(),
            co_authors: String::new(),
            document_url: "x.pdf".into(),
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

    #[tokio::test]
    async fn test_alert_falls_back_to_administrators() {
        let store = Arc::new(MemoryStore::new());
        let author = user(&store, "ada@example.com", Role::Participant).await;
        user(&store, "root@example.com", Role::Administrator).await;

        let settings = ConferenceSettings {
            notification_email: Some("desk@example.com".into()),
            ..Default::default()
        };

        let notifier = Notifier::new(store.clone(), "http://localhost");
        let written = notifier.new_submission(&paper(PaperStatus::Review), &author, &settings).await;

        assert_eq!(written, 2);
        let recipients: Vec<_> = store.notifications().into_iter().map(|n| n.recipient).collect();
        assert_eq!(recipients, vec!["root@example.com", "desk@example.com"]);
    }

    #[tokio::test]
    async fn test_alert_prefers_managers() {
        let store = Arc::new(MemoryStore::new());
        let author = user(&store, "ada@example.com", Role::Participant).await;
        user(&store, "root@example.com", Role::Administrator).await;
        user(&store, "chair@example.com", Role::ConferenceManager).await;

        let notifier = Notifier::new(store.clone(), "http://localhost");
        notifier
            .new_submission(&paper(PaperStatus::Review), &author, &ConferenceSettings::default())
            .await;

        let recipients: Vec<_> = store.notifications().into_iter().map(|n| n.recipient).collect();
        assert_eq!(recipients, vec!["chair@example.com"]);
    }

    #[tokio::test]
    async fn test_review_decision_picks_template() {
        let store = Arc::new(MemoryStore::new());
        let owner = user(&store, "ada@example.com", Role::Participant).await;
        let notifier = Notifier::new(store.clone(), "http://localhost");
        let settings = ConferenceSettings::default();

        notifier.review_decision(&paper(PaperStatus::PendingPayment), &owner, &settings).await;
        notifier.review_decision(&paper(PaperStatus::Reject), &owner, &settings).await;
        assert_eq!(notifier.review_decision(&paper(PaperStatus::Paid), &owner, &settings).await, 0);

        let kinds: Vec<_> = store.notifications().into_iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NotificationKind::Acceptance, NotificationKind::Rejection]);
    }

    #[tokio::test]
    async fn test_enqueue_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::new());
        let owner = user(&store, "ada@example.com", Role::Participant).await;
        store.fail_enqueue(true);

        let notifier = Notifier::new(store.clone(), "http://localhost");
        let written = notifier
            .submission_received(&paper(PaperStatus::Review), &owner, &ConferenceSettings::default())
            .await;

        assert_eq!(written, 0);
        assert!(store.notifications().is_empty());
    }
}
