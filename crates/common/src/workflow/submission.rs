use chrono::Utc;
use tracing::{info, instrument, warn};
use validator::Validate;

use super::{settings_or_default, Actor};
use crate::documents::{validate_pdf, DocumentStorage};
use crate::domain::{NewPaper, Paper, Role};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::notify::Notifier;
use crate::store::{PaperStore, SharedStore, UserStore};

/// Fields of a paper submission, as received from the upload form
#[derive(Debug, Clone, Default, Validate)]
pub struct SubmissionInput {
    #[validate(length(min = 1, max = 500, message = "Title is required (max 500 characters)"))]
    pub title: String,

    pub description: String,

    #[validate(length(min = 1, max = 255, message = "Author name is required"))]
    pub author_name: String,

    pub co_authors: String,

    /// Client-side file name; must end in `.pdf`
    pub file_name: String,

    pub document: Vec<u8>,
}

impl SubmissionInput {
    fn trimmed(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        self.author_name = self.author_name.trim().to_string();
        self.co_authors = self.co_authors.trim().to_string();
        self
    }
}

/// Accepts new papers from participants
#[derive(Clone)]
pub struct SubmissionService {
    store: SharedStore,
    notifier: Notifier,
    documents: DocumentStorage,
    max_upload_bytes: usize,
}

impl SubmissionService {
    pub fn new(store: SharedStore, notifier: Notifier, documents: DocumentStorage, max_upload_bytes: usize) -> Self {
        Self {
            store,
            notifier,
            documents,
            max_upload_bytes,
        }
    }

    pub fn documents(&self) -> &DocumentStorage {
        &self.documents
    }

    /// Validate, store and announce a new paper.
    ///
    /// Nothing is written until the form and the PDF have been validated.
    #[instrument(skip(self, input), fields(actor = actor.user_id, file = %input.file_name))]
    pub async fn submit(&self, actor: &Actor, input: SubmissionInput) -> Result<Paper> {
        if actor.role != Role::Participant {
            return Err(AppError::Forbidden {
                message: "Only participants can submit papers".to_string(),
            });
        }

        let input = input.trimmed();
        input.validate()?;

        if input.document.is_empty() {
            return Err(AppError::MissingField {
                field: "paper_document".to_string(),
            });
        }
        let pages = validate_pdf(&input.file_name, &input.document, self.max_upload_bytes)?;

        let author = self
            .store
            .find_user(actor.user_id)
            .await?
            .ok_or(AppError::UserNotFound { id: actor.user_id })?;

        let document_url = self.documents.save_pdf(&input.document).await?;

        let paper = self
            .store
            .insert_paper(NewPaper {
                owner_id: author.id,
                title: input.title,
                description: input.description,
                author_name: input.author_name,
                co_authors: input.co_authors,
                document_url,
                submitted_at: Utc::now(),
            })
            .await?;

        metrics::record_submission();
        info!(paper_id = paper.id, owner_id = author.id, pages, "Paper submitted");

        let settings = settings_or_default(&self.store).await;
        let queued = self.notifier.submission_received(&paper, &author, &settings).await
            + self.notifier.new_submission(&paper, &author, &settings).await;
        if queued == 0 {
            warn!(paper_id = paper.id, "No submission emails queued");
        }

        Ok(paper)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::add_user;
    use super::*;
    use crate::documents::sample_pdf;
    use crate::domain::{NotificationKind, PaperStatus};
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use uuid::Uuid;

    const LIMIT: usize = 10 * 1024 * 1024;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: SubmissionService,
        ada: Actor,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let ada = add_user(&store, "ada@example.com", Role::Participant).await;
        add_user(&store, "chair@example.com", Role::ConferenceManager).await;

        let root = std::env::temp_dir().join(format!("paperdesk-submissions-{}", Uuid::new_v4()));
        let notifier = Notifier::new(store.clone(), "http://localhost:8080");

        Fixture {
            service: SubmissionService::new(store.clone(), notifier, DocumentStorage::new(root), LIMIT),
            ada: Actor::new(ada.id, ada.role),
            store,
        }
    }

    fn input(file_name: &str, document: Vec<u8>) -> SubmissionInput {
        SubmissionInput {
            title: "  Fearless Concurrency  ".to_string(),
            description: "Send and Sync in practice".to_string(),
            author_name: "Ada Lovelace".to_string(),
            co_authors: "Charles Babbage".to_string(),
            file_name: file_name.to_string(),
            document,
        }
    }

    #[tokio::test]
    async fn test_submit_stores_paper_and_queues_emails() {
        let f = fixture().await;

        let paper = f.service.submit(&f.ada, input("paper.pdf", sample_pdf(2))).await.unwrap();

        assert_eq!(paper.status, PaperStatus::Review);
        assert_eq!(paper.title, "Fearless Concurrency");
        assert_eq!(paper.owner_id, f.ada.user_id);

        let stored = f.service.documents().read(&paper.document_url).await.unwrap();
        assert!(stored.starts_with(b"%PDF-"));

        let sent: Vec<_> = f
            .store
            .notifications()
            .into_iter()
            .map(|n| (n.kind, n.recipient))
            .collect();
        assert_eq!(
            sent,
            vec![
                (NotificationKind::SubmissionReceived, "ada@example.com".to_string()),
                (NotificationKind::NewSubmissionAlert, "chair@example.com".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_rejects_before_persisting() {
        let f = fixture().await;

        let err = f.service.submit(&f.ada, input("paper.docx", sample_pdf(1))).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let err = f
            .service
            .submit(&f.ada, input("paper.pdf", b"not a pdf at all".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidFormat { .. }));

        let mut blank = input("paper.pdf", sample_pdf(1));
        blank.title = "   ".to_string();
        let err = f.service.submit(&f.ada, blank).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        assert_eq!(f.store.count_papers(None).await.unwrap(), 0);
        assert!(f.store.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_upload() {
        let f = fixture().await;
        let small = SubmissionService::new(
            f.store.clone(),
            Notifier::new(f.store.clone(), "http://localhost:8080"),
            f.service.documents().clone(),
            64,
        );

        let err = small.submit(&f.ada, input("paper.pdf", sample_pdf(1))).await.unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge { limit: 64, .. }));
    }

    #[tokio::test]
    async fn test_managers_cannot_submit() {
        let f = fixture().await;
        let chair = Actor::new(2, Role::ConferenceManager);

        let err = f.service.submit(&chair, input("paper.pdf", sample_pdf(1))).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }
}
