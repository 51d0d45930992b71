use chrono::{Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, instrument, warn};

use super::{load_paper, load_user, pass, settings_or_default, Actor};
use crate::config::PaymentConfig;
use crate::domain::{
    ConferenceSettings, NewPaymentTransaction, Paper, PaperStatus, PaymentTransaction, User, PAYMENT_METHOD_CHIP,
    STATUS_PAID,
};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::notify::Notifier;
use crate::payments::{
    signature, PaymentGateway, PurchaseClient, PurchaseDetails, PurchaseProduct, PurchaseRequest,
};
use crate::store::{PaperStore, PaymentStore, SettingsStore, SharedStore};

/// A checkout session handed to the participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub paper_id: i64,
    pub session_id: String,
    pub reference: String,
    pub checkout_url: String,
    /// The paper already held an unexpired session; the gateway was not called
    pub reused: bool,
}

/// Result of polling the gateway for a paper's session
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub gateway_status: String,
    pub paper: Paper,
}

/// How a gateway callback was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Payment recorded and the paper completed
    Confirmed { paper_id: i64 },
    /// Paper was already completed; nothing was re-sent
    Duplicate { paper_id: i64 },
    /// Status other than `paid`, recorded on the transaction only
    Ignored { paper_id: i64, status: String },
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Confirmed { .. } => "confirmed",
            WebhookOutcome::Duplicate { .. } => "duplicate",
            WebhookOutcome::Ignored { .. } => "ignored",
        }
    }
}

enum Confirmation {
    Confirmed(Paper),
    Resumed(Paper),
    AlreadyCompleted(Paper),
    NotPayable(Paper),
}

impl Confirmation {
    fn into_paper(self) -> Paper {
        match self {
            Confirmation::Confirmed(p)
            | Confirmation::Resumed(p)
            | Confirmation::AlreadyCompleted(p)
            | Confirmation::NotPayable(p) => p,
        }
    }
}

type PaperLocks = Arc<Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>>;

/// Checkout initiation, gateway reconciliation and payment confirmation
#[derive(Clone)]
pub struct PaymentService {
    store: SharedStore,
    notifier: Notifier,
    gateway: Arc<dyn PaymentGateway>,
    public_url: String,
    qr_service_url: String,
    checkout_ttl: Duration,
    locks: PaperLocks,
}

impl PaymentService {
    pub fn new(
        store: SharedStore,
        notifier: Notifier,
        gateway: Arc<dyn PaymentGateway>,
        config: &PaymentConfig,
        public_url: &str,
    ) -> Self {
        Self {
            store,
            notifier,
            gateway,
            public_url: public_url.trim_end_matches('/').to_string(),
            qr_service_url: config.qr_service_url.clone(),
            checkout_ttl: Duration::seconds(config.checkout_ttl_secs),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Serialises initiation and confirmation per paper. One entry per
    /// paper that ever reached the payment stage.
    fn paper_lock(&self, paper_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(paper_id).or_default().clone()
    }

    // =========================================================================
    // Initiation
    // =========================================================================

    /// Start (or reuse) a hosted checkout for the owner's accepted paper.
    ///
    /// Preconditions are checked in order and none of them calls the gateway:
    /// paper exists, actor owns it, status is `pending_payment`, gateway
    /// credentials are configured.
    #[instrument(skip(self), fields(actor = actor.user_id))]
    pub async fn initiate(&self, actor: &Actor, paper_id: i64) -> Result<Checkout> {
        let lock = self.paper_lock(paper_id);
        let _guard = lock.lock().await;

        let result = self.initiate_locked(actor, paper_id).await;
        match &result {
            Ok(checkout) if checkout.reused => metrics::record_payment_initiation("reused"),
            Ok(_) => metrics::record_payment_initiation("created"),
            Err(e) => metrics::record_payment_initiation(&format!("{:?}", e.code())),
        }
        result
    }

    async fn initiate_locked(&self, actor: &Actor, paper_id: i64) -> Result<Checkout> {
        let mut paper = load_paper(&self.store, paper_id).await?;

        if !actor.owns(&paper) {
            return Err(AppError::NotPaperOwner { paper_id });
        }
        if paper.status != PaperStatus::PendingPayment {
            return Err(AppError::PaymentNotAllowed { status: paper.status });
        }

        let settings = self.store.load_settings().await?;
        let credentials = settings.gateway_credentials().ok_or(AppError::GatewayNotConfigured)?;

        let now = Utc::now();
        if paper.has_open_checkout(now) {
            if let (Some(session_id), Some(checkout_url)) = (&paper.gateway_session_id, &paper.checkout_url) {
                info!(paper_id, session_id = %session_id, "Reusing open checkout session");
                return Ok(Checkout {
                    paper_id,
                    session_id: session_id.clone(),
                    reference: paper.payment_reference.clone().unwrap_or_default(),
                    checkout_url: checkout_url.clone(),
                    reused: true,
                });
            }
        }

        let owner = load_user(&self.store, paper.owner_id).await?;
        let fee = settings.fee();
        let currency = settings.currency().to_string();
        let reference = format!("{}-{}", paper.registration_id(), now.timestamp());
        let expires_at = now + self.checkout_ttl;

        let request = PurchaseRequest {
            brand_id: credentials.brand_id,
            client: PurchaseClient {
                email: owner.email.clone(),
                full_name: owner.display_name.clone(),
                phone: owner.profile.phone.clone(),
            },
            purchase: PurchaseDetails {
                total: fee,
                currency: currency.clone(),
                products: vec![PurchaseProduct {
                    name: format!("Conference Registration - {}", paper.title),
                    price: fee,
                    quantity: 1,
                }],
            },
            success_redirect: self.redirect_url("success", paper_id),
            failure_redirect: self.redirect_url("failed", paper_id),
            cancel_redirect: self.redirect_url("cancelled", paper_id),
            reference: reference.clone(),
            due: expires_at.timestamp(),
        };

        let purchase = self.gateway.create_purchase(&credentials.api_key, &request).await?;

        self.store
            .insert_transaction(NewPaymentTransaction {
                paper_id,
                user_id: owner.id,
                session_id: purchase.id.clone(),
                reference: reference.clone(),
                amount: fee,
                currency: currency.clone(),
            })
            .await?;

        paper.gateway_session_id = Some(purchase.id.clone());
        paper.payment_reference = Some(reference.clone());
        paper.payment_amount = Some(fee);
        paper.payment_currency = Some(currency);
        paper.checkout_url = Some(purchase.checkout_url.clone());
        paper.checkout_expires_at = Some(expires_at);
        self.store.save_paper(&paper).await?;

        info!(paper_id, session_id = %purchase.id, reference = %reference, "Checkout session created");

        Ok(Checkout {
            paper_id,
            session_id: purchase.id,
            reference,
            checkout_url: purchase.checkout_url,
            reused: false,
        })
    }

    fn redirect_url(&self, outcome: &str, paper_id: i64) -> String {
        format!(
            "{}/participant-dashboard/?payment={}&paper_id={}",
            self.public_url, outcome, paper_id
        )
    }

    // =========================================================================
    // Confirmation
    // =========================================================================

    /// Handle a signed gateway callback.
    ///
    /// The signature is checked before the body is even parsed.
    #[instrument(skip_all)]
    pub async fn handle_webhook(&self, body: &[u8], signature_hex: Option<&str>) -> Result<WebhookOutcome> {
        let result = self.handle_webhook_inner(body, signature_hex).await;
        match &result {
            Ok(outcome) => metrics::record_webhook(outcome.as_str()),
            Err(e) => metrics::record_webhook(&format!("{:?}", e.code())),
        }
        result
    }

    async fn handle_webhook_inner(&self, body: &[u8], signature_hex: Option<&str>) -> Result<WebhookOutcome> {
        let settings = self.store.load_settings().await?;
        let secret = settings.webhook_secret.as_deref().unwrap_or_default();

        match signature_hex {
            Some(sig) if signature::verify(secret, body, sig) => {}
            Some(_) => {
                warn!("Webhook signature mismatch");
                return Err(AppError::InvalidSignature);
            }
            None => {
                warn!("Unsigned webhook");
                return Err(AppError::InvalidSignature);
            }
        }

        let payload: Value = serde_json::from_slice(body).map_err(|_| AppError::InvalidWebhookPayload)?;
        let (session_id, status) = match (
            payload.get("id").and_then(Value::as_str),
            payload.get("status").and_then(Value::as_str),
        ) {
            (Some(id), Some(status)) => (id.to_string(), status.to_string()),
            _ => return Err(AppError::InvalidWebhookPayload),
        };

        let transaction = self
            .store
            .find_transaction_by_session(&session_id)
            .await?
            .ok_or_else(|| AppError::TransactionNotFound {
                session_id: session_id.clone(),
            })?;
        let paper_id = transaction.paper_id;

        if status != STATUS_PAID {
            self.store
                .update_transaction_status(&session_id, &status, Some(payload))
                .await?;
            warn!(paper_id, session_id = %session_id, status = %status, "Non-paid callback recorded, paper unchanged");
            return Ok(WebhookOutcome::Ignored { paper_id, status });
        }

        match self.confirm(&transaction, payload).await? {
            Confirmation::Confirmed(_) | Confirmation::Resumed(_) => Ok(WebhookOutcome::Confirmed { paper_id }),
            Confirmation::AlreadyCompleted(_) => Ok(WebhookOutcome::Duplicate { paper_id }),
            Confirmation::NotPayable(paper) => Ok(WebhookOutcome::Ignored {
                paper_id,
                status: paper.status.as_str().to_string(),
            }),
        }
    }

    /// Poll the gateway for the paper's session and apply a `paid` result
    #[instrument(skip(self), fields(actor = actor.user_id))]
    pub async fn verify(&self, actor: &Actor, paper_id: i64) -> Result<VerifyOutcome> {
        let paper = load_paper(&self.store, paper_id).await?;
        if !actor.can_view(&paper) {
            return Err(AppError::NotPaperOwner { paper_id });
        }

        let session_id = paper.gateway_session_id.clone().ok_or_else(|| AppError::NotFound {
            resource_type: "payment session".to_string(),
            id: paper_id.to_string(),
        })?;

        let settings = self.store.load_settings().await?;
        let credentials = settings.gateway_credentials().ok_or(AppError::GatewayNotConfigured)?;

        let remote = self.gateway.fetch_purchase(&credentials.api_key, &session_id).await?;
        let transaction = self
            .store
            .find_transaction_by_session(&session_id)
            .await?
            .ok_or_else(|| AppError::TransactionNotFound {
                session_id: session_id.clone(),
            })?;

        let paper = if remote.is_paid() {
            self.confirm(&transaction, remote.raw.clone()).await?.into_paper()
        } else {
            self.store
                .update_transaction_status(&session_id, &remote.status, Some(remote.raw.clone()))
                .await?;
            paper
        };

        info!(paper_id, session_id = %session_id, gateway_status = %remote.status, "Payment verified with gateway");

        Ok(VerifyOutcome {
            gateway_status: remote.status,
            paper,
        })
    }

    /// Idempotent confirmation for a `paid` session.
    ///
    /// `pending_payment` papers are marked paid and the receipt is queued;
    /// `paid` papers resume at pass generation without a second receipt;
    /// `completed` papers are left alone.
    async fn confirm(&self, transaction: &PaymentTransaction, payload: Value) -> Result<Confirmation> {
        let paper_id = transaction.paper_id;
        let lock = self.paper_lock(paper_id);
        let _guard = lock.lock().await;

        let mut paper = load_paper(&self.store, paper_id).await?;

        match paper.status {
            PaperStatus::Completed => {
                if !transaction.is_paid() {
                    self.store
                        .update_transaction_status(&transaction.session_id, STATUS_PAID, Some(payload))
                        .await?;
                }
                info!(paper_id, "Duplicate payment confirmation ignored");
                Ok(Confirmation::AlreadyCompleted(paper))
            }
            PaperStatus::Review | PaperStatus::Reject => {
                self.store
                    .update_transaction_status(&transaction.session_id, STATUS_PAID, Some(payload))
                    .await?;
                error!(paper_id, status = %paper.status, "Payment received for a paper that is not awaiting payment");
                Ok(Confirmation::NotPayable(paper))
            }
            PaperStatus::Paid => {
                if !transaction.is_paid() {
                    self.store
                        .update_transaction_status(&transaction.session_id, STATUS_PAID, Some(payload))
                        .await?;
                }
                let owner = load_user(&self.store, paper.owner_id).await?;
                let settings = settings_or_default(&self.store).await;
                info!(paper_id, "Resuming interrupted payment confirmation");
                let paper = self.complete(paper, &owner, &settings).await?;
                Ok(Confirmation::Resumed(paper))
            }
            PaperStatus::PendingPayment => {
                let now = Utc::now();
                paper.status = PaperStatus::Paid;
                paper.paid_at = Some(now);
                paper.payment_method = Some(PAYMENT_METHOD_CHIP.to_string());
                paper.payment_payload = Some(payload.clone());
                paper.gateway_session_id = Some(transaction.session_id.clone());
                paper.payment_reference = Some(transaction.reference.clone());
                paper.payment_amount = Some(transaction.amount);
                paper.payment_currency = Some(transaction.currency.clone());
                let paper = self.store.save_paper(&paper).await?;

                self.store
                    .update_transaction_status(&transaction.session_id, STATUS_PAID, Some(payload))
                    .await?;
                metrics::record_transition(PaperStatus::PendingPayment.as_str(), PaperStatus::Paid.as_str());
                info!(paper_id, session_id = %transaction.session_id, amount = transaction.amount, "Payment confirmed");

                let owner = load_user(&self.store, paper.owner_id).await?;
                let settings = settings_or_default(&self.store).await;
                self.notifier.payment_confirmed(&paper, &owner, &settings).await;

                let paper = self.complete(paper, &owner, &settings).await?;
                Ok(Confirmation::Confirmed(paper))
            }
        }
    }

    /// Generate the pass and advance a paid paper to `completed`
    async fn complete(&self, mut paper: Paper, owner: &User, settings: &ConferenceSettings) -> Result<Paper> {
        paper.pass_html = Some(pass::render_pass(&paper, owner, settings, &self.qr_service_url));
        paper.pass_generated_at = Some(Utc::now());
        paper.status = PaperStatus::Completed;

        let paper = self.store.save_paper(&paper).await?;
        metrics::record_pass_generated();
        metrics::record_transition(PaperStatus::Paid.as_str(), PaperStatus::Completed.as_str());
        info!(paper_id = paper.id, "Participant pass generated");

        Ok(paper)
    }

    // =========================================================================
    // Passes
    // =========================================================================

    /// Stored pass of a completed paper
    pub async fn pass(&self, actor: &Actor, paper_id: i64) -> Result<String> {
        let paper = load_paper(&self.store, paper_id).await?;
        if !actor.can_view(&paper) {
            return Err(AppError::NotPaperOwner { paper_id });
        }

        match (paper.status, paper.pass_html) {
            (PaperStatus::Completed, Some(html)) => Ok(html),
            _ => Err(AppError::NotFound {
                resource_type: "pass".to_string(),
                id: paper_id.to_string(),
            }),
        }
    }

    /// Re-render a paid paper's pass, overwriting the stored one. A paper
    /// left at `paid` is advanced to `completed`.
    #[instrument(skip(self), fields(actor = actor.user_id))]
    pub async fn regenerate_pass(&self, actor: &Actor, paper_id: i64) -> Result<Paper> {
        if !actor.role.can_manage_papers() {
            return Err(AppError::Forbidden {
                message: "Conference manager role required".to_string(),
            });
        }

        let lock = self.paper_lock(paper_id);
        let _guard = lock.lock().await;

        let mut paper = load_paper(&self.store, paper_id).await?;
        let owner = load_user(&self.store, paper.owner_id).await?;
        let settings = settings_or_default(&self.store).await;

        match paper.status {
            PaperStatus::Paid => self.complete(paper, &owner, &settings).await,
            PaperStatus::Completed => {
                paper.pass_html = Some(pass::render_pass(&paper, &owner, &settings, &self.qr_service_url));
                paper.pass_generated_at = Some(Utc::now());
                let paper = self.store.save_paper(&paper).await?;
                metrics::record_pass_generated();
                info!(paper_id, "Participant pass regenerated");
                Ok(paper)
            }
            status => Err(AppError::Validation {
                message: format!("Passes are issued after payment (current status: {})", status),
                field: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{add_user, paper};
    use super::*;
    use crate::domain::{NotificationKind, Role};
    use crate::payments::{FakeGateway, FakeOutcome};
    use crate::store::MemoryStore;

    const SECRET: &str = "whsec_test";

    struct Fixture {
        store: Arc<MemoryStore>,
        gateway: Arc<FakeGateway>,
        service: PaymentService,
        ada: Actor,
    }

    fn configured() -> ConferenceSettings {
        ConferenceSettings {
            chip_brand_id: Some("brand-1".to_string()),
            chip_api_key: Some("sk_test".to_string()),
            webhook_secret: Some(SECRET.to_string()),
            fee_minor: Some(30_000),
            currency: Some("MYR".to_string()),
            ..Default::default()
        }
    }

    fn payment_config() -> PaymentConfig {
        PaymentConfig {
            base_url: "https://gate.test/api/v1".to_string(),
            timeout_secs: 30,
            checkout_ttl_secs: 24 * 60 * 60,
            qr_service_url: "https://qr.test/?data=".to_string(),
        }
    }

    async fn fixture(paper_id: i64, status: PaperStatus) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let ada = add_user(&store, "ada@example.com", Role::Participant).await;
        store.put_paper(paper(paper_id, ada.id, status));
        store.set_settings(configured());

        let gateway = Arc::new(FakeGateway::default());
        let notifier = Notifier::new(store.clone(), "http://localhost:8080");
        let service = PaymentService::new(
            store.clone(),
            notifier,
            gateway.clone(),
            &payment_config(),
            "http://localhost:8080/",
        );

        Fixture {
            store,
            gateway,
            service,
            ada: Actor::new(ada.id, ada.role),
        }
    }

    fn signed(body: &Value) -> (Vec<u8>, String) {
        let bytes = serde_json::to_vec(body).unwrap();
        let sig = signature::sign(SECRET, &bytes);
        (bytes, sig)
    }

    async fn deliver(f: &Fixture, session_id: &str, status: &str) -> Result<WebhookOutcome> {
        let (body, sig) = signed(&serde_json::json!({ "id": session_id, "status": status }));
        f.service.handle_webhook(&body, Some(&sig)).await
    }

    fn emails(store: &MemoryStore, kind: NotificationKind) -> usize {
        store.notifications().iter().filter(|n| n.kind == kind).count()
    }

    #[tokio::test]
    async fn test_paper_42_end_to_end() {
        let f = fixture(42, PaperStatus::PendingPayment).await;

        let checkout = f.service.initiate(&f.ada, 42).await.unwrap();
        assert!(checkout.reference.contains("42"));
        assert!(checkout.reference.starts_with("PAPER-42-"));
        assert_eq!(checkout.checkout_url, "https://gate.test/p/purch_1/");

        let (api_key, request) = f.gateway.requests().remove(0);
        assert_eq!(api_key, "sk_test");
        assert_eq!(request.brand_id, "brand-1");
        assert_eq!(request.purchase.total, 30_000);
        assert_eq!(request.purchase.products[0].name, "Conference Registration - Borrow Checking in Practice");
        assert_eq!(
            request.success_redirect,
            "http://localhost:8080/participant-dashboard/?payment=success&paper_id=42"
        );

        let stored = f.store.find_paper(42).await.unwrap().unwrap();
        assert_eq!(stored.gateway_session_id.as_deref(), Some("purch_1"));

        let outcome = deliver(&f, "purch_1", "paid").await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Confirmed { paper_id: 42 });

        let paper = f.store.find_paper(42).await.unwrap().unwrap();
        assert_eq!(paper.status, PaperStatus::Completed);
        assert_eq!(paper.payment_amount, Some(30_000));
        assert_eq!(paper.payment_method.as_deref(), Some("chip"));
        assert!(paper.paid_at.is_some());
        assert!(paper.pass_html.as_deref().is_some_and(|h| h.contains("PAPER-42")));
        assert_eq!(emails(&f.store, NotificationKind::PaymentConfirmation), 1);
        assert!(f.store.transactions()[0].is_paid());
    }

    #[tokio::test]
    async fn test_duplicate_paid_delivery() {
        let f = fixture(5, PaperStatus::PendingPayment).await;
        f.service.initiate(&f.ada, 5).await.unwrap();

        deliver(&f, "purch_1", "paid").await.unwrap();
        let first_pass = f.store.find_paper(5).await.unwrap().unwrap().pass_generated_at;

        let again = deliver(&f, "purch_1", "paid").await.unwrap();

        assert_eq!(again, WebhookOutcome::Duplicate { paper_id: 5 });
        assert_eq!(emails(&f.store, NotificationKind::PaymentConfirmation), 1);
        assert_eq!(f.store.find_paper(5).await.unwrap().unwrap().pass_generated_at, first_pass);
    }

    #[tokio::test]
    async fn test_resume_from_paid_without_second_email() {
        let f = fixture(6, PaperStatus::PendingPayment).await;
        f.service.initiate(&f.ada, 6).await.unwrap();

        // Interrupted delivery: paid but no pass
        let mut stuck = f.store.find_paper(6).await.unwrap().unwrap();
        stuck.status = PaperStatus::Paid;
        f.store.put_paper(stuck);

        let outcome = deliver(&f, "purch_1", "paid").await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Confirmed { paper_id: 6 });
        let paper = f.store.find_paper(6).await.unwrap().unwrap();
        assert_eq!(paper.status, PaperStatus::Completed);
        assert!(paper.pass_html.is_some());
        assert_eq!(emails(&f.store, NotificationKind::PaymentConfirmation), 0);
    }

    #[tokio::test]
    async fn test_initiation_preconditions_skip_gateway() {
        let f = fixture(1, PaperStatus::PendingPayment).await;
        let eve = add_user(&f.store, "eve@example.com", Role::Participant).await;
        f.store.put_paper(paper(2, f.ada.user_id, PaperStatus::Review));

        let err = f.service.initiate(&f.ada, 99).await.unwrap_err();
        assert!(matches!(err, AppError::PaperNotFound { id: 99 }));

        let err = f.service.initiate(&Actor::new(eve.id, eve.role), 1).await.unwrap_err();
        assert!(matches!(err, AppError::NotPaperOwner { paper_id: 1 }));

        let err = f.service.initiate(&f.ada, 2).await.unwrap_err();
        assert!(matches!(err, AppError::PaymentNotAllowed { status: PaperStatus::Review }));

        f.store.set_settings(ConferenceSettings {
            chip_api_key: None,
            ..configured()
        });
        let err = f.service.initiate(&f.ada, 1).await.unwrap_err();
        assert!(matches!(err, AppError::GatewayNotConfigured));

        assert_eq!(f.gateway.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_open_session_is_reused() {
        let f = fixture(3, PaperStatus::PendingPayment).await;

        let (a, b) = tokio::join!(f.service.initiate(&f.ada, 3), f.service.initiate(&f.ada, 3));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(f.gateway.create_calls(), 1);
        assert_eq!(a.checkout_url, b.checkout_url);
        assert!(a.reused != b.reused);
        assert_eq!(f.store.transactions().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_session_is_replaced() {
        let f = fixture(3, PaperStatus::PendingPayment).await;
        f.service.initiate(&f.ada, 3).await.unwrap();

        let mut expired = f.store.find_paper(3).await.unwrap().unwrap();
        expired.checkout_expires_at = Some(Utc::now() - Duration::minutes(1));
        f.store.put_paper(expired);

        let second = f.service.initiate(&f.ada, 3).await.unwrap();

        assert!(!second.reused);
        assert_eq!(second.session_id, "purch_2");
        assert_eq!(f.gateway.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_gateway_failures_leave_paper_untouched() {
        let f = fixture(4, PaperStatus::PendingPayment).await;

        f.gateway.set_outcome(FakeOutcome::Unreachable);
        let err = f.service.initiate(&f.ada, 4).await.unwrap_err();
        assert!(matches!(err, AppError::GatewayUnreachable { .. }));

        f.gateway.set_outcome(FakeOutcome::Rejected("Invalid brand".to_string()));
        match f.service.initiate(&f.ada, 4).await {
            Err(AppError::PaymentGateway { message }) => assert_eq!(message, "Invalid brand"),
            other => panic!("expected gateway error, got {:?}", other),
        }

        let paper = f.store.find_paper(4).await.unwrap().unwrap();
        assert!(paper.gateway_session_id.is_none());
        assert!(f.store.transactions().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_signature_checked_first() {
        let f = fixture(8, PaperStatus::PendingPayment).await;
        let body = br#"{"id":"purch_1","status":"paid"}"#;

        let err = f.service.handle_webhook(body, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature));

        let forged = signature::sign("wrong", body);
        let err = f.service.handle_webhook(body, Some(&forged)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature));

        f.store.set_settings(ConferenceSettings {
            webhook_secret: None,
            ..configured()
        });
        let sig = signature::sign(SECRET, body);
        let err = f.service.handle_webhook(body, Some(&sig)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_callbacks() {
        let f = fixture(9, PaperStatus::PendingPayment).await;

        let (body, sig) = signed(&serde_json::json!({ "id": "purch_1" }));
        let err = f.service.handle_webhook(&body, Some(&sig)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidWebhookPayload));

        let garbage = b"not json";
        let sig = signature::sign(SECRET, garbage);
        let err = f.service.handle_webhook(garbage, Some(&sig)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidWebhookPayload));

        let err = deliver(&f, "purch_missing", "paid").await.unwrap_err();
        assert!(matches!(err, AppError::TransactionNotFound { .. }));

        let paper = f.store.find_paper(9).await.unwrap().unwrap();
        assert_eq!(paper.status, PaperStatus::PendingPayment);
        assert!(f.store.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_non_paid_status_only_touches_transaction() {
        let f = fixture(10, PaperStatus::PendingPayment).await;
        f.service.initiate(&f.ada, 10).await.unwrap();
        let before = f.store.find_paper(10).await.unwrap().unwrap();

        let outcome = deliver(&f, "purch_1", "expired").await.unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Ignored {
                paper_id: 10,
                status: "expired".to_string()
            }
        );
        assert_eq!(f.store.find_paper(10).await.unwrap().unwrap(), before);
        assert_eq!(f.store.transactions()[0].status, "expired");
        assert!(f.store.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_verify_reconciles_missed_webhook() {
        let f = fixture(11, PaperStatus::PendingPayment).await;
        f.service.initiate(&f.ada, 11).await.unwrap();

        let pending = f.service.verify(&f.ada, 11).await.unwrap();
        assert_eq!(pending.gateway_status, "created");
        assert_eq!(pending.paper.status, PaperStatus::PendingPayment);

        f.gateway.set_remote_status("paid");
        let paid = f.service.verify(&f.ada, 11).await.unwrap();

        assert_eq!(paid.paper.status, PaperStatus::Completed);
        assert_eq!(f.gateway.fetch_calls(), 2);
        assert_eq!(emails(&f.store, NotificationKind::PaymentConfirmation), 1);
    }

    #[tokio::test]
    async fn test_pass_access_and_regeneration() {
        let f = fixture(12, PaperStatus::PendingPayment).await;
        let chair = add_user(&f.store, "chair@example.com", Role::ConferenceManager).await;
        let chair = Actor::new(chair.id, chair.role);

        let err = f.service.pass(&f.ada, 12).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
        let err = f.service.regenerate_pass(&chair, 12).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        f.service.initiate(&f.ada, 12).await.unwrap();
        deliver(&f, "purch_1", "paid").await.unwrap();
        assert!(f.service.pass(&f.ada, 12).await.unwrap().contains("PAPER-12"));

        f.store.set_settings(ConferenceSettings {
            conference_name: Some("RustConf Asia".to_string()),
            ..configured()
        });
        let err = f.service.regenerate_pass(&f.ada, 12).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));

        let paper = f.service.regenerate_pass(&chair, 12).await.unwrap();
        assert!(paper.pass_html.unwrap().contains("RustConf Asia"));
        assert!(f.service.pass(&chair, 12).await.unwrap().contains("RustConf Asia"));
    }
}
