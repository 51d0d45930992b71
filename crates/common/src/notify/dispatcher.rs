//! Outbox dispatcher
//!
//! Claims due notifications, sends them, and records the outcome. A send
//! gets a short in-process backoff first; if that still fails the row is
//! rescheduled with an exponential delay until `max_attempts` is reached.
//!
//! Every send is bounded, so a batch has a worst-case duration. Rows are
//! claimed for at least that long; another worker cannot pick them up while
//! this one may still be sending.

use crate::config::NotificationConfig;
use crate::domain::Notification;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::notify::Mailer;
use crate::store::{OutboxStore, SharedStore};
use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Ceiling on the delay between persisted retries
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60 * 60);

/// Time budget for in-process retries of a single send
pub const DEFAULT_SEND_BUDGET: Duration = Duration::from_secs(10);

/// Deadline for one SMTP conversation
pub const SEND_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(20);

/// Longest pause the in-process backoff inserts between attempts
const MAX_BACKOFF_INTERVAL: Duration = Duration::from_secs(2);

/// Slack added on top of the worst-case batch duration
const LEASE_MARGIN: Duration = Duration::from_secs(60);

/// Persisted retry schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &NotificationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_secs(config.base_delay_secs),
        }
    }

    /// Delay before the next attempt once `attempts` have failed:
    /// `base_delay * 2^attempts`, capped at one hour
    pub fn delay_for(&self, attempts: i32) -> Duration {
        let exponent = attempts.clamp(0, 20) as u32;
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }

    pub fn is_exhausted(&self, attempts: i32) -> bool {
        attempts >= self.max_attempts
    }
}

/// What one poll did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub claimed: usize,
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
}

pub struct OutboxDispatcher {
    store: SharedStore,
    mailer: Arc<dyn Mailer>,
    policy: RetryPolicy,
    batch_size: u64,
    send_budget: Duration,
    attempt_timeout: Duration,
}

impl OutboxDispatcher {
    pub fn new(store: SharedStore, mailer: Arc<dyn Mailer>, config: &NotificationConfig) -> Self {
        Self {
            store,
            mailer,
            policy: RetryPolicy::from_config(config),
            batch_size: config.batch_size.max(1),
            send_budget: DEFAULT_SEND_BUDGET,
            attempt_timeout: SEND_ATTEMPT_TIMEOUT,
        }
    }

    /// Override the in-process retry budget (zero means a single try)
    pub fn with_send_budget(mut self, budget: Duration) -> Self {
        self.send_budget = budget;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Upper bound on `deliver` for one row
    pub fn row_deadline(&self) -> Duration {
        self.send_budget
            .saturating_add(self.attempt_timeout)
            .saturating_add(MAX_BACKOFF_INTERVAL)
    }

    /// How long a claimed batch stays reserved: every row hitting its
    /// deadline, plus a margin
    pub fn lease(&self) -> Duration {
        let rows = u32::try_from(self.batch_size).unwrap_or(u32::MAX);
        self.row_deadline()
            .checked_mul(rows)
            .unwrap_or(MAX_RETRY_DELAY)
            .saturating_add(LEASE_MARGIN)
    }

    fn lease_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::from_std(self.lease()).unwrap_or_else(|_| chrono::Duration::hours(1))
    }

    /// Claim one batch and process it
    pub async fn run_once(&self) -> Result<DispatchReport> {
        let now = Utc::now();
        let batch = self
            .store
            .claim_due(now, self.batch_size, self.lease_until(now))
            .await?;

        let mut report = DispatchReport {
            claimed: batch.len(),
            ..Default::default()
        };
        metrics::record_outbox_batch(batch.len());

        if batch.is_empty() {
            return Ok(report);
        }
        debug!(claimed = batch.len(), "Claimed notifications");

        for notification in &batch {
            match self.deliver(notification).await {
                Ok(()) => {
                    report.sent += 1;
                    self.on_sent(notification).await;
                }
                Err(message) => {
                    if self.policy.is_exhausted(notification.attempts) {
                        report.failed += 1;
                    } else {
                        report.retried += 1;
                    }
                    self.on_failed(notification, &message).await;
                }
            }
        }

        info!(
            claimed = report.claimed,
            sent = report.sent,
            retried = report.retried,
            failed = report.failed,
            "Outbox batch processed"
        );

        Ok(report)
    }

    async fn deliver(&self, notification: &Notification) -> std::result::Result<(), String> {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(250))
            .with_max_interval(MAX_BACKOFF_INTERVAL)
            .with_max_elapsed_time(Some(self.send_budget))
            .build();

        let attempts = backoff::future::retry(backoff, || async {
            self.send_with_timeout(notification).await.map_err(|e| {
                debug!(id = notification.id, error = %e, "Send attempt failed");
                backoff::Error::transient(e)
            })
        });

        // The backoff only checks its budget between attempts
        match tokio::time::timeout(self.row_deadline(), attempts).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!(
                "Delivery exceeded {}s deadline",
                self.row_deadline().as_secs()
            )),
        }
    }

    async fn send_with_timeout(&self, notification: &Notification) -> Result<()> {
        let send = self
            .mailer
            .send(&notification.recipient, &notification.subject, &notification.body_html);

        tokio::time::timeout(self.attempt_timeout, send)
            .await
            .map_err(|_| AppError::Mail {
                message: format!("Send timed out after {}ms", self.attempt_timeout.as_millis()),
            })?
    }

    async fn on_sent(&self, notification: &Notification) {
        let kind = notification.kind.as_str();
        metrics::record_delivery(kind, true, false);
        info!(id = notification.id, kind = kind, recipient = %notification.recipient, "Email sent");

        if let Err(e) = self.store.mark_sent(notification.id, Utc::now()).await {
            error!(id = notification.id, error = %e, "Failed to mark notification sent");
        }
    }

    async fn on_failed(&self, notification: &Notification, message: &str) {
        let kind = notification.kind.as_str();

        let result = if self.policy.is_exhausted(notification.attempts) {
            metrics::record_delivery(kind, false, false);
            error!(
                id = notification.id,
                kind = kind,
                attempts = notification.attempts,
                error = %message,
                "Email delivery failed permanently"
            );
            self.store.mark_failed(notification.id, message).await
        } else {
            let delay = self.policy.delay_for(notification.attempts);
            let next_attempt_at = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1));

            metrics::record_delivery(kind, false, true);
            warn!(
                id = notification.id,
                kind = kind,
                attempts = notification.attempts,
                retry_in_secs = delay.as_secs(),
                error = %message,
                "Email delivery failed, rescheduled"
            );
            self.store.mark_retry(notification.id, message, next_attempt_at).await
        };

        if let Err(e) = result {
            error!(id = notification.id, error = %e, "Failed to record delivery failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewNotification, NotificationKind, NotificationStatus};
    use crate::notify::RecordingMailer;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    /// Accepts the connection and never answers
    struct StalledMailer;

    #[async_trait]
    impl Mailer for StalledMailer {
        async fn send(&self, _to: &str, _subject: &str, _body_html: &str) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn config(max_attempts: i32) -> NotificationConfig {
        NotificationConfig {
            max_attempts,
            base_delay_secs: 30,
            ..NotificationConfig::default()
        }
    }

    async fn enqueue(store: &MemoryStore, recipient: &str) {
        store
            .enqueue(NewNotification {
                kind: NotificationKind::Acceptance,
                paper_id: Some(1),
                recipient: recipient.to_string(),
                subject: "Accepted".to_string(),
                body_html: "<p>hi</p>".to_string(),
            })
            .await
            .unwrap();
    }

    fn dispatcher(store: &Arc<MemoryStore>, mailer: &Arc<RecordingMailer>, max_attempts: i32) -> OutboxDispatcher {
        OutboxDispatcher::new(store.clone(), mailer.clone(), &config(max_attempts))
            .with_send_budget(Duration::ZERO)
    }

    #[test]
    fn test_retry_schedule() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(30),
        };

        assert_eq!(policy.delay_for(0), Duration::from_secs(30));
        assert_eq!(policy.delay_for(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for(3), Duration::from_secs(240));
        assert_eq!(policy.delay_for(7), MAX_RETRY_DELAY);
        assert_eq!(policy.delay_for(1000), MAX_RETRY_DELAY);

        assert!(!policy.is_exhausted(4));
        assert!(policy.is_exhausted(5));
    }

    #[tokio::test]
    async fn test_sends_pending_notifications() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        enqueue(&store, "a@example.com").await;
        enqueue(&store, "b@example.com").await;

        let report = dispatcher(&store, &mailer, 5).run_once().await.unwrap();

        assert_eq!(report.sent, 2);
        assert_eq!(mailer.sent().len(), 2);
        assert!(store
            .notifications()
            .iter()
            .all(|n| n.status == NotificationStatus::Sent && n.sent_at.is_some()));

        // Nothing left to claim
        let report = dispatcher(&store, &mailer, 5).run_once().await.unwrap();
        assert_eq!(report.claimed, 0);
    }

    #[tokio::test]
    async fn test_failed_send_is_rescheduled_with_backoff() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        mailer.fail_next(1);
        enqueue(&store, "a@example.com").await;

        let before = Utc::now();
        let report = dispatcher(&store, &mailer, 5).run_once().await.unwrap();
        assert_eq!(report.retried, 1);

        let n = &store.notifications()[0];
        assert_eq!(n.status, NotificationStatus::Pending);
        assert_eq!(n.attempts, 1);
        assert!(n.last_error.as_deref().unwrap_or_default().contains("connection refused"));
        // 30s * 2^1
        assert!(n.next_attempt_at >= before + chrono::Duration::seconds(60));

        // Not due yet
        let report = dispatcher(&store, &mailer, 5).run_once().await.unwrap();
        assert_eq!(report.claimed, 0);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        mailer.fail_next(10);
        enqueue(&store, "a@example.com").await;

        let report = dispatcher(&store, &mailer, 1).run_once().await.unwrap();
        assert_eq!(report.failed, 1);

        let n = &store.notifications()[0];
        assert_eq!(n.status, NotificationStatus::Failed);
        assert!(mailer.sent().is_empty());
    }

    #[test]
    fn test_lease_covers_worst_case_batch() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        let config = NotificationConfig {
            batch_size: 20,
            ..NotificationConfig::default()
        };
        let dispatcher = OutboxDispatcher::new(store, mailer, &config);

        let per_row = DEFAULT_SEND_BUDGET + SEND_ATTEMPT_TIMEOUT;
        assert!(dispatcher.row_deadline() >= per_row);
        assert!(dispatcher.lease() >= per_row * 20);
        assert!(dispatcher.lease() > dispatcher.row_deadline() * 20);
    }

    #[tokio::test]
    async fn test_claimed_rows_stay_leased_for_the_batch() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        enqueue(&store, "a@example.com").await;

        let dispatcher = dispatcher(&store, &mailer, 5);
        let lease = chrono::Duration::from_std(dispatcher.lease()).unwrap();

        let now = Utc::now();
        let claimed = store.claim_due(now, 10, dispatcher.lease_until(now)).await.unwrap();
        assert_eq!(claimed.len(), 1);

        // A second worker sees nothing until the lease runs out
        let later = now + lease - chrono::Duration::seconds(1);
        assert!(store.claim_due(later, 10, later).await.unwrap().is_empty());

        let expired = now + lease + chrono::Duration::seconds(1);
        let reclaimed = store.claim_due(expired, 10, expired).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_stalled_send_times_out_and_is_rescheduled() {
        let store = Arc::new(MemoryStore::new());
        enqueue(&store, "a@example.com").await;

        let dispatcher = OutboxDispatcher::new(store.clone(), Arc::new(StalledMailer), &config(5))
            .with_send_budget(Duration::ZERO)
            .with_attempt_timeout(Duration::from_millis(50));

        let report = dispatcher.run_once().await.unwrap();
        assert_eq!(report.retried, 1);

        let n = &store.notifications()[0];
        assert_eq!(n.status, NotificationStatus::Pending);
        assert!(n.last_error.as_deref().unwrap_or_default().contains("timed out"));
    }
}
