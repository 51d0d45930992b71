//! Outbox notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which transactional email a notification carries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SubmissionReceived,
    Acceptance,
    Rejection,
    PaymentConfirmation,
    NewSubmissionAlert,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::SubmissionReceived => "submission_received",
            NotificationKind::Acceptance => "acceptance",
            NotificationKind::Rejection => "rejection",
            NotificationKind::PaymentConfirmation => "payment_confirmation",
            NotificationKind::NewSubmissionAlert => "new_submission_alert",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "submission_received" => Some(NotificationKind::SubmissionReceived),
            "acceptance" => Some(NotificationKind::Acceptance),
            "rejection" => Some(NotificationKind::Rejection),
            "payment_confirmation" => Some(NotificationKind::PaymentConfirmation),
            "new_submission_alert" => Some(NotificationKind::NewSubmissionAlert),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sending => "sending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }

    pub fn from_stored(value: &str) -> Self {
        match value {
            "sending" => NotificationStatus::Sending,
            "sent" => NotificationStatus::Sent,
            "failed" => NotificationStatus::Failed,
            _ => NotificationStatus::Pending,
        }
    }
}

/// A rendered email waiting in (or delivered from) the outbox
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub kind: NotificationKind,
    pub paper_id: Option<i64>,
    pub recipient: String,
    pub subject: String,
    pub body_html: String,
    pub status: NotificationStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub paper_id: Option<i64>,
    pub recipient: String,
    pub subject: String,
    pub body_html: String,
}
