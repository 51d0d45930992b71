//! Paper record and its lifecycle status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a submitted paper
///
/// ```text
/// review ──accept──▶ pending_payment ──gateway──▶ paid ──pass──▶ completed
///    └────reject───▶ reject
/// ```
///
/// `reject` and `completed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperStatus {
    Review,
    PendingPayment,
    Paid,
    Completed,
    Reject,
}

impl PaperStatus {
    pub const ALL: [PaperStatus; 5] = [
        PaperStatus::Review,
        PaperStatus::PendingPayment,
        PaperStatus::Paid,
        PaperStatus::Completed,
        PaperStatus::Reject,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaperStatus::Review => "review",
            PaperStatus::PendingPayment => "pending_payment",
            PaperStatus::Paid => "paid",
            PaperStatus::Completed => "completed",
            PaperStatus::Reject => "reject",
        }
    }

    /// Decode a stored status. Missing or unknown values read back as `review`.
    pub fn from_stored(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("pending_payment") => PaperStatus::PendingPayment,
            Some("paid") => PaperStatus::Paid,
            Some("completed") => PaperStatus::Completed,
            Some("reject") => PaperStatus::Reject,
            _ => PaperStatus::Review,
        }
    }

    /// Parse a status requested by a caller. `accept` is an alias of
    /// `pending_payment`.
    pub fn parse_requested(value: &str) -> Option<Self> {
        match value.trim() {
            "review" => Some(PaperStatus::Review),
            "accept" | "pending_payment" => Some(PaperStatus::PendingPayment),
            "paid" => Some(PaperStatus::Paid),
            "completed" => Some(PaperStatus::Completed),
            "reject" => Some(PaperStatus::Reject),
            _ => None,
        }
    }

    /// Statuses reachable from this one in a single step
    pub fn allowed_next(&self) -> &'static [PaperStatus] {
        match self {
            PaperStatus::Review => &[PaperStatus::PendingPayment, PaperStatus::Reject],
            PaperStatus::PendingPayment => &[PaperStatus::Paid],
            PaperStatus::Paid => &[PaperStatus::Completed],
            PaperStatus::Completed | PaperStatus::Reject => &[],
        }
    }

    pub fn can_transition_to(&self, next: PaperStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }

    /// Statuses a reviewer may request directly; the rest are reached
    /// through payment confirmation.
    pub fn is_review_decision(&self) -> bool {
        matches!(self, PaperStatus::PendingPayment | PaperStatus::Reject)
    }

    /// Human-readable label used in emails and listings
    pub fn label(&self) -> &'static str {
        match self {
            PaperStatus::Review => "Under Review",
            PaperStatus::PendingPayment => "Pending Payment",
            PaperStatus::Paid => "Paid",
            PaperStatus::Completed => "Completed",
            PaperStatus::Reject => "Rejected",
        }
    }
}

impl Default for PaperStatus {
    fn default() -> Self {
        PaperStatus::Review
    }
}

impl fmt::Display for PaperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted conference paper
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub description: String,
    pub author_name: String,
    pub co_authors: String,
    pub document_url: String,
    pub submitted_at: DateTime<Utc>,
    pub status: PaperStatus,

    /// Fee charged for this paper, in minor currency units
    pub payment_amount: Option<i64>,
    pub payment_currency: Option<String>,
    pub payment_reference: Option<String>,
    pub gateway_session_id: Option<String>,
    pub checkout_url: Option<String>,
    pub checkout_expires_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub payment_payload: Option<serde_json::Value>,

    pub pass_html: Option<String>,
    pub pass_generated_at: Option<DateTime<Utc>>,

    pub updated_at: DateTime<Utc>,
}

impl Paper {
    /// Registration identifier printed on passes and gateway references
    pub fn registration_id(&self) -> String {
        format!("PAPER-{}", self.id)
    }

    /// True when the paper holds a checkout session that has not expired yet
    pub fn has_open_checkout(&self, now: DateTime<Utc>) -> bool {
        match (&self.gateway_session_id, &self.checkout_url, self.checkout_expires_at) {
            (Some(_), Some(_), Some(expires)) => expires > now,
            _ => false,
        }
    }
}

/// Fields supplied when a paper is first stored
#[derive(Clone, Debug)]
pub struct NewPaper {
    pub owner_id: i64,
    pub title: String,
    pub description: String,
    pub author_name: String,
    pub co_authors: String,
    pub document_url: String,
    pub submitted_at: DateTime<Utc>,
}

/// Filter for paper listings
#[derive(Clone, Debug, Default)]
pub struct PaperFilter {
    pub owner_id: Option<i64>,
    pub status: Option<PaperStatus>,
}
