//! Payment transactions created for checkout sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_PAID: &str = "paid";
pub const PAYMENT_METHOD_CHIP: &str = "chip";

/// One checkout session at the gateway.
///
/// `status` holds whatever the gateway last reported (`pending`, `paid`,
/// `expired`, `error`, ...), verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: i64,
    pub paper_id: i64,
    pub user_id: i64,
    pub session_id: String,
    pub reference: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub payment_method: String,
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    pub fn is_paid(&self) -> bool {
        self.status == STATUS_PAID
    }
}

#[derive(Clone, Debug)]
pub struct NewPaymentTransaction {
    pub paper_id: i64,
    pub user_id: i64,
    pub session_id: String,
    pub reference: String,
    pub amount: i64,
    pub currency: String,
}
