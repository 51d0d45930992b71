//! Core domain types
//!
//! Papers and their lifecycle, users and roles, payment transactions,
//! outbox notifications and conference settings.

mod money;
mod notification;
mod paper;
mod payment;
mod settings;
mod user;

pub use money::{format_minor_units, parse_minor_units};
pub use notification::{NewNotification, Notification, NotificationKind, NotificationStatus};
pub use paper::{NewPaper, Paper, PaperFilter, PaperStatus};
pub use payment::{NewPaymentTransaction, PaymentTransaction, PAYMENT_METHOD_CHIP, STATUS_PAID, STATUS_PENDING};
pub use settings::{ConferenceSettings, GatewayCredentials, SECRET_MASK};
pub use user::{NewUser, Profile, Role, User};

pub mod keys {
    //! Persisted setting keys
    pub use super::settings::{
        KEY_CHIP_API_KEY, KEY_CHIP_BRAND_ID, KEY_CONFERENCE_DATE, KEY_CONFERENCE_NAME,
        KEY_CONFERENCE_VENUE, KEY_CURRENCY, KEY_NOTIFICATION_EMAIL, KEY_PAYMENT_AMOUNT,
        KEY_WEBHOOK_SECRET,
    };
}
