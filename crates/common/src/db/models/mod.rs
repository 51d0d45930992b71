//! SeaORM entity models
//!
//! Each entity converts into its domain type; stored status strings decode
//! leniently so unknown values never fail a read.

mod notification;
mod paper;
mod payment_transaction;
mod setting;
mod user;

pub use paper::{
    Entity as PaperEntity,
    Model as PaperRow,
    ActiveModel as PaperActiveModel,
    Column as PaperColumn,
};

pub use user::{
    Entity as UserEntity,
    Model as UserRow,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
};

pub use payment_transaction::{
    Entity as PaymentTransactionEntity,
    Model as PaymentTransactionRow,
    ActiveModel as PaymentTransactionActiveModel,
    Column as PaymentTransactionColumn,
};

pub use notification::{
    Entity as NotificationEntity,
    Model as NotificationRow,
    ActiveModel as NotificationActiveModel,
    Column as NotificationColumn,
};

pub use setting::{
    Entity as SettingEntity,
    Model as SettingRow,
    ActiveModel as SettingActiveModel,
    Column as SettingColumn,
};
