//! PaperDesk Common Library
//!
//! Shared code for the PaperDesk gateway and mailer including:
//! - Domain types and the paper status engine
//! - Database models and repository patterns
//! - Paper, payment and pass workflows
//! - CHIP payment gateway client and webhook signatures
//! - Email templates, outbox notifier and dispatcher
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod documents;
pub mod domain;
pub mod errors;
pub mod metrics;
pub mod notify;
pub mod payments;
pub mod store;
pub mod workflow;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::Repository;
pub use errors::{AppError, Result};
pub use store::SharedStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
