//! Email transports

use crate::config::SmtpConfig;
use crate::errors::{AppError, Result};
use crate::notify::SEND_ATTEMPT_TIMEOUT;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

/// Delivers one rendered email
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body_html: &str) -> Result<()>;
}

/// SMTP delivery through lettre's pooled async transport
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_email)
            .parse()
            .map_err(|e| AppError::Configuration {
                message: format!("Invalid from address: {}", e),
            })?;

        let mut builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host).map_err(|e| {
                AppError::Configuration {
                    message: format!("Failed to create SMTP transport: {}", e),
                }
            })?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        }
        .port(config.port)
        .timeout(Some(SEND_ATTEMPT_TIMEOUT));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body_html: &str) -> Result<()> {
        let recipient: Mailbox = to.parse().map_err(|e| AppError::Mail {
            message: format!("Invalid recipient {}: {}", to, e),
        })?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body_html.to_string())
            .map_err(|e| AppError::Mail {
                message: format!("Failed to build message: {}", e),
            })?;

        self.transport.send(message).await.map_err(|e| AppError::Mail {
            message: format!("Failed to send email: {}", e),
        })?;

        Ok(())
    }
}

/// Logs instead of sending; used when SMTP is disabled
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body_html: &str) -> Result<()> {
        info!(to = %to, subject = %subject, bytes = body_html.len(), "SMTP disabled, email logged only");
        Ok(())
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use recording::{RecordingMailer, SentEmail};

#[cfg(any(test, feature = "test-util"))]
mod recording {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentEmail {
        pub to: String,
        pub subject: String,
        pub body_html: String,
    }

    /// Captures sends; can be told to fail the next N attempts
    #[derive(Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<SentEmail>>,
        failures_left: AtomicUsize,
        attempts: AtomicUsize,
    }

    impl RecordingMailer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_next(&self, n: usize) {
            self.failures_left.store(n, Ordering::SeqCst);
        }

        pub fn sent(&self) -> Vec<SentEmail> {
            self.sent.lock().unwrap().clone()
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, body_html: &str) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);

            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(AppError::Mail {
                    message: "connection refused".to_string(),
                });
            }

            self.sent.lock().unwrap().push(SentEmail {
                to: to.to_string(),
                subject: subject.to_string(),
                body_html: body_html.to_string(),
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smtp_mailer_rejects_bad_from() {
        let config = SmtpConfig {
            from_email: "not an address".into(),
            ..SmtpConfig::default()
        };
        assert!(matches!(
            SmtpMailer::from_config(&config),
            Err(AppError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_recording_mailer_fails_then_recovers() {
        let mailer = RecordingMailer::new();
        mailer.fail_next(1);

        assert!(mailer.send("a@example.com", "s", "b").await.is_err());
        assert!(mailer.send("a@example.com", "s", "b").await.is_ok());
        assert_eq!(mailer.attempts(), 2);
        assert_eq!(mailer.sent().len(), 1);
    }
}
