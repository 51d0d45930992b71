//! PaperDesk Mailer
//!
//! Drains the notification outbox:
//! 1. Claims a batch of due emails
//! 2. Sends each through SMTP (or the log transport when SMTP is off)
//! 3. Marks rows sent, or reschedules them with exponential backoff
//!
//! Run `mailer once` to process a single batch and exit.

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use paperdesk_common::{
    config::AppConfig,
    db::{DbPool, Repository},
    metrics,
    notify::{LogMailer, Mailer, OutboxDispatcher, SmtpMailer},
    store::SharedStore,
    VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const MAX_FAILURES: u32 = 5;
const CIRCUIT_BREAK_DURATION: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.observability.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .json()
        .init();

    info!("Starting PaperDesk Mailer v{}", VERSION);

    if config.observability.metrics_port != 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
    }
    metrics::register_metrics();

    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let store: SharedStore = Arc::new(Repository::new(db));

    let mailer: Arc<dyn Mailer> = if config.smtp.enabled {
        info!(host = %config.smtp.host, port = config.smtp.port, "SMTP transport enabled");
        Arc::new(SmtpMailer::from_config(&config.smtp)?)
    } else {
        warn!("SMTP disabled, emails will only be logged");
        Arc::new(LogMailer)
    };

    let dispatcher = OutboxDispatcher::new(store, mailer, &config.notifications);
    let poll_interval = Duration::from_secs(config.notifications.poll_interval_secs.max(1));

    if std::env::args().nth(1).as_deref() == Some("once") {
        let report = dispatcher.run_once().await?;
        println!(
            "claimed={} sent={} retried={} failed={}",
            report.claimed, report.sent, report.retried, report.failed
        );
        return Ok(());
    }

    info!(
        poll_interval_secs = poll_interval.as_secs(),
        batch_size = config.notifications.batch_size,
        max_attempts = config.notifications.max_attempts,
        "Mailer ready, polling outbox..."
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // Circuit breaker state
    let mut consecutive_failures = 0;

    while !*shutdown_rx.borrow() {
        if consecutive_failures >= MAX_FAILURES {
            warn!(failures = consecutive_failures, "Circuit breaker open, pausing...");
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = tokio::time::sleep(CIRCUIT_BREAK_DURATION) => {}
            }
            consecutive_failures = 0;
            info!("Circuit breaker reset, resuming...");
        }

        // A claimed batch always runs to completion
        match dispatcher.run_once().await {
            Ok(report) => {
                consecutive_failures = 0;
                // Keep draining while batches come back full
                if report.claimed as u64 >= config.notifications.batch_size.max(1) {
                    continue;
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                error!(error = %e, failures = consecutive_failures, "Failed to poll outbox");
            }
        }

        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    info!("Mailer shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, finishing current batch..."),
        _ = terminate => info!("Received SIGTERM, finishing current batch..."),
    }
}
