//! Metrics and observability utilities
//!
//! Prometheus metrics for HTTP traffic, the paper workflow, payment gateway
//! calls and email delivery, with standardized naming.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all PaperDesk metrics
pub const METRICS_PREFIX: &str = "paperdesk";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

/// Buckets for payment gateway calls (30s client timeout)
pub const GATEWAY_BUCKETS: &[f64] = &[
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Workflow metrics
    describe_counter!(
        format!("{}_papers_submitted_total", METRICS_PREFIX),
        Unit::Count,
        "Total papers submitted"
    );

    describe_counter!(
        format!("{}_status_transitions_total", METRICS_PREFIX),
        Unit::Count,
        "Paper status transitions by source and target status"
    );

    describe_counter!(
        format!("{}_passes_generated_total", METRICS_PREFIX),
        Unit::Count,
        "Participant passes generated"
    );

    // Payment metrics
    describe_counter!(
        format!("{}_payment_initiations_total", METRICS_PREFIX),
        Unit::Count,
        "Checkout initiations by outcome"
    );

    describe_histogram!(
        format!("{}_gateway_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Payment gateway call latency in seconds"
    );

    describe_counter!(
        format!("{}_webhooks_total", METRICS_PREFIX),
        Unit::Count,
        "Gateway callbacks by outcome"
    );

    // Email metrics
    describe_counter!(
        format!("{}_notifications_enqueued_total", METRICS_PREFIX),
        Unit::Count,
        "Emails written to the outbox"
    );

    describe_counter!(
        format!("{}_notifications_sent_total", METRICS_PREFIX),
        Unit::Count,
        "Emails delivered"
    );

    describe_counter!(
        format!("{}_notifications_failed_total", METRICS_PREFIX),
        Unit::Count,
        "Email attempts that failed, by whether they will be retried"
    );

    describe_gauge!(
        format!("{}_outbox_batch_size", METRICS_PREFIX),
        Unit::Count,
        "Notifications claimed in the last outbox poll"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

pub fn record_submission() {
    counter!(format!("{}_papers_submitted_total", METRICS_PREFIX)).increment(1);
}

pub fn record_transition(from: &str, to: &str) {
    counter!(
        format!("{}_status_transitions_total", METRICS_PREFIX),
        "from" => from.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

pub fn record_pass_generated() {
    counter!(format!("{}_passes_generated_total", METRICS_PREFIX)).increment(1);
}

/// Record a checkout initiation; `outcome` is `created`, `reused` or an error code
pub fn record_payment_initiation(outcome: &str) {
    counter!(
        format!("{}_payment_initiations_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record one call to the payment gateway
pub fn record_gateway_call(operation: &str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    histogram!(
        format!("{}_gateway_request_duration_seconds", METRICS_PREFIX),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .record(duration_secs);
}

pub fn record_webhook(outcome: &str) {
    counter!(
        format!("{}_webhooks_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_notification_enqueued(kind: &str) {
    counter!(
        format!("{}_notifications_enqueued_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record the result of one delivery attempt
pub fn record_delivery(kind: &str, success: bool, will_retry: bool) {
    if success {
        counter!(
            format!("{}_notifications_sent_total", METRICS_PREFIX),
            "kind" => kind.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_notifications_failed_total", METRICS_PREFIX),
            "kind" => kind.to_string(),
            "retry" => will_retry.to_string()
        )
        .increment(1);
    }
}

pub fn record_outbox_batch(size: usize) {
    gauge!(format!("{}_outbox_batch_size", METRICS_PREFIX)).set(size as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, GATEWAY_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }

        // Gateway buckets must reach the client timeout
        assert_eq!(GATEWAY_BUCKETS.last(), Some(&30.0));
    }

    #[test]
    fn test_recorders_without_exporter() {
        let metrics = RequestMetrics::start("GET", "/v1/papers");
        metrics.finish(200);
        record_transition("review", "pending_payment");
        record_delivery("acceptance", false, true);
        // No recorder installed; just verify these run without panic
    }
}
