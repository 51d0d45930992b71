//! CHIP payment callback
//!
//! Answers with short text bodies rather than the JSON error envelope.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::AppState;
use paperdesk_common::{errors::AppError, workflow::WebhookOutcome};

/// Header carrying the hex HMAC-SHA256 of the raw body
pub const SIGNATURE_HEADER: &str = "x-signature";

pub async fn chip_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> (StatusCode, &'static str) {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    match state.payments.handle_webhook(&body, signature).await {
        Ok(outcome) => {
            match &outcome {
                WebhookOutcome::Confirmed { paper_id } => {
                    tracing::info!(paper_id, "Payment webhook confirmed paper");
                }
                WebhookOutcome::Duplicate { paper_id } => {
                    tracing::info!(paper_id, "Duplicate payment webhook acknowledged");
                }
                WebhookOutcome::Ignored { paper_id, status } => {
                    tracing::info!(paper_id, status = %status, "Payment webhook ignored");
                }
            }
            (StatusCode::OK, "OK")
        }
        Err(AppError::InvalidSignature) => (StatusCode::UNAUTHORIZED, "Invalid signature"),
        Err(AppError::InvalidWebhookPayload) => (StatusCode::BAD_REQUEST, "Invalid webhook data"),
        Err(AppError::TransactionNotFound { .. } | AppError::PaperNotFound { .. }) => {
            (StatusCode::NOT_FOUND, "Paper not found")
        }
        Err(e) => {
            tracing::error!(error = %e, "Payment webhook failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}
