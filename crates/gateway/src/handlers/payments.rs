//! Payment initiation, verification and pass handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Html,
    Json,
};
use serde::Serialize;

use super::papers::PaperResponse;
use crate::AppState;
use paperdesk_common::{auth::AuthContext, errors::Result, workflow::Actor};

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub paper_id: i64,
    pub checkout_url: String,
    pub reference: String,
    pub reused: bool,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub gateway_status: String,
    pub paper: PaperResponse,
}

/// Start or reuse a hosted checkout for the caller's accepted paper
pub async fn initiate_payment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(paper_id): Path<i64>,
) -> Result<(StatusCode, Json<CheckoutResponse>)> {
    let checkout = state.payments.initiate(&Actor::from(&auth), paper_id).await?;

    let status = if checkout.reused { StatusCode::OK } else { StatusCode::CREATED };
    Ok((
        status,
        Json(CheckoutResponse {
            paper_id: checkout.paper_id,
            checkout_url: checkout.checkout_url,
            reference: checkout.reference,
            reused: checkout.reused,
        }),
    ))
}

/// Ask the gateway for the session status and apply a completed payment
pub async fn verify_payment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(paper_id): Path<i64>,
) -> Result<Json<VerifyResponse>> {
    let outcome = state.payments.verify(&Actor::from(&auth), paper_id).await?;

    Ok(Json(VerifyResponse {
        gateway_status: outcome.gateway_status,
        paper: outcome.paper.into(),
    }))
}

/// Printable participant pass
pub async fn get_pass(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(paper_id): Path<i64>,
) -> Result<Html<String>> {
    let html = state.payments.pass(&Actor::from(&auth), paper_id).await?;
    Ok(Html(html))
}

/// Re-render a pass (managers)
pub async fn regenerate_pass(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(paper_id): Path<i64>,
) -> Result<Json<PaperResponse>> {
    auth.require_manager()?;

    let paper = state.payments.regenerate_pass(&Actor::from(&auth), paper_id).await?;
    Ok(Json(paper.into()))
}
