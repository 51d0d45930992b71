//! Reviewer decision handler

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::papers::PaperResponse;
use crate::AppState;
use paperdesk_common::{
    auth::AuthContext,
    errors::Result,
    workflow::{Actor, TransitionOutcome},
};

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    /// `accept`, `pending_payment` or `reject`
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateStatusResponse {
    pub changed: bool,
    pub notifications_queued: usize,
    pub paper: PaperResponse,
}

/// Apply a reviewer decision
pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(paper_id): Path<i64>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<UpdateStatusResponse>> {
    auth.require_manager()?;

    let outcome = state
        .review
        .change_status(&Actor::from(&auth), paper_id, &request.status)
        .await?;

    let response = match outcome {
        TransitionOutcome::Unchanged(paper) => UpdateStatusResponse {
            changed: false,
            notifications_queued: 0,
            paper: paper.into(),
        },
        TransitionOutcome::Changed { paper, notifications } => UpdateStatusResponse {
            changed: true,
            notifications_queued: notifications,
            paper: paper.into(),
        },
    };

    Ok(Json(response))
}
