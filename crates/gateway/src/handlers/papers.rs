//! Paper submission and retrieval handlers

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AppState;
use paperdesk_common::{
    auth::AuthContext,
    domain::{Paper, PaperFilter, PaperStatus},
    errors::{AppError, Result},
    store::PaperStore,
    workflow::{Actor, SubmissionInput},
};

/// Paper as returned by the API; the pass and raw gateway payload are
/// served separately
#[derive(Debug, Serialize)]
pub struct PaperResponse {
    pub id: i64,
    pub registration_id: String,
    pub owner_id: i64,
    pub title: String,
    pub description: String,
    pub author_name: String,
    pub co_authors: String,
    pub status: PaperStatus,
    pub status_label: String,
    pub submitted_at: DateTime<Utc>,
    pub payment_amount: Option<i64>,
    pub payment_currency: Option<String>,
    pub payment_reference: Option<String>,
    pub checkout_url: Option<String>,
    pub checkout_expires_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub has_pass: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<Paper> for PaperResponse {
    fn from(paper: Paper) -> Self {
        Self {
            registration_id: paper.registration_id(),
            status_label: paper.status.label().to_string(),
            has_pass: paper.pass_html.is_some(),
            id: paper.id,
            owner_id: paper.owner_id,
            title: paper.title,
            description: paper.description,
            author_name: paper.author_name,
            co_authors: paper.co_authors,
            status: paper.status,
            submitted_at: paper.submitted_at,
            payment_amount: paper.payment_amount,
            payment_currency: paper.payment_currency,
            payment_reference: paper.payment_reference,
            checkout_url: paper.checkout_url,
            checkout_expires_at: paper.checkout_expires_at,
            paid_at: paper.paid_at,
            updated_at: paper.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaperListResponse {
    pub papers: Vec<PaperResponse>,
    pub total: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

fn multipart_error(err: MultipartError, headers: &HeaderMap, limit: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        let size = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        AppError::PayloadTooLarge { size, limit }
    } else {
        AppError::Validation {
            message: err.body_text(),
            field: None,
        }
    }
}

/// Submit a paper as `multipart/form-data` with a `paper_document` PDF
pub async fn submit_paper(
    State(state): State<AppState>,
    auth: AuthContext,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<PaperResponse>)> {
    let limit = state.config.max_upload_bytes();
    let mut input = SubmissionInput::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, &headers, limit))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "paper_document" => {
                input.file_name = field.file_name().unwrap_or_default().to_string();
                let bytes: Bytes = field.bytes().await.map_err(|e| multipart_error(e, &headers, limit))?;
                input.document = bytes.to_vec();
            }
            "title" | "description" | "author_name" | "co_authors" => {
                let text = field.text().await.map_err(|e| multipart_error(e, &headers, limit))?;
                match name.as_str() {
                    "title" => input.title = text,
                    "description" => input.description = text,
                    "author_name" => input.author_name = text,
                    _ => input.co_authors = text,
                }
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown form field");
            }
        }
    }

    let paper = state.submissions.submit(&Actor::from(&auth), input).await?;

    Ok((StatusCode::CREATED, Json(paper.into())))
}

/// Participants see their own papers; managers see all
pub async fn list_papers(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<PaperListResponse>> {
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(PaperStatus::parse_requested(raw).ok_or_else(|| AppError::Validation {
            message: format!("Invalid status: {}", raw),
            field: Some("status".to_string()),
        })?),
        None => None,
    };

    let filter = PaperFilter {
        owner_id: if auth.role.can_manage_papers() { None } else { Some(auth.user_id) },
        status,
    };

    let papers: Vec<PaperResponse> = state
        .store
        .list_papers(&filter)
        .await?
        .into_iter()
        .map(PaperResponse::from)
        .collect();

    Ok(Json(PaperListResponse {
        total: papers.len(),
        papers,
    }))
}

async fn visible_paper(state: &AppState, auth: &AuthContext, paper_id: i64) -> Result<Paper> {
    let paper = state
        .store
        .find_paper(paper_id)
        .await?
        .ok_or(AppError::PaperNotFound { id: paper_id })?;

    if !auth.can_view(&paper) {
        return Err(AppError::NotPaperOwner { paper_id });
    }
    Ok(paper)
}

/// Get a paper by ID
pub async fn get_paper(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(paper_id): Path<i64>,
) -> Result<Json<PaperResponse>> {
    let paper = visible_paper(&state, &auth, paper_id).await?;
    Ok(Json(paper.into()))
}

/// Download the submitted PDF
pub async fn download_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(paper_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let paper = visible_paper(&state, &auth, paper_id).await?;
    let bytes = state.submissions.documents().read(&paper.document_url).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.pdf\"", paper.registration_id()),
            ),
        ],
        bytes,
    ))
}
