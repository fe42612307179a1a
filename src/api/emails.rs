use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::api::error::ApiError;
use crate::email::model::{
    Compose, DeleteOutcome, DraftRequest, Email, EmailId, EmailPatch, Mailbox,
};
use crate::error::MailError;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(flatten)]
    pub compose: Compose,
    #[serde(default)]
    pub from_draft: Option<EmailId>,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub folder: String,
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Result<Response, ApiError> {
    state.repo.health_check().await?;
    Ok(Json(json!({ "status": "ok", "backend": state.repo.provider_name() })).into_response())
}

/// GET /api/emails?q= searches, or lists everything when `q` is blank
pub async fn list_emails(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<Email>> {
    let term = query.q.unwrap_or_default();
    Json(state.repo.search(&term).await)
}

/// GET /api/emails/:id
pub async fn get_email(
    State(state): State<AppState>,
    Path(id): Path<EmailId>,
) -> Result<Json<Email>, ApiError> {
    Ok(Json(state.repo.get(id).await?))
}

/// POST /api/emails
pub async fn create_email(
    State(state): State<AppState>,
    Json(compose): Json<Compose>,
) -> Result<Response, ApiError> {
    let email = state.repo.create(compose).await?;
    Ok((StatusCode::CREATED, Json(email)).into_response())
}

/// POST /api/emails/send
pub async fn send_email(
    State(state): State<AppState>,
    Json(request): Json<SendRequest>,
) -> Result<Response, ApiError> {
    if request.compose.to.iter().all(|to| to.trim().is_empty()) {
        let err = MailError::Validation("Please add at least one recipient".to_string());
        return Err(err.into());
    }
    let email = state.repo.send(request.compose, request.from_draft).await?;
    Ok((StatusCode::CREATED, Json(email)).into_response())
}

/// PATCH /api/emails/:id
pub async fn update_email(
    State(state): State<AppState>,
    Path(id): Path<EmailId>,
    Json(patch): Json<EmailPatch>,
) -> Result<Json<Email>, ApiError> {
    Ok(Json(state.repo.update(id, patch).await?))
}

/// DELETE /api/emails/:id. Trashes first, removes permanently from trash
pub async fn delete_email(
    State(state): State<AppState>,
    Path(id): Path<EmailId>,
) -> Result<Response, ApiError> {
    let response = match state.repo.delete(id).await? {
        DeleteOutcome::Trashed(email) => Json(email).into_response(),
        DeleteOutcome::Removed { id, message } => {
            Json(json!({ "success": true, "id": id, "message": message })).into_response()
        }
    };
    Ok(response)
}

/// POST /api/emails/:id/star
pub async fn toggle_star(
    State(state): State<AppState>,
    Path(id): Path<EmailId>,
) -> Result<Json<Email>, ApiError> {
    Ok(Json(state.repo.toggle_star(id).await?))
}

/// POST /api/emails/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<EmailId>,
) -> Result<Json<Email>, ApiError> {
    Ok(Json(state.repo.mark_read(id).await?))
}

/// POST /api/emails/:id/unread
pub async fn mark_unread(
    State(state): State<AppState>,
    Path(id): Path<EmailId>,
) -> Result<Json<Email>, ApiError> {
    Ok(Json(state.repo.mark_unread(id).await?))
}

/// POST /api/emails/:id/move
pub async fn move_email(
    State(state): State<AppState>,
    Path(id): Path<EmailId>,
    Json(request): Json<MoveRequest>,
) -> Result<Json<Email>, ApiError> {
    let folder = Mailbox::parse(&request.folder)?;
    Ok(Json(state.repo.move_to(id, folder).await?))
}

/// POST /api/drafts
pub async fn save_draft(
    State(state): State<AppState>,
    Json(draft): Json<DraftRequest>,
) -> Result<Json<Email>, ApiError> {
    Ok(Json(state.repo.save_draft(draft).await?))
}

/// GET /api/emails/:id/reply
pub async fn reply_template(
    State(state): State<AppState>,
    Path(id): Path<EmailId>,
) -> Result<Json<Compose>, ApiError> {
    let original = state.repo.get(id).await?;
    Ok(Json(Compose::reply_to(&original)))
}

/// GET /api/emails/:id/forward
pub async fn forward_template(
    State(state): State<AppState>,
    Path(id): Path<EmailId>,
) -> Result<Json<Compose>, ApiError> {
    let original = state.repo.get(id).await?;
    Ok(Json(Compose::forward(&original)))
}
