use axum::extract::{Path, State};
use axum::response::Json;

use crate::api::error::ApiError;
use crate::email::model::Email;
use crate::folder::Folder;
use crate::AppState;

/// GET /api/folders
pub async fn list_folders(State(state): State<AppState>) -> Json<Vec<Folder>> {
    Json(state.folders.list_all().await)
}

/// GET /api/folders/:slug
pub async fn get_folder(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Folder>, ApiError> {
    Ok(Json(state.folders.get_by_slug(&slug).await?))
}

/// GET /api/folders/:slug/emails
pub async fn folder_emails(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Json<Vec<Email>> {
    Json(state.repo.list_by_folder(&slug).await)
}
