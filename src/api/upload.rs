//! Image upload endpoints
//!
//! Both endpoints need an admin bearer credential; the blob store checks it.

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, Bearer};
use crate::blob::UploadedBlob;

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub url: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/uploads", post(upload_image).delete(delete_image))
}

/// POST /api/v1/uploads
///
/// Accepts multipart/form-data with a single file field named "file".
async fn upload_image(
    State(state): State<AppState>,
    bearer: Bearer,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadedBlob>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;

        let blob = state
            .blobs
            .upload(bearer.as_deref(), &file_name, &content_type, data.to_vec())
            .await?;
        return Ok((StatusCode::CREATED, Json(blob)));
    }

    Err(ApiError::validation_error("No file provided"))
}

/// DELETE /api/v1/uploads?url=...
async fn delete_image(
    State(state): State<AppState>,
    bearer: Bearer,
    Query(params): Query<DeleteParams>,
) -> Result<StatusCode, ApiError> {
    let url = params
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::validation_error("url is required"))?;

    state.blobs.delete(bearer.as_deref(), &url).await?;
    Ok(StatusCode::NO_CONTENT)
}
