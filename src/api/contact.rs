//! Contact form endpoint

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};
use crate::models::ContactInput;

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub id: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/contact", post(submit))
}

/// POST /api/v1/contact
async fn submit(
    State(state): State<AppState>,
    Json(input): Json<ContactInput>,
) -> Result<(StatusCode, Json<ContactResponse>), ApiError> {
    let message = state.messages().submit(input).await?;
    Ok((StatusCode::CREATED, Json(ContactResponse { id: message.id })))
}
