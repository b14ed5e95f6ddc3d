//! Document store API
//!
//! Exposes the hosted document store over HTTP. Access is decided by the
//! store's collection rules with the request's bearer credential.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, Bearer};
use crate::models::{Document, Fields};
use crate::store::Query;

/// Body of an increment request
#[derive(Debug, Serialize, Deserialize)]
pub struct IncrementRequest {
    pub field: String,
    #[serde(default = "default_delta")]
    pub delta: i64,
    /// Fields of the document when it has to be created
    #[serde(default)]
    pub defaults: Fields,
}

fn default_delta() -> i64 {
    1
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IncrementResponse {
    pub value: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/query/{collection}", post(query_documents))
        .route("/documents/{collection}", get(list_documents).post(create_document))
        .route(
            "/documents/{collection}/{id}",
            get(get_document)
                .put(put_document)
                .patch(update_document)
                .delete(delete_document),
        )
        .route("/documents/{collection}/{id}/increment", post(increment_field))
}

/// POST /api/v1/query/{collection}
async fn query_documents(
    State(state): State<AppState>,
    bearer: Bearer,
    Path(collection): Path<String>,
    Json(query): Json<Query>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let docs = state
        .documents
        .list(bearer.as_deref(), &collection, &query)
        .await?;
    Ok(Json(docs))
}

/// GET /api/v1/documents/{collection}
async fn list_documents(
    State(state): State<AppState>,
    bearer: Bearer,
    Path(collection): Path<String>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let docs = state
        .documents
        .list(bearer.as_deref(), &collection, &Query::new())
        .await?;
    Ok(Json(docs))
}

/// POST /api/v1/documents/{collection}
async fn create_document(
    State(state): State<AppState>,
    bearer: Bearer,
    Path(collection): Path<String>,
    Json(fields): Json<Fields>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let doc = state
        .documents
        .create(bearer.as_deref(), &collection, fields)
        .await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

/// GET /api/v1/documents/{collection}/{id}
async fn get_document(
    State(state): State<AppState>,
    bearer: Bearer,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Document>, ApiError> {
    state
        .documents
        .get(bearer.as_deref(), &collection, &id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Document {}/{} not found", collection, id)))
}

/// PUT /api/v1/documents/{collection}/{id}
async fn put_document(
    State(state): State<AppState>,
    bearer: Bearer,
    Path((collection, id)): Path<(String, String)>,
    Json(fields): Json<Fields>,
) -> Result<Json<Document>, ApiError> {
    let doc = state
        .documents
        .put(bearer.as_deref(), &collection, &id, fields)
        .await?;
    Ok(Json(doc))
}

/// PATCH /api/v1/documents/{collection}/{id}
async fn update_document(
    State(state): State<AppState>,
    bearer: Bearer,
    Path((collection, id)): Path<(String, String)>,
    Json(fields): Json<Fields>,
) -> Result<Json<Document>, ApiError> {
    let doc = state
        .documents
        .update(bearer.as_deref(), &collection, &id, fields)
        .await?;
    Ok(Json(doc))
}

/// DELETE /api/v1/documents/{collection}/{id}
async fn delete_document(
    State(state): State<AppState>,
    bearer: Bearer,
    Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .documents
        .delete(bearer.as_deref(), &collection, &id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/documents/{collection}/{id}/increment
async fn increment_field(
    State(state): State<AppState>,
    bearer: Bearer,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<IncrementRequest>,
) -> Result<Json<IncrementResponse>, ApiError> {
    let value = state
        .documents
        .increment(
            bearer.as_deref(),
            &collection,
            &id,
            &body.field,
            body.delta,
            body.defaults,
        )
        .await?;
    Ok(Json(IncrementResponse { value }))
}
