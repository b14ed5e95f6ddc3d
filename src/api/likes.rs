//! Like endpoints
//!
//! Visitors are told apart by an opaque `visitor_id` cookie, issued on the
//! first request that lacks a usable one.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::api::middleware::{ApiError, AppState};
use crate::session::marker::read_cookie;

pub const VISITOR_COOKIE: &str = "visitor_id";

/// One year
const VISITOR_MAX_AGE: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub count: i64,
    pub liked: bool,
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/likes/{post_id}",
        get(like_status).post(like_post).delete(unlike_post),
    )
}

/// The caller's visitor id, and the cookie to set when it was just issued
fn visitor(headers: &HeaderMap) -> (String, Option<HeaderValue>) {
    if let Some(id) = read_cookie(headers, VISITOR_COOKIE).filter(|id| is_valid_visitor_id(id)) {
        return (id, None);
    }
    let id = Uuid::new_v4().simple().to_string();
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        VISITOR_COOKIE, id, VISITOR_MAX_AGE
    );
    (id, HeaderValue::from_str(&cookie).ok())
}

fn is_valid_visitor_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn respond(cookie: Option<HeaderValue>, body: LikeResponse) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = cookie {
        headers.insert(header::SET_COOKIE, cookie);
    }
    (headers, Json(body))
}

/// GET /api/v1/likes/{post_id}
async fn like_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (visitor_id, cookie) = visitor(&headers);
    let likes = state.likes();
    let count = likes.like_count(&post_id).await?;
    let liked = likes.has_liked(&visitor_id, &post_id).await?;
    Ok(respond(cookie, LikeResponse { count, liked }))
}

/// POST /api/v1/likes/{post_id}
async fn like_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state
        .blog()
        .get_by_id(&post_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Post {} not found", post_id)))?;

    let (visitor_id, cookie) = visitor(&headers);
    let count = state.likes().like(&visitor_id, &post.id, &post.slug).await?;
    Ok(respond(cookie, LikeResponse { count, liked: true }))
}

/// DELETE /api/v1/likes/{post_id}
async fn unlike_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (visitor_id, cookie) = visitor(&headers);
    let count = state.likes().unlike(&visitor_id, &post_id).await?;
    Ok(respond(cookie, LikeResponse { count, liked: false }))
}
