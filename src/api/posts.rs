//! Public blog API endpoints
//!
//! Posts, related posts and the comment threads underneath them. Reads are
//! anonymous; new comments wait for approval.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};
use crate::models::{BlogPost, Comment, CreateCommentInput};
use crate::services::render_markdown;

const FEATURED_COUNT: usize = 3;
const RELATED_COUNT: usize = 2;

/// A post with its rendered body
#[derive(Debug, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: BlogPost,
    pub content_html: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts))
        .route("/posts/featured", get(featured_posts))
        .route("/posts/{slug}", get(get_post))
        .route("/posts/{slug}/related", get(related_posts))
        .route("/posts/{slug}/comments", get(list_comments).post(create_comment))
}

/// GET /api/v1/posts
async fn list_posts(State(state): State<AppState>) -> Result<Json<Vec<BlogPost>>, ApiError> {
    Ok(Json(state.blog().list_posts().await?))
}

/// GET /api/v1/posts/featured
async fn featured_posts(State(state): State<AppState>) -> Result<Json<Vec<BlogPost>>, ApiError> {
    Ok(Json(state.blog().featured_posts(FEATURED_COUNT).await?))
}

/// GET /api/v1/posts/{slug}
async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PostDetail>, ApiError> {
    let post = find_post(&state, &slug).await?;
    let content_html = render_markdown(&post.content);
    Ok(Json(PostDetail { post, content_html }))
}

/// GET /api/v1/posts/{slug}/related
async fn related_posts(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<BlogPost>>, ApiError> {
    let blog = state.blog();
    let post = find_post(&state, &slug).await?;
    Ok(Json(
        blog.related_posts(&post.id, &post.tags, RELATED_COUNT).await?,
    ))
}

/// GET /api/v1/posts/{slug}/comments
async fn list_comments(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    Ok(Json(state.comments().comments_for_post(&slug).await?))
}

/// POST /api/v1/posts/{slug}/comments
async fn create_comment(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(input): Json<CreateCommentInput>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let comment = state.comments().add_comment(&slug, input).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn find_post(state: &AppState, slug: &str) -> Result<BlogPost, ApiError> {
    state
        .blog()
        .get_by_slug(slug)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Post {} not found", slug)))
}
