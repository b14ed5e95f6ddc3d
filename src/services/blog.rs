//! Blog post service
//!
//! Reads go through any [`Collections`] handle; writes only succeed through
//! one carrying an admin credential. Deleting a post also removes its cover
//! image when an image store is attached.

use chrono::Utc;
use std::sync::Arc;

use super::markdown::estimate_read_time;
use crate::blob::Images;
use crate::models::{to_fields, BlogPost, CreatePostInput, Fields, UpdatePostInput};
use crate::store::collections::BLOG_POSTS;
use crate::store::{record, records, Collections, Direction, DocumentError, Query};

/// How many of the newest posts are scanned for related posts
const RELATED_SCAN: usize = 10;

/// Error types for blog service operations
#[derive(Debug, thiserror::Error)]
pub enum BlogServiceError {
    #[error("Post not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Post slug already exists: {0}")]
    DuplicateSlug(String),

    #[error(transparent)]
    Store(#[from] DocumentError),
}

impl From<serde_json::Error> for BlogServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(DocumentError::from(err))
    }
}

/// Blog post service
pub struct BlogService {
    store: Arc<dyn Collections>,
    images: Option<Arc<dyn Images>>,
}

impl BlogService {
    pub fn new(store: Arc<dyn Collections>) -> Self {
        Self { store, images: None }
    }

    /// Attach an image store; cover images are then removed with their post
    pub fn with_images(mut self, images: Arc<dyn Images>) -> Self {
        self.images = Some(images);
        self
    }

    /// All posts, newest first
    pub async fn list_posts(&self) -> Result<Vec<BlogPost>, BlogServiceError> {
        let query = Query::new().order_by("date", Direction::Desc);
        Ok(records(self.store.list(BLOG_POSTS, &query).await?)?)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<BlogPost>, BlogServiceError> {
        let query = Query::new().eq("slug", slug).limit(1);
        let mut posts: Vec<BlogPost> = records(self.store.list(BLOG_POSTS, &query).await?)?;
        Ok(posts.pop())
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<BlogPost>, BlogServiceError> {
        Ok(record(self.store.get(BLOG_POSTS, id).await?)?)
    }

    /// Newest featured posts
    pub async fn featured_posts(&self, count: usize) -> Result<Vec<BlogPost>, BlogServiceError> {
        let query = Query::new()
            .eq("featured", true)
            .order_by("date", Direction::Desc)
            .limit(count);
        Ok(records(self.store.list(BLOG_POSTS, &query).await?)?)
    }

    /// Posts sharing a tag with `tags`, taken from the newest posts only
    pub async fn related_posts(
        &self,
        post_id: &str,
        tags: &[String],
        count: usize,
    ) -> Result<Vec<BlogPost>, BlogServiceError> {
        let query = Query::new()
            .order_by("date", Direction::Desc)
            .limit(RELATED_SCAN);
        let recent: Vec<BlogPost> = records(self.store.list(BLOG_POSTS, &query).await?)?;

        Ok(recent
            .into_iter()
            .filter(|p| p.id != post_id && p.shares_tag(tags))
            .take(count)
            .collect())
    }

    /// Create a new post
    ///
    /// # Errors
    /// - `ValidationError` if title or content is empty
    /// - `DuplicateSlug` if the slug is already taken
    pub async fn create_post(&self, input: CreatePostInput) -> Result<BlogPost, BlogServiceError> {
        if input.title.trim().is_empty() {
            return Err(BlogServiceError::ValidationError(
                "Title cannot be empty".to_string(),
            ));
        }
        if input.content.trim().is_empty() {
            return Err(BlogServiceError::ValidationError(
                "Content cannot be empty".to_string(),
            ));
        }

        let slug = match input.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => slug.to_string(),
            _ => generate_slug(&input.title),
        };
        if slug.is_empty() {
            return Err(BlogServiceError::ValidationError(
                "Slug cannot be empty".to_string(),
            ));
        }
        if self.get_by_slug(&slug).await?.is_some() {
            return Err(BlogServiceError::DuplicateSlug(slug));
        }

        let now = Utc::now();
        let read_time = match input.read_time {
            Some(rt) if !rt.trim().is_empty() => rt,
            _ => estimate_read_time(&input.content),
        };
        let post = BlogPost {
            id: String::new(),
            title: input.title.trim().to_string(),
            slug,
            excerpt: input.excerpt,
            content: input.content,
            cover_image: input.cover_image.filter(|url| !url.is_empty()),
            date: input.date.unwrap_or_else(|| now.date_naive()),
            read_time,
            tags: clean_tags(input.tags),
            featured: input.featured,
            created_at: Some(now),
            updated_at: None,
        };

        let doc = self.store.create(BLOG_POSTS, to_fields(&post)?).await?;
        tracing::info!("Created post {} ({})", doc.id, post.slug);
        Ok(doc.into_record()?)
    }

    /// Update a post; absent fields stay as they are
    pub async fn update_post(
        &self,
        id: &str,
        input: UpdatePostInput,
    ) -> Result<BlogPost, BlogServiceError> {
        let existing = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| BlogServiceError::NotFound(id.to_string()))?;

        let mut fields = Fields::new();
        if let Some(title) = input.title {
            if title.trim().is_empty() {
                return Err(BlogServiceError::ValidationError(
                    "Title cannot be empty".to_string(),
                ));
            }
            fields.insert("title".into(), title.trim().into());
        }
        if let Some(content) = input.content {
            if content.trim().is_empty() {
                return Err(BlogServiceError::ValidationError(
                    "Content cannot be empty".to_string(),
                ));
            }
            if input.read_time.is_none() {
                fields.insert("read_time".into(), estimate_read_time(&content).into());
            }
            fields.insert("content".into(), content.into());
        }
        if let Some(slug) = input.slug {
            let slug = slug.trim().to_string();
            if slug.is_empty() {
                return Err(BlogServiceError::ValidationError(
                    "Slug cannot be empty".to_string(),
                ));
            }
            if slug != existing.slug {
                if let Some(other) = self.get_by_slug(&slug).await? {
                    if other.id != existing.id {
                        return Err(BlogServiceError::DuplicateSlug(slug));
                    }
                }
            }
            fields.insert("slug".into(), slug.into());
        }
        if let Some(excerpt) = input.excerpt {
            fields.insert("excerpt".into(), excerpt.into());
        }
        if let Some(cover) = input.cover_image {
            let value = if cover.is_empty() {
                serde_json::Value::Null
            } else {
                cover.into()
            };
            fields.insert("cover_image".into(), value);
        }
        if let Some(date) = input.date {
            fields.insert("date".into(), serde_json::to_value(date)?);
        }
        if let Some(read_time) = input.read_time {
            fields.insert("read_time".into(), read_time.into());
        }
        if let Some(tags) = input.tags {
            fields.insert("tags".into(), serde_json::to_value(clean_tags(tags))?);
        }
        if let Some(featured) = input.featured {
            fields.insert("featured".into(), featured.into());
        }
        fields.insert("updated_at".into(), serde_json::to_value(Utc::now())?);

        let doc = self.store.update(BLOG_POSTS, id, fields).await?;
        tracing::info!("Updated post {}", id);
        Ok(doc.into_record()?)
    }

    /// Delete a post, then its cover image
    pub async fn delete_post(&self, id: &str) -> Result<(), BlogServiceError> {
        let existing = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| BlogServiceError::NotFound(id.to_string()))?;

        self.store.delete(BLOG_POSTS, id).await?;
        tracing::info!("Deleted post {} ({})", id, existing.slug);

        if let (Some(images), Some(cover)) = (&self.images, existing.cover_image.as_deref()) {
            if let Err(e) = images.delete_image(cover).await {
                tracing::warn!("Failed to delete cover image {} of post {}: {}", cover, id, e);
            }
        }
        Ok(())
    }
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !cleaned.iter().any(|t| t == tag) {
            cleaned.push(tag.to_string());
        }
    }
    cleaned
}

/// Generate a URL-friendly slug from a title.
///
/// Lowercases, turns whitespace, punctuation and underscores into single
/// hyphens and trims hyphens from both ends. Non-ASCII letters are kept.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || (!c.is_ascii() && c.is_alphanumeric()) {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    slug
}
