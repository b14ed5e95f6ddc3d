//! Comment service
//!
//! Visitors post comments and replies that stay hidden until an admin
//! approves them. Replies are one level deep.

use chrono::Utc;
use std::sync::Arc;

use crate::models::{to_fields, BlogPost, Comment, CommentData, CreateCommentInput, Fields};
use crate::store::collections::{BLOG_POSTS, COMMENTS};
use crate::store::{record, records, Collections, Direction, DocumentError, Query};

const MAX_TEXT_LEN: usize = 5000;

#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Store(#[from] DocumentError),
}

impl From<serde_json::Error> for CommentServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(DocumentError::from(err))
    }
}

/// Comment service
pub struct CommentService {
    store: Arc<dyn Collections>,
}

impl CommentService {
    pub fn new(store: Arc<dyn Collections>) -> Self {
        Self { store }
    }

    /// Add a comment or reply to the post with `slug`. Stored unapproved.
    pub async fn add_comment(
        &self,
        slug: &str,
        input: CreateCommentInput,
    ) -> Result<Comment, CommentServiceError> {
        let name = required("Name", &input.name)?;
        let email = required("Email", &input.email)?;
        let text = required("Comment", &input.text)?;
        if text.chars().count() > MAX_TEXT_LEN {
            return Err(CommentServiceError::ValidationError(format!(
                "Comment is longer than {} characters",
                MAX_TEXT_LEN
            )));
        }

        let query = Query::new().eq("slug", slug).limit(1);
        let post: BlogPost = records(self.store.list(BLOG_POSTS, &query).await?)?
            .pop()
            .ok_or_else(|| CommentServiceError::NotFound(format!("Post {}", slug)))?;

        let parent_id = match input.parent_id.filter(|id| !id.is_empty()) {
            Some(parent_id) => {
                let parent = self
                    .get(&parent_id)
                    .await?
                    .ok_or_else(|| CommentServiceError::NotFound(format!("Comment {}", parent_id)))?;
                if parent.data.post_id != post.id {
                    return Err(CommentServiceError::ValidationError(
                        "Reply must belong to the same post".to_string(),
                    ));
                }
                if parent.is_reply() {
                    return Err(CommentServiceError::ValidationError(
                        "Replies cannot be nested".to_string(),
                    ));
                }
                Some(parent_id)
            }
            None => None,
        };

        let data = CommentData {
            post_id: post.id,
            slug: post.slug,
            name,
            email,
            text,
            created_at: Utc::now(),
            is_approved: false,
            parent_id,
        };
        let doc = self.store.create(COMMENTS, to_fields(&data)?).await?;
        tracing::info!("New comment {} on {} awaiting approval", doc.id, data.slug);

        Ok(Comment {
            id: doc.id,
            data,
            replies: Vec::new(),
        })
    }

    /// Approved comments of a post, newest first, each with its approved
    /// replies oldest first
    pub async fn comments_for_post(&self, slug: &str) -> Result<Vec<Comment>, CommentServiceError> {
        let query = Query::new()
            .eq("slug", slug)
            .eq("is_approved", true)
            .order_by("created_at", Direction::Asc);
        let approved: Vec<Comment> = records(self.store.list(COMMENTS, &query).await?)?;

        let (mut roots, replies): (Vec<Comment>, Vec<Comment>) =
            approved.into_iter().partition(|c| !c.is_reply());
        roots.reverse();

        for reply in replies {
            if let Some(root) = roots
                .iter_mut()
                .find(|r| reply.data.parent_id.as_deref() == Some(r.id.as_str()))
            {
                root.replies.push(reply);
            }
        }
        Ok(roots)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Comment>, CommentServiceError> {
        Ok(record(self.store.get(COMMENTS, id).await?)?)
    }

    /// Every comment, approved or not, newest first
    pub async fn list_all(&self) -> Result<Vec<Comment>, CommentServiceError> {
        let query = Query::new().order_by("created_at", Direction::Desc);
        Ok(records(self.store.list(COMMENTS, &query).await?)?)
    }

    pub async fn approve(&self, id: &str, approved: bool) -> Result<Comment, CommentServiceError> {
        let mut fields = Fields::new();
        fields.insert("is_approved".into(), approved.into());
        let doc = self
            .store
            .update(COMMENTS, id, fields)
            .await
            .map_err(|e| match e {
                DocumentError::NotFound(_) => CommentServiceError::NotFound(format!("Comment {}", id)),
                other => other.into(),
            })?;
        tracing::info!("Comment {} approved: {}", id, approved);
        Ok(doc.into_record()?)
    }

    /// Delete a comment together with its replies
    pub async fn delete_comment(&self, id: &str) -> Result<(), CommentServiceError> {
        let query = Query::new().eq("parent_id", id);
        let replies = self.store.list(COMMENTS, &query).await?;
        for reply in &replies {
            self.store.delete(COMMENTS, &reply.id).await?;
        }
        self.store.delete(COMMENTS, id).await?;
        tracing::info!("Deleted comment {} and {} replies", id, replies.len());
        Ok(())
    }
}

fn required(label: &str, value: &str) -> Result<String, CommentServiceError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CommentServiceError::ValidationError(format!(
            "{} is required",
            label
        )));
    }
    Ok(value.to_string())
}
