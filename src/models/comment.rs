//! Comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Comment as stored in the `comments` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentData {
    /// Id of the post the comment belongs to
    pub post_id: String,
    /// Slug of that post, used for public lookups
    pub slug: String,
    pub name: String,
    pub email: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Only approved comments are shown publicly
    #[serde(default)]
    pub is_approved: bool,
    /// Set for replies
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Comment entity with its approved replies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    #[serde(flatten)]
    pub data: CommentData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<Comment>,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        self.data.parent_id.is_some()
    }
}

/// Input for creating a comment
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentInput {
    pub name: String,
    pub email: String,
    pub text: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}
