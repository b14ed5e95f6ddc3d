//! Like models
//!
//! One `likes` document per (visitor, post) pair plus one `likeCounts`
//! counter document per post.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A visitor's like of a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    pub visitor_id: String,
    pub post_id: String,
    pub post_slug: String,
    pub created_at: DateTime<Utc>,
}

impl Like {
    /// Document id of a visitor's like
    pub fn document_id(visitor_id: &str, post_id: &str) -> String {
        format!("{}_{}", visitor_id, post_id)
    }
}

/// Per-post like counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeCount {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub count: i64,
}
