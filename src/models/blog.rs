//! Blog post model
//!
//! Posts live in the `blog-posts` collection and are addressed publicly by
//! their slug.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Blog post entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPost {
    /// Document id
    #[serde(default)]
    pub id: String,
    pub title: String,
    /// URL-friendly slug, unique across posts
    pub slug: String,
    /// Short summary shown on listings
    #[serde(default)]
    pub excerpt: String,
    /// Markdown content
    pub content: String,
    /// Public URL of the cover image
    #[serde(default)]
    pub cover_image: Option<String>,
    /// Publication date used for ordering
    pub date: NaiveDate,
    /// Human readable reading time, e.g. "4 min read"
    #[serde(default)]
    pub read_time: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Shown in the featured section of the home page
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl BlogPost {
    /// Check if the post shares at least one tag with `tags`
    pub fn shares_tag(&self, tags: &[String]) -> bool {
        self.tags.iter().any(|t| tags.contains(t))
    }
}

/// Input for creating a post
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    /// Generated from the title when absent or blank
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: String,
    pub content: String,
    #[serde(default)]
    pub cover_image: Option<String>,
    /// Defaults to today
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Estimated from the content when absent
    #[serde(default)]
    pub read_time: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub featured: bool,
}

/// Input for updating a post; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub cover_image: Option<String>,
    pub date: Option<NaiveDate>,
    pub read_time: Option<String>,
    pub tags: Option<Vec<String>>,
    pub featured: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shares_tag() {
        let post = BlogPost {
            id: "p".into(),
            title: "t".into(),
            slug: "t".into(),
            excerpt: String::new(),
            content: String::new(),
            cover_image: None,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            read_time: String::new(),
            tags: vec!["rust".into(), "web".into()],
            featured: false,
            created_at: None,
            updated_at: None,
        };
        assert!(post.shares_tag(&["web".to_string()]));
        assert!(!post.shares_tag(&["go".to_string()]));
        assert!(!post.shares_tag(&[]));
    }
}
