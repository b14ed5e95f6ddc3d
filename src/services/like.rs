//! Post likes
//!
//! A like is a `likes` document keyed by visitor and post; the per-post
//! total lives in a `likeCounts` counter. Liking and unliking are idempotent
//! for a visitor and the total never drops below zero. Each like and its
//! counter change commit together, so concurrent likes from one visitor
//! count once.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use crate::models::{to_fields, Fields, Like, LikeCount};
use crate::store::collections::{LIKES, LIKE_COUNTS};
use crate::store::{record, Collections, CountedCollections, CounterChange, DocumentError};

pub struct LikeService {
    store: Arc<dyn CountedCollections>,
}

impl LikeService {
    pub fn new(store: Arc<dyn CountedCollections>) -> Self {
        Self { store }
    }

    /// Like a post. Returns the current count.
    pub async fn like(
        &self,
        visitor_id: &str,
        post_id: &str,
        post_slug: &str,
    ) -> Result<i64, DocumentError> {
        let like = Like {
            visitor_id: visitor_id.to_string(),
            post_id: post_id.to_string(),
            post_slug: post_slug.to_string(),
            created_at: Utc::now(),
        };
        let like_id = Like::document_id(visitor_id, post_id);
        let counter = counter_change(post_id, post_slug, 1);

        match self
            .store
            .create_counted(LIKES, &like_id, to_fields(&like)?, counter)
            .await?
        {
            Some(count) => {
                tracing::debug!("Post {} liked, {} total", post_id, count);
                Ok(count)
            }
            None => self.like_count(post_id).await,
        }
    }

    /// Withdraw a like. Returns the current count.
    pub async fn unlike(&self, visitor_id: &str, post_id: &str) -> Result<i64, DocumentError> {
        let like_id = Like::document_id(visitor_id, post_id);
        let counter = counter_change(post_id, "", -1);

        match self.store.delete_counted(LIKES, &like_id, counter).await? {
            Some(count) => Ok(count),
            None => self.like_count(post_id).await,
        }
    }

    pub async fn has_liked(&self, visitor_id: &str, post_id: &str) -> Result<bool, DocumentError> {
        let like_id = Like::document_id(visitor_id, post_id);
        Ok(self.store.get(LIKES, &like_id).await?.is_some())
    }

    pub async fn like_count(&self, post_id: &str) -> Result<i64, DocumentError> {
        let counter: Option<LikeCount> = record(self.store.get(LIKE_COUNTS, post_id).await?)?;
        Ok(counter.map(|c| c.count.max(0)).unwrap_or(0))
    }
}

/// Counter adjustment for a post, never going below zero
fn counter_change(post_id: &str, post_slug: &str, delta: i64) -> CounterChange {
    let defaults = match json!({ "post_id": post_id, "post_slug": post_slug }) {
        serde_json::Value::Object(fields) => fields,
        _ => Fields::new(),
    };
    CounterChange {
        collection: LIKE_COUNTS.to_string(),
        id: post_id.to_string(),
        field: "count".to_string(),
        delta,
        defaults,
        floor: Some(0),
    }
}
