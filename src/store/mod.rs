//! Document store
//!
//! Named collections of JSON documents. Every call carries an optional
//! bearer credential; the store decides per collection and operation whether
//! it has to be verified.
//!
//! - [`DocumentStore`]: the store itself, credential passed per call
//! - [`Collections`]: a store with the credential already bound, which is
//!   what the content services work against
//! - [`HostedDocumentStore`]: SQLite-backed, rule-checked implementation
//! - [`SiteCollections`]: the server's own handle for visitor writes

mod hosted;
pub mod query;
pub mod rules;

pub use crate::db::repositories::CounterChange;
pub use hosted::{HostedDocumentStore, SiteCollections};
pub use query::{Direction, Filter, Order, Query};
pub use rules::{Access, AccessRules, CollectionRules, Operation};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{Document, Fields};

/// Collection names used by the site
pub mod collections {
    pub const BLOG_POSTS: &str = "blog-posts";
    pub const COMMENTS: &str = "comments";
    pub const CONTACT_MESSAGES: &str = "contact-messages";
    pub const LIKES: &str = "likes";
    pub const LIKE_COUNTS: &str = "likeCounts";
}

/// Document store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocumentError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }

    /// Stable code used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidArgument(_) => "VALIDATION_ERROR",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<anyhow::Error> for DocumentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{:#}", err))
    }
}

impl From<serde_json::Error> for DocumentError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

/// A document store addressed with an explicit credential per call
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list(
        &self,
        auth: Option<&str>,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<Document>, DocumentError>;

    async fn get(
        &self,
        auth: Option<&str>,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, DocumentError>;

    /// Create a document under a generated id
    async fn create(
        &self,
        auth: Option<&str>,
        collection: &str,
        fields: Fields,
    ) -> Result<Document, DocumentError>;

    /// Create or replace the document with the given id
    async fn put(
        &self,
        auth: Option<&str>,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<Document, DocumentError>;

    /// Merge fields into an existing document
    async fn update(
        &self,
        auth: Option<&str>,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<Document, DocumentError>;

    /// Delete a document; deleting a missing document succeeds
    async fn delete(&self, auth: Option<&str>, collection: &str, id: &str)
        -> Result<(), DocumentError>;

    /// Atomically add `delta` to a numeric field, creating the document
    /// from `defaults` when missing. Returns the new value.
    async fn increment(
        &self,
        auth: Option<&str>,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
        defaults: Fields,
    ) -> Result<i64, DocumentError>;
}

/// A document store with the caller's credential already bound
#[async_trait]
pub trait Collections: Send + Sync {
    async fn list(&self, collection: &str, query: &Query) -> Result<Vec<Document>, DocumentError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, DocumentError>;

    async fn create(&self, collection: &str, fields: Fields) -> Result<Document, DocumentError>;

    async fn put(&self, collection: &str, id: &str, fields: Fields)
        -> Result<Document, DocumentError>;

    async fn update(&self, collection: &str, id: &str, fields: Fields)
        -> Result<Document, DocumentError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), DocumentError>;

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
        defaults: Fields,
    ) -> Result<i64, DocumentError>;
}

/// Writes paired with a counter change, committed together
#[async_trait]
pub trait CountedCollections: Collections {
    /// Create the document `id` and apply `counter`. Returns the counter
    /// value, or `None` without any change if `id` is taken.
    async fn create_counted(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        counter: CounterChange,
    ) -> Result<Option<i64>, DocumentError>;

    /// Delete the document `id` and apply `counter`. Returns the counter
    /// value, or `None` without any change if `id` does not exist.
    async fn delete_counted(
        &self,
        collection: &str,
        id: &str,
        counter: CounterChange,
    ) -> Result<Option<i64>, DocumentError>;
}

/// Public access: the store without any credential
#[derive(Clone)]
pub struct Anonymous {
    store: Arc<dyn DocumentStore>,
}

impl Anonymous {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Collections for Anonymous {
    async fn list(&self, collection: &str, query: &Query) -> Result<Vec<Document>, DocumentError> {
        self.store.list(None, collection, query).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, DocumentError> {
        self.store.get(None, collection, id).await
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<Document, DocumentError> {
        self.store.create(None, collection, fields).await
    }

    async fn put(&self, collection: &str, id: &str, fields: Fields) -> Result<Document, DocumentError> {
        self.store.put(None, collection, id, fields).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<Document, DocumentError> {
        self.store.update(None, collection, id, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), DocumentError> {
        self.store.delete(None, collection, id).await
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
        defaults: Fields,
    ) -> Result<i64, DocumentError> {
        self.store
            .increment(None, collection, id, field, delta, defaults)
            .await
    }
}

/// Decode documents into records
pub fn records<T: DeserializeOwned>(docs: Vec<Document>) -> Result<Vec<T>, DocumentError> {
    docs.into_iter()
        .map(|d| {
            let id = d.id.clone();
            d.into_record()
                .map_err(|e| DocumentError::Internal(format!("Malformed document {}: {}", id, e)))
        })
        .collect()
}

/// Decode an optional document into a record
pub fn record<T: DeserializeOwned>(doc: Option<Document>) -> Result<Option<T>, DocumentError> {
    Ok(records(doc.into_iter().collect())?.pop())
}
