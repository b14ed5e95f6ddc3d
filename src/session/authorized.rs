//! Authorized data access
//!
//! [`AuthorizedStore`] runs admin reads and writes with the tab's bearer
//! credential. A permission-denied answer means the local session is no
//! longer valid: the session is logged out and the error returned, with no
//! retry. Other failures pass through untouched.

use async_trait::async_trait;
use std::sync::Arc;

use super::context::SessionContext;
use crate::blob::{BlobError, BlobStore, Images, UploadedBlob};
use crate::models::{Document, Fields};
use crate::store::{Collections, DocumentError, DocumentStore, Query};

/// Document and blob access on behalf of the signed-in admin
#[derive(Clone)]
pub struct AuthorizedStore {
    store: Arc<dyn DocumentStore>,
    blobs: Option<Arc<dyn BlobStore>>,
    session: Arc<SessionContext>,
}

impl AuthorizedStore {
    pub fn new(store: Arc<dyn DocumentStore>, session: Arc<SessionContext>) -> Self {
        Self {
            store,
            blobs: None,
            session,
        }
    }

    pub fn with_blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Credential for the next call. Without one the call is never made
    /// and counts as denied.
    async fn credential(&self) -> Result<String, DocumentError> {
        match self.session.ensure_credential().await {
            Some(token) => Ok(token),
            None => {
                self.force_logout("no credential available").await;
                Err(DocumentError::PermissionDenied("Not signed in".to_string()))
            }
        }
    }

    async fn checked<T>(&self, result: Result<T, DocumentError>) -> Result<T, DocumentError> {
        if let Err(e) = &result {
            if e.is_permission_denied() {
                self.force_logout(&e.to_string()).await;
            }
        }
        result
    }

    async fn force_logout(&self, reason: &str) {
        tracing::info!("Forcing logout: {}", reason);
        if let Err(e) = self.session.logout().await {
            tracing::warn!("Sign-out during forced logout failed: {}", e);
        }
    }

    async fn blob_credential(&self) -> Result<(Arc<dyn BlobStore>, String), BlobError> {
        let blobs = self
            .blobs
            .clone()
            .ok_or_else(|| BlobError::Unavailable("No blob store configured".to_string()))?;
        let token = self
            .credential()
            .await
            .map_err(|e| BlobError::PermissionDenied(e.to_string()))?;
        Ok((blobs, token))
    }

    async fn checked_blob<T>(&self, result: Result<T, BlobError>) -> Result<T, BlobError> {
        if let Err(e) = &result {
            if e.is_permission_denied() {
                self.force_logout(&e.to_string()).await;
            }
        }
        result
    }
}

#[async_trait]
impl Collections for AuthorizedStore {
    async fn list(&self, collection: &str, query: &Query) -> Result<Vec<Document>, DocumentError> {
        let token = self.credential().await?;
        self.checked(self.store.list(Some(&token), collection, query).await)
            .await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, DocumentError> {
        let token = self.credential().await?;
        self.checked(self.store.get(Some(&token), collection, id).await)
            .await
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<Document, DocumentError> {
        let token = self.credential().await?;
        self.checked(self.store.create(Some(&token), collection, fields).await)
            .await
    }

    async fn put(&self, collection: &str, id: &str, fields: Fields) -> Result<Document, DocumentError> {
        let token = self.credential().await?;
        self.checked(self.store.put(Some(&token), collection, id, fields).await)
            .await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<Document, DocumentError> {
        let token = self.credential().await?;
        self.checked(self.store.update(Some(&token), collection, id, fields).await)
            .await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), DocumentError> {
        let token = self.credential().await?;
        self.checked(self.store.delete(Some(&token), collection, id).await)
            .await
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
        defaults: Fields,
    ) -> Result<i64, DocumentError> {
        let token = self.credential().await?;
        let result = self
            .store
            .increment(Some(&token), collection, id, field, delta, defaults)
            .await;
        self.checked(result).await
    }
}

#[async_trait]
impl Images for AuthorizedStore {
    async fn upload_image(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedBlob, BlobError> {
        let (blobs, token) = self.blob_credential().await?;
        let result = blobs
            .upload(Some(&token), file_name, content_type, bytes)
            .await;
        self.checked_blob(result).await
    }

    async fn delete_image(&self, url: &str) -> Result<(), BlobError> {
        let (blobs, token) = self.blob_credential().await?;
        let result = blobs.delete(Some(&token), url).await;
        self.checked_blob(result).await
    }
}
