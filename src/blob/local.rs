//! Blob store on the local filesystem

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

use super::{storage_path_from_url, BlobError, BlobStore, UploadedBlob, IMAGE_FOLDER};
use crate::config::UploadConfig;
use crate::identity::{IdentityError, TokenVerifier};

/// Files under the configured upload directory
pub struct LocalBlobStore {
    config: UploadConfig,
    verifier: Arc<dyn TokenVerifier>,
}

impl LocalBlobStore {
    pub fn new(config: UploadConfig, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { config, verifier }
    }

    /// Upload root on disk
    pub fn root(&self) -> &PathBuf {
        &self.config.path
    }

    async fn authorize(&self, auth: Option<&str>) -> Result<(), BlobError> {
        let token = auth.ok_or_else(|| BlobError::PermissionDenied("Sign-in required".into()))?;
        match self.verifier.verify(token).await {
            Ok(_) => Ok(()),
            Err(IdentityError::Unavailable(msg)) | Err(IdentityError::Internal(msg)) => {
                Err(BlobError::Unavailable(msg))
            }
            Err(e) => Err(BlobError::PermissionDenied(e.to_string())),
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.public_prefix.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(
        &self,
        auth: Option<&str>,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedBlob, BlobError> {
        self.authorize(auth).await?;

        if !self.config.is_type_allowed(content_type) {
            return Err(BlobError::InvalidType(content_type.to_string()));
        }
        let size = bytes.len() as u64;
        if size > self.config.max_file_size {
            return Err(BlobError::TooLarge {
                size,
                max: self.config.max_file_size,
            });
        }

        let dir = self.config.path.join(IMAGE_FOLDER);
        fs::create_dir_all(&dir).await?;

        let name = format!("{}.{}", Uuid::new_v4(), self.config.get_extension(content_type));
        fs::write(dir.join(&name), &bytes).await?;

        let path = format!("{}/{}", IMAGE_FOLDER, name);
        tracing::debug!("Stored {} ({} bytes) as {}", file_name, size, path);

        Ok(UploadedBlob {
            url: self.public_url(&path),
            path,
            size,
            content_type: content_type.to_string(),
        })
    }

    async fn delete(&self, auth: Option<&str>, url: &str) -> Result<(), BlobError> {
        self.authorize(auth).await?;

        let path = storage_path_from_url(url, &self.config.public_prefix)?;
        match fs::remove_file(self.config.path.join(&path)).await {
            Ok(()) => {
                tracing::debug!("Deleted blob {}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
