//! Blob store for post images
//!
//! Uploads land under `blog-images/` inside the upload root and are served
//! beneath the configured public prefix. Both upload and delete need an
//! admin credential.

mod local;

pub use local::LocalBlobStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Folder inside the upload root that holds post images
pub const IMAGE_FOLDER: &str = "blog-images";

/// A stored blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedBlob {
    /// Public URL of the blob
    pub url: String,
    /// Path relative to the upload root
    pub path: String,
    pub size: u64,
    pub content_type: String,
}

/// Blob store errors
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid file type: {0}")]
    InvalidType(String),

    #[error("File too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("Blob store unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlobError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

/// Blob store addressed with an explicit credential per call
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(
        &self,
        auth: Option<&str>,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedBlob, BlobError>;

    /// Delete by public URL or storage path; a missing blob is not an error
    async fn delete(&self, auth: Option<&str>, url: &str) -> Result<(), BlobError>;
}

/// Blob store with the caller's credential already bound
#[async_trait]
pub trait Images: Send + Sync {
    async fn upload_image(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedBlob, BlobError>;

    async fn delete_image(&self, url: &str) -> Result<(), BlobError>;
}

/// Turn a public URL or bare storage path into a path relative to the upload
/// root.
///
/// Accepts absolute URLs (`https://host/uploads/blog-images/a.png`), public
/// paths (`/uploads/blog-images/a.png`) and storage paths
/// (`blog-images/a.png`). Percent-escapes are decoded. Paths that would
/// leave the upload root are rejected.
pub fn storage_path_from_url(url: &str, public_prefix: &str) -> Result<String, BlobError> {
    let mut path = url.trim();

    if let Some(rest) = path
        .strip_prefix("https://")
        .or_else(|| path.strip_prefix("http://"))
    {
        path = rest.find('/').map(|i| &rest[i..]).unwrap_or("");
    }
    path = path.split(['?', '#']).next().unwrap_or("");

    let prefix = public_prefix.trim_end_matches('/');
    if !prefix.is_empty() {
        if let Some(rest) = path.strip_prefix(prefix) {
            if rest.starts_with('/') {
                path = rest;
            }
        }
    }

    let decoded = urlencoding::decode(path.trim_start_matches('/'))
        .map_err(|_| BlobError::InvalidPath(url.to_string()))?;

    let mut parts = Vec::new();
    for part in decoded.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(BlobError::InvalidPath(url.to_string())),
            p if p.contains('\\') || p.contains('\0') => {
                return Err(BlobError::InvalidPath(url.to_string()))
            }
            p => parts.push(p),
        }
    }

    if parts.is_empty() {
        return Err(BlobError::InvalidPath(url.to_string()));
    }
    Ok(parts.join("/"))
}
