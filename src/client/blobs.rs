//! Blob store over the uploads API

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};

use super::{check, ApiClient, Failure};
use crate::blob::{BlobError, BlobStore, UploadedBlob};

/// [`BlobStore`] talking to `/api/v1/uploads`
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    api: ApiClient,
}

impl HttpBlobStore {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

fn transport(err: reqwest::Error) -> BlobError {
    BlobError::Unavailable(err.to_string())
}

/// Rejections the server reports as validation errors cannot be told apart
/// on the wire; uploads surface them as `InvalidType`, deletes as
/// `InvalidPath`.
fn rejected(failure: Failure, invalid: fn(String) -> BlobError) -> BlobError {
    match (failure.code.as_str(), failure.status) {
        ("PERMISSION_DENIED" | "UNAUTHORIZED", _)
        | (_, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
            BlobError::PermissionDenied(failure.message)
        }
        ("VALIDATION_ERROR", _) => invalid(failure.message),
        _ if failure.is_unavailable() => BlobError::Unavailable(failure.message),
        _ => BlobError::Io(std::io::Error::other(format!(
            "{}: {}",
            failure.status, failure.message
        ))),
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(
        &self,
        auth: Option<&str>,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedBlob, BlobError> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .map_err(|_| BlobError::InvalidType(content_type.to_string()))?;
        let response = self
            .api
            .request(Method::POST, "/uploads", auth)
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .map_err(transport)?;
        let response = check(response)
            .await
            .map_err(|f| rejected(f, BlobError::InvalidType))?;
        response.json().await.map_err(transport)
    }

    async fn delete(&self, auth: Option<&str>, url: &str) -> Result<(), BlobError> {
        let response = self
            .api
            .request(Method::DELETE, "/uploads", auth)
            .query(&[("url", url)])
            .send()
            .await
            .map_err(transport)?;
        check(response)
            .await
            .map_err(|f| rejected(f, BlobError::InvalidPath))?;
        Ok(())
    }
}
