//! API plumbing
//!
//! Shared application state, the JSON error envelope and the extractors
//! the handlers share.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::IpAddr;
use std::sync::Arc;

use crate::blob::{BlobError, BlobStore};
use crate::config::Config;
use crate::identity::{IdentityAuthority, IdentityError};
use crate::services::{
    BlogService, BlogServiceError, CommentService, CommentServiceError, LikeService,
    LoginRateLimiter, MessageService, MessageServiceError,
};
use crate::session::RouteGuard;
use crate::store::{Anonymous, Collections, DocumentError, DocumentStore, SiteCollections};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub authority: Arc<IdentityAuthority>,
    pub documents: Arc<dyn DocumentStore>,
    /// Server-held handle for comment and like writes
    pub site: Arc<SiteCollections>,
    pub blobs: Arc<dyn BlobStore>,
    pub rate_limiter: Arc<LoginRateLimiter>,
    pub guard: RouteGuard,
}

impl AppState {
    /// Store handle without credentials, used by the public pages
    pub fn public(&self) -> Arc<dyn Collections> {
        Arc::new(Anonymous::new(self.documents.clone()))
    }

    pub fn blog(&self) -> BlogService {
        BlogService::new(self.public())
    }

    pub fn comments(&self) -> CommentService {
        CommentService::new(self.site.clone())
    }

    pub fn messages(&self) -> MessageService {
        MessageService::new(self.public())
    }

    pub fn likes(&self) -> LikeService {
        LikeService::new(self.site.clone())
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("PERMISSION_DENIED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" | "INVALID_CREDENTIALS" | "SESSION_EXPIRED" => StatusCode::UNAUTHORIZED,
            "PERMISSION_DENIED" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            "UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<DocumentError> for ApiError {
    fn from(err: DocumentError) -> Self {
        if let DocumentError::Internal(detail) = &err {
            tracing::error!("Document store error: {}", detail);
            return Self::internal_error("Internal server error");
        }
        Self::new(err.code(), err.to_string())
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        let message = err.to_string();
        match err {
            IdentityError::InvalidCredentials => Self::new("INVALID_CREDENTIALS", message),
            IdentityError::RateLimited { retry_after } => Self::with_details(
                "RATE_LIMIT",
                message,
                serde_json::json!({ "retry_after": retry_after }),
            ),
            IdentityError::SessionExpired => Self::new("SESSION_EXPIRED", message),
            IdentityError::InvalidToken | IdentityError::NotSignedIn => Self::unauthorized(message),
            IdentityError::Unavailable(_) => Self::new("UNAVAILABLE", message),
            IdentityError::Internal(detail) => {
                tracing::error!("Identity error: {}", detail);
                Self::internal_error("Internal server error")
            }
        }
    }
}

impl From<BlobError> for ApiError {
    fn from(err: BlobError) -> Self {
        let message = err.to_string();
        match err {
            BlobError::PermissionDenied(_) => Self::forbidden(message),
            BlobError::InvalidType(_) | BlobError::TooLarge { .. } | BlobError::InvalidPath(_) => {
                Self::validation_error(message)
            }
            BlobError::Unavailable(_) => Self::new("UNAVAILABLE", message),
            BlobError::Io(e) => {
                tracing::error!("Blob store I/O error: {}", e);
                Self::internal_error("Failed to store file")
            }
        }
    }
}

impl From<BlogServiceError> for ApiError {
    fn from(err: BlogServiceError) -> Self {
        let message = err.to_string();
        match err {
            BlogServiceError::NotFound(_) => Self::not_found(message),
            BlogServiceError::ValidationError(msg) => Self::validation_error(msg),
            BlogServiceError::DuplicateSlug(_) => Self::conflict(message),
            BlogServiceError::Store(e) => e.into(),
        }
    }
}

impl From<CommentServiceError> for ApiError {
    fn from(err: CommentServiceError) -> Self {
        let message = err.to_string();
        match err {
            CommentServiceError::NotFound(_) => Self::not_found(message),
            CommentServiceError::ValidationError(msg) => Self::validation_error(msg),
            CommentServiceError::Store(e) => e.into(),
        }
    }
}

impl From<MessageServiceError> for ApiError {
    fn from(err: MessageServiceError) -> Self {
        let message = err.to_string();
        match err {
            MessageServiceError::NotFound(_) => Self::not_found(message),
            MessageServiceError::ValidationError(msg) => Self::validation_error(msg),
            MessageServiceError::Store(e) => e.into(),
        }
    }
}

/// Bearer credential from the `Authorization` header, if any
#[derive(Debug, Clone, Default)]
pub struct Bearer(pub Option<String>);

impl Bearer {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Bearer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Bearer(extract_bearer(&parts.headers)))
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Client address, from proxy headers
pub fn extract_ip_address(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next() {
            if let Ok(ip) = ip.trim().parse() {
                return Some(ip);
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|ip| ip.trim().parse().ok())
}
