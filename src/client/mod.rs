//! HTTP clients for the site API
//!
//! Remote implementations of the identity backend, the document store and
//! the blob store, talking to a running server's `/api/v1` endpoints. Error
//! bodies are decoded back into the typed errors of each store.

pub mod blobs;
pub mod documents;
pub mod identity;

pub use blobs::HttpBlobStore;
pub use documents::HttpDocumentStore;
pub use identity::HttpIdentityBackend;

use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;

use crate::api::ApiError;

/// Default per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection to a site API
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// `base_url` is the server root, e.g. `https://example.com`
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("folio/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    pub(crate) fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        auth: Option<&str>,
    ) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match auth {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// A non-success response, decoded as far as the body allows
#[derive(Debug)]
pub(crate) struct Failure {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl Failure {
    async fn read(response: Response) -> Self {
        let status = response.status();
        match response.json::<ApiError>().await {
            Ok(body) => Self {
                status,
                code: body.error.code,
                message: body.error.message,
                details: body.error.details,
            },
            Err(_) => Self {
                status,
                code: String::new(),
                message: status.to_string(),
                details: None,
            },
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.code == "UNAVAILABLE" || (self.status.is_server_error() && self.code.is_empty())
    }
}

/// Pass a success response through, or decode the failure
pub(crate) async fn check(response: Response) -> Result<Response, Failure> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(Failure::read(response).await)
    }
}

/// Path segment escaping for collection names, ids and the like
pub(crate) fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
