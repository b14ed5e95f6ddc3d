//! Identity backend over the auth endpoints

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;

use super::{check, ApiClient, Failure};
use crate::identity::{IdentityBackend, IdentityError, IssuedSession, IssuedToken};

/// [`IdentityBackend`] talking to `/api/v1/auth`
#[derive(Debug, Clone)]
pub struct HttpIdentityBackend {
    api: ApiClient,
}

impl HttpIdentityBackend {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

fn transport(err: reqwest::Error) -> IdentityError {
    IdentityError::Unavailable(err.to_string())
}

impl From<Failure> for IdentityError {
    fn from(failure: Failure) -> Self {
        match failure.code.as_str() {
            "INVALID_CREDENTIALS" => Self::InvalidCredentials,
            "SESSION_EXPIRED" => Self::SessionExpired,
            "UNAUTHORIZED" => Self::InvalidToken,
            "RATE_LIMIT" => Self::RateLimited {
                retry_after: failure
                    .details
                    .as_ref()
                    .and_then(|d| d.get("retry_after"))
                    .and_then(|v| v.as_i64())
                    .unwrap_or(60),
            },
            _ if failure.is_unavailable() => Self::Unavailable(failure.message),
            _ => Self::Internal(format!("{}: {}", failure.status, failure.message)),
        }
    }
}

#[async_trait]
impl IdentityBackend for HttpIdentityBackend {
    async fn exchange(&self, identity: &str, secret: &str) -> Result<IssuedSession, IdentityError> {
        let response = self
            .api
            .request(Method::POST, "/auth/login", None)
            .json(&json!({ "identity": identity, "password": secret }))
            .send()
            .await
            .map_err(transport)?;
        let response = check(response).await?;
        response.json().await.map_err(transport)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<IssuedToken, IdentityError> {
        let response = self
            .api
            .request(Method::POST, "/auth/token", None)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(transport)?;
        let response = check(response).await?;
        response.json().await.map_err(transport)
    }

    async fn revoke(&self, refresh_token: &str) -> Result<(), IdentityError> {
        let response = self
            .api
            .request(Method::POST, "/auth/logout", None)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(transport)?;
        check(response).await?;
        Ok(())
    }
}
