//! Route interceptor
//!
//! Requests under the protected prefix must carry the marker cookie or they
//! are redirected to the login page before any handler runs. The marker is
//! not verified here; data access is checked by the stores.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use super::marker::{is_marker_set, marker_from_headers};
use crate::config::AuthConfig;

/// Outcome of the marker check for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    PassThrough,
    /// Send the caller to the login path
    Redirect(String),
}

/// Stateless path-prefix gate
#[derive(Debug, Clone)]
pub struct RouteGuard {
    protected_prefix: String,
    login_path: String,
}

impl RouteGuard {
    pub fn new(protected_prefix: impl Into<String>, login_path: impl Into<String>) -> Self {
        let prefix: String = protected_prefix.into();
        let prefix = prefix.trim_end_matches('/');
        Self {
            protected_prefix: if prefix.is_empty() { "/".into() } else { prefix.into() },
            login_path: login_path.into(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.protected_prefix.clone(), config.login_path.clone())
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Whether `path` falls under the protected prefix. Matching follows
    /// path segments: `/admin` guards `/admin` and `/admin/x`, not
    /// `/administrator`.
    pub fn is_protected(&self, path: &str) -> bool {
        if self.protected_prefix == "/" {
            return true;
        }
        match path.strip_prefix(self.protected_prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    pub fn decide(&self, path: &str, marker: Option<&str>) -> RouteDecision {
        if !self.is_protected(path) || is_marker_set(marker) {
            RouteDecision::PassThrough
        } else {
            RouteDecision::Redirect(self.login_path.clone())
        }
    }
}

/// Middleware applying a [`RouteGuard`] to every request
pub async fn route_interceptor(
    State(guard): State<RouteGuard>,
    request: Request,
    next: Next,
) -> Response {
    let marker = marker_from_headers(request.headers());

    match guard.decide(request.uri().path(), marker.as_deref()) {
        RouteDecision::PassThrough => next.run(request).await,
        RouteDecision::Redirect(target) => {
            tracing::debug!("No marker on {}, redirecting to {}", request.uri().path(), target);
            Redirect::temporary(&target).into_response()
        }
    }
}
