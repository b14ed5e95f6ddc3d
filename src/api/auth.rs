//! Authentication API endpoints
//!
//! - POST /api/v1/auth/login: credential exchange, sets the marker cookies
//! - POST /api/v1/auth/token: mint a fresh id token from a refresh token
//! - POST /api/v1/auth/logout: revoke the session, clear the marker cookies

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{extract_ip_address, ApiError, AppState};
use crate::identity::{IdentityError, IssuedSession, IssuedToken};
use crate::services::LoginLimit;
use crate::session::marker::{clear_marker_cookies, set_marker_cookies};

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identity: String,
    pub password: String,
}

/// Refresh or logout request body
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/token", post(refresh_token))
        .route("/logout", post(logout))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = body.identity.trim();
    if identity.is_empty() || body.password.is_empty() {
        return Err(ApiError::validation_error(
            "Identity and password are required",
        ));
    }

    let ip = extract_ip_address(&headers);
    if let Err(limit) = state.rate_limiter.admit(identity, ip).await {
        let retry_after = match limit {
            LoginLimit::Ip { retry_after } | LoginLimit::Identity { retry_after } => retry_after,
        };
        tracing::warn!("Login for {} from {:?} rate limited: {:?}", identity, ip, limit);
        return Err(IdentityError::RateLimited { retry_after }.into());
    }

    let session: IssuedSession = match state.authority.exchange(identity, &body.password).await {
        Ok(session) => session,
        Err(e) => {
            if matches!(e, IdentityError::InvalidCredentials) {
                state.rate_limiter.record_failure(identity).await;
                tracing::warn!("Failed login for {} from {:?}", identity, ip);
            }
            return Err(e.into());
        }
    };
    state.rate_limiter.record_success(identity).await;

    let auth = &state.config.auth;
    let mut response_headers = HeaderMap::new();
    for cookie in set_marker_cookies(
        &session.identity.name,
        auth.marker_max_age_hours,
        auth.secure_cookies,
    ) {
        response_headers.append(header::SET_COOKIE, cookie);
    }

    Ok((response_headers, Json(session)))
}

/// POST /api/v1/auth/token
async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<IssuedToken>, ApiError> {
    let refresh = body
        .refresh_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::validation_error("refresh_token is required"))?;

    Ok(Json(state.authority.refresh(&refresh).await?))
}

/// POST /api/v1/auth/logout
///
/// Always clears the cookies; a refresh token in the body revokes its
/// whole session.
async fn logout(State(state): State<AppState>, body: Bytes) -> Response {
    let mut response_headers = HeaderMap::new();
    for cookie in clear_marker_cookies(state.config.auth.secure_cookies) {
        response_headers.append(header::SET_COOKIE, cookie);
    }

    let refresh = serde_json::from_slice::<RefreshRequest>(&body)
        .ok()
        .and_then(|b| b.refresh_token)
        .filter(|t| !t.is_empty());

    if let Some(refresh) = refresh {
        if let Err(e) = state.authority.revoke(&refresh).await {
            tracing::warn!("Failed to revoke session on logout: {}", e);
            let err = ApiError::from(e);
            return (err.status(), response_headers, Json(err)).into_response();
        }
    }

    (StatusCode::NO_CONTENT, response_headers).into_response()
}
