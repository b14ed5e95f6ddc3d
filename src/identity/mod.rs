//! Identity service
//!
//! The server side is [`IdentityAuthority`]: it checks configured account
//! secrets, mints opaque id and refresh tokens and verifies id tokens for the
//! stores. The client side is [`IdentityClient`], which holds one signed-in
//! session and publishes sign-in / sign-out events to subscribers.
//!
//! The two halves meet at [`IdentityBackend`], implemented in-process by the
//! authority and over HTTP by [`crate::client::HttpIdentityBackend`].

pub mod authority;
pub mod client;

pub use authority::IdentityAuthority;
pub use client::IdentityClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::watch;

/// An authenticated actor. Any signed-in identity is an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Account name, usually an email address
    pub name: String,
}

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Authentication state change delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Identity),
    SignedOut,
}

impl AuthEvent {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::SignedIn(identity) => Some(identity),
            Self::SignedOut => None,
        }
    }
}

/// Result of a successful credential exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedSession {
    pub identity: Identity,
    /// Short-lived bearer credential
    pub id_token: String,
    /// Long-lived token used to mint new id tokens
    pub refresh_token: String,
    /// Expiry of `id_token`
    pub expires_at: DateTime<Utc>,
}

/// A freshly minted id token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub identity: Identity,
    pub id_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Identity service errors
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid identity or password")]
    InvalidCredentials,

    #[error("Too many login attempts, retry in {retry_after} seconds")]
    RateLimited { retry_after: i64 },

    #[error("Session expired or revoked")]
    SessionExpired,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Identity service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for IdentityError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{:#}", err))
    }
}

/// Operations the session guard consumes from an identity service.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Exchange an identity and secret for a session
    async fn sign_in_with_credentials(
        &self,
        identity: &str,
        secret: &str,
    ) -> Result<Identity, IdentityError>;

    /// End the current session. Local state is cleared even when the remote
    /// call fails; the failure is still returned.
    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Subscribe to authentication state. The current value is `None` until
    /// the service has resolved its initial state. Dropping the receiver
    /// unsubscribes.
    fn subscribe(&self) -> watch::Receiver<Option<AuthEvent>>;

    /// Bearer credential of the signed-in identity, minting a new one when
    /// `force_refresh` is set. `Ok(None)` when nobody is signed in.
    async fn current_credential(&self, force_refresh: bool) -> Result<Option<String>, IdentityError>;
}

/// Authoritative check of a bearer credential
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError>;
}

/// Remote half of the identity service, as seen by [`IdentityClient`]
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    async fn exchange(&self, identity: &str, secret: &str) -> Result<IssuedSession, IdentityError>;

    async fn refresh(&self, refresh_token: &str) -> Result<IssuedToken, IdentityError>;

    async fn revoke(&self, refresh_token: &str) -> Result<(), IdentityError>;
}
