//! Identity client
//!
//! Holds at most one signed-in session and broadcasts its state over a
//! `watch` channel. The channel starts unresolved (`None`) and resolves on
//! [`IdentityClient::restore`] or the first sign-in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use super::{AuthEvent, Identity, IdentityBackend, IdentityError, IdentityService, IssuedToken};

#[derive(Debug, Clone)]
struct ClientSession {
    identity: Identity,
    refresh_token: String,
    id_token: Option<(String, DateTime<Utc>)>,
}

/// Client-side identity service over an [`IdentityBackend`]
pub struct IdentityClient {
    backend: Arc<dyn IdentityBackend>,
    session: Mutex<Option<ClientSession>>,
    events: watch::Sender<Option<AuthEvent>>,
}

impl IdentityClient {
    pub fn new(backend: Arc<dyn IdentityBackend>) -> Self {
        let (events, _) = watch::channel(None);
        Self {
            backend,
            session: Mutex::new(None),
            events,
        }
    }

    /// Resolve the initial state, resuming a previous session when a refresh
    /// token survived from an earlier run.
    ///
    /// Emits `SignedIn` if the token still works and `SignedOut` otherwise.
    pub async fn restore(&self, refresh_token: Option<String>) -> Result<(), IdentityError> {
        let Some(refresh_token) = refresh_token else {
            self.publish(AuthEvent::SignedOut);
            return Ok(());
        };

        match self.backend.refresh(&refresh_token).await {
            Ok(issued) => {
                let identity = issued.identity.clone();
                *self.session.lock().await = Some(ClientSession {
                    identity: identity.clone(),
                    refresh_token,
                    id_token: Some((issued.id_token, issued.expires_at)),
                });
                tracing::debug!("Resumed session for {}", identity);
                self.publish(AuthEvent::SignedIn(identity));
                Ok(())
            }
            Err(IdentityError::SessionExpired) => {
                tracing::debug!("Stored session no longer valid");
                self.publish(AuthEvent::SignedOut);
                Ok(())
            }
            Err(e) => {
                self.publish(AuthEvent::SignedOut);
                Err(e)
            }
        }
    }

    /// Refresh token of the current session, for persisting across runs
    pub async fn refresh_token(&self) -> Option<String> {
        self.session.lock().await.as_ref().map(|s| s.refresh_token.clone())
    }

    /// Identity of the current session
    pub async fn current_identity(&self) -> Option<Identity> {
        self.session.lock().await.as_ref().map(|s| s.identity.clone())
    }

    fn publish(&self, event: AuthEvent) {
        self.events.send_if_modified(|current| {
            if current.as_ref() == Some(&event) {
                false
            } else {
                *current = Some(event);
                true
            }
        });
    }
}

#[async_trait]
impl IdentityService for IdentityClient {
    async fn sign_in_with_credentials(
        &self,
        identity: &str,
        secret: &str,
    ) -> Result<Identity, IdentityError> {
        let issued = self.backend.exchange(identity, secret).await?;

        let previous = self.session.lock().await.replace(ClientSession {
            identity: issued.identity.clone(),
            refresh_token: issued.refresh_token,
            id_token: Some((issued.id_token, issued.expires_at)),
        });

        if let Some(previous) = previous {
            if let Err(e) = self.backend.revoke(&previous.refresh_token).await {
                tracing::warn!("Failed to revoke replaced session: {}", e);
            }
        }

        self.publish(AuthEvent::SignedIn(issued.identity.clone()));
        Ok(issued.identity)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        let previous = self.session.lock().await.take();
        self.publish(AuthEvent::SignedOut);

        match previous {
            Some(session) => self.backend.revoke(&session.refresh_token).await,
            None => Ok(()),
        }
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthEvent>> {
        self.events.subscribe()
    }

    async fn current_credential(&self, force_refresh: bool) -> Result<Option<String>, IdentityError> {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return Ok(None);
        };

        if !force_refresh {
            if let Some((token, expires_at)) = &session.id_token {
                if *expires_at > Utc::now() {
                    return Ok(Some(token.clone()));
                }
            }
        }

        let refreshed = self.backend.refresh(&session.refresh_token).await;
        match refreshed {
            Ok(IssuedToken {
                id_token,
                expires_at,
                ..
            }) => {
                session.id_token = Some((id_token.clone(), expires_at));
                Ok(Some(id_token))
            }
            Err(IdentityError::SessionExpired) => {
                *guard = None;
                drop(guard);
                tracing::info!("Session expired remotely, signing out");
                self.publish(AuthEvent::SignedOut);
                Err(IdentityError::SessionExpired)
            }
            Err(e) => Err(e),
        }
    }
}
