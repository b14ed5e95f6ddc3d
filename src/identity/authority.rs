//! Identity authority
//!
//! Accounts come from configuration. A successful exchange opens a session:
//! one refresh token plus any number of id tokens minted from it, all
//! sharing a session id so they can be revoked together.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    Identity, IdentityBackend, IdentityError, IssuedSession, IssuedToken, TokenVerifier,
};
use crate::config::AuthConfig;
use crate::db::repositories::TokenRepository;
use crate::models::{IdentityToken, TokenKind};
use crate::services::password::verify_password;

/// Issues and verifies identity tokens
pub struct IdentityAuthority {
    /// Lowercased identity -> (configured identity, password hash)
    accounts: HashMap<String, (String, String)>,
    tokens: Arc<dyn TokenRepository>,
    id_token_ttl: Duration,
    refresh_token_ttl: Duration,
}

impl IdentityAuthority {
    pub fn new(config: &AuthConfig, tokens: Arc<dyn TokenRepository>) -> Self {
        let accounts = config
            .accounts
            .iter()
            .map(|a| {
                (
                    a.identity.to_lowercase(),
                    (a.identity.clone(), a.password_hash.clone()),
                )
            })
            .collect();

        Self {
            accounts,
            tokens,
            id_token_ttl: Duration::minutes(config.id_token_ttl_minutes),
            refresh_token_ttl: Duration::days(config.refresh_token_ttl_days),
        }
    }

    /// Number of configured accounts
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Check a secret and open a new session.
    pub async fn exchange(&self, identity: &str, secret: &str) -> Result<IssuedSession, IdentityError> {
        let (name, hash) = self
            .accounts
            .get(&identity.to_lowercase())
            .cloned()
            .ok_or(IdentityError::InvalidCredentials)?;

        let secret = secret.to_string();
        let valid = tokio::task::spawn_blocking(move || verify_password(&secret, &hash))
            .await
            .map_err(|e| IdentityError::Internal(e.to_string()))??;
        if !valid {
            return Err(IdentityError::InvalidCredentials);
        }

        let session_id = Uuid::new_v4().to_string();
        let refresh = self
            .mint(TokenKind::Refresh, &session_id, &name, self.refresh_token_ttl)
            .await?;
        let id = self.mint(TokenKind::Id, &session_id, &name, self.id_token_ttl).await?;

        tracing::info!("Opened session {} for {}", session_id, name);

        Ok(IssuedSession {
            identity: Identity::new(name),
            id_token: id.token,
            refresh_token: refresh.token,
            expires_at: id.expires_at,
        })
    }

    /// Mint a new id token from a live refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedToken, IdentityError> {
        let refresh = self
            .tokens
            .get(refresh_token)
            .await?
            .filter(|t| t.kind == TokenKind::Refresh && !t.is_expired())
            .ok_or(IdentityError::SessionExpired)?;

        if !self.accounts.contains_key(&refresh.identity.to_lowercase()) {
            // Account removed from configuration since the session opened
            self.tokens.delete_by_session(&refresh.session_id).await?;
            return Err(IdentityError::SessionExpired);
        }

        let id = self
            .mint(TokenKind::Id, &refresh.session_id, &refresh.identity, self.id_token_ttl)
            .await?;

        Ok(IssuedToken {
            identity: Identity::new(refresh.identity),
            id_token: id.token,
            expires_at: id.expires_at,
        })
    }

    /// Resolve an id token to its identity.
    pub async fn verify(&self, id_token: &str) -> Result<Identity, IdentityError> {
        let token = self
            .tokens
            .get(id_token)
            .await?
            .filter(|t| t.kind == TokenKind::Id && !t.is_expired())
            .ok_or(IdentityError::InvalidToken)?;

        Ok(Identity::new(token.identity))
    }

    /// Close the session a refresh token belongs to. Unknown tokens are ignored.
    pub async fn revoke(&self, refresh_token: &str) -> Result<(), IdentityError> {
        if let Some(token) = self.tokens.get(refresh_token).await? {
            if token.kind == TokenKind::Refresh {
                let removed = self.tokens.delete_by_session(&token.session_id).await?;
                tracing::info!(
                    "Closed session {} for {} ({} tokens)",
                    token.session_id,
                    token.identity,
                    removed
                );
            }
        }
        Ok(())
    }

    /// Delete expired tokens, returning how many went.
    pub async fn purge_expired(&self) -> Result<u64, IdentityError> {
        Ok(self.tokens.delete_expired().await?)
    }

    async fn mint(
        &self,
        kind: TokenKind,
        session_id: &str,
        identity: &str,
        ttl: Duration,
    ) -> Result<IdentityToken, IdentityError> {
        let now = Utc::now();
        let token = IdentityToken {
            token: Uuid::new_v4().simple().to_string(),
            kind,
            session_id: session_id.to_string(),
            identity: identity.to_string(),
            expires_at: now + ttl,
            created_at: now,
        };
        Ok(self.tokens.create(&token).await?)
    }
}

#[async_trait]
impl TokenVerifier for IdentityAuthority {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        IdentityAuthority::verify(self, token).await
    }
}

#[async_trait]
impl IdentityBackend for IdentityAuthority {
    async fn exchange(&self, identity: &str, secret: &str) -> Result<IssuedSession, IdentityError> {
        IdentityAuthority::exchange(self, identity, secret).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<IssuedToken, IdentityError> {
        IdentityAuthority::refresh(self, refresh_token).await
    }

    async fn revoke(&self, refresh_token: &str) -> Result<(), IdentityError> {
        IdentityAuthority::revoke(self, refresh_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_authority, ADMIN_IDENTITY, ADMIN_SECRET};

    #[tokio::test]
    async fn test_exchange_issues_verifiable_token() {
        let (authority, _pool) = test_authority().await;

        let session = authority.exchange(ADMIN_IDENTITY, ADMIN_SECRET).await.unwrap();

        assert_eq!(session.identity.name, ADMIN_IDENTITY);
        assert_ne!(session.id_token, session.refresh_token);
        let identity = authority.verify(&session.id_token).await.unwrap();
        assert_eq!(identity.name, ADMIN_IDENTITY);
    }

    #[tokio::test]
    async fn test_exchange_is_case_insensitive_on_identity() {
        let (authority, _pool) = test_authority().await;
        let session = authority
            .exchange(&ADMIN_IDENTITY.to_uppercase(), ADMIN_SECRET)
            .await
            .unwrap();
        assert_eq!(session.identity.name, ADMIN_IDENTITY);
    }

    #[tokio::test]
    async fn test_exchange_rejects_bad_credentials() {
        let (authority, _pool) = test_authority().await;

        let wrong_secret = authority.exchange(ADMIN_IDENTITY, "nope").await;
        assert!(matches!(wrong_secret, Err(IdentityError::InvalidCredentials)));

        let unknown = authority.exchange("stranger@example.com", ADMIN_SECRET).await;
        assert!(matches!(unknown, Err(IdentityError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_a_bearer_credential() {
        let (authority, _pool) = test_authority().await;
        let session = authority.exchange(ADMIN_IDENTITY, ADMIN_SECRET).await.unwrap();

        let result = authority.verify(&session.refresh_token).await;
        assert!(matches!(result, Err(IdentityError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_refresh_mints_new_token() {
        let (authority, _pool) = test_authority().await;
        let session = authority.exchange(ADMIN_IDENTITY, ADMIN_SECRET).await.unwrap();

        let issued = authority.refresh(&session.refresh_token).await.unwrap();

        assert_ne!(issued.id_token, session.id_token);
        assert!(authority.verify(&issued.id_token).await.is_ok());
        assert!(authority.verify(&session.id_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_with_id_token_fails() {
        let (authority, _pool) = test_authority().await;
        let session = authority.exchange(ADMIN_IDENTITY, ADMIN_SECRET).await.unwrap();

        let result = authority.refresh(&session.id_token).await;
        assert!(matches!(result, Err(IdentityError::SessionExpired)));
    }

    #[tokio::test]
    async fn test_revoke_closes_whole_session() {
        let (authority, _pool) = test_authority().await;
        let session = authority.exchange(ADMIN_IDENTITY, ADMIN_SECRET).await.unwrap();
        let minted = authority.refresh(&session.refresh_token).await.unwrap();
        let other = authority.exchange(ADMIN_IDENTITY, ADMIN_SECRET).await.unwrap();

        authority.revoke(&session.refresh_token).await.unwrap();

        assert!(authority.verify(&session.id_token).await.is_err());
        assert!(authority.verify(&minted.id_token).await.is_err());
        assert!(authority.refresh(&session.refresh_token).await.is_err());
        assert!(authority.verify(&other.id_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_revoke_unknown_token_is_ok() {
        let (authority, _pool) = test_authority().await;
        authority.revoke("never-issued").await.unwrap();
        authority.revoke("never-issued").await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_id_token_is_rejected() {
        let (authority, pool) = test_authority().await;
        let session = authority.exchange(ADMIN_IDENTITY, ADMIN_SECRET).await.unwrap();

        sqlx::query("UPDATE identity_tokens SET expires_at = ? WHERE token = ?")
            .bind(Utc::now() - Duration::minutes(1))
            .bind(&session.id_token)
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(
            authority.verify(&session.id_token).await,
            Err(IdentityError::InvalidToken)
        ));
        assert_eq!(authority.purge_expired().await.unwrap(), 1);
    }
}
