//! Identity token repository
//!
//! Database operations for the bearer and refresh tokens issued by the
//! identity authority.
//!
//! This module provides:
//! - `TokenRepository` trait defining the interface for token data access
//! - `SqlxTokenRepository` implementing the trait for SQLite

use crate::db::DbPool;
use crate::models::{IdentityToken, TokenKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

/// Token repository trait
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Store a new token
    async fn create(&self, token: &IdentityToken) -> Result<IdentityToken>;

    /// Look a token up by its value
    async fn get(&self, token: &str) -> Result<Option<IdentityToken>>;

    /// Delete a single token
    async fn delete(&self, token: &str) -> Result<()>;

    /// Delete every token minted for a session, returning how many went
    async fn delete_by_session(&self, session_id: &str) -> Result<u64>;

    /// Delete expired tokens
    async fn delete_expired(&self) -> Result<u64>;
}

/// SQLx-based token repository implementation
pub struct SqlxTokenRepository {
    pool: DbPool,
}

impl SqlxTokenRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DbPool) -> Arc<dyn TokenRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TokenRepository for SqlxTokenRepository {
    async fn create(&self, token: &IdentityToken) -> Result<IdentityToken> {
        sqlx::query(
            r#"
            INSERT INTO identity_tokens (token, kind, session_id, identity, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&token.token)
        .bind(token.kind.to_string())
        .bind(&token.session_id)
        .bind(&token.identity)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to create identity token")?;

        Ok(token.clone())
    }

    async fn get(&self, token: &str) -> Result<Option<IdentityToken>> {
        let row = sqlx::query(
            r#"
            SELECT token, kind, session_id, identity, expires_at, created_at
            FROM identity_tokens
            WHERE token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get identity token")?;

        match row {
            Some(row) => Ok(Some(row_to_token(&row)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM identity_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await
            .context("Failed to delete identity token")?;

        Ok(())
    }

    async fn delete_by_session(&self, session_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM identity_tokens WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete session tokens")?;

        Ok(result.rows_affected())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM identity_tokens WHERE expires_at < ?")
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .context("Failed to delete expired tokens")?;

        Ok(result.rows_affected())
    }
}

fn row_to_token(row: &sqlx::sqlite::SqliteRow) -> Result<IdentityToken> {
    let kind: String = row.get("kind");
    Ok(IdentityToken {
        token: row.get("token"),
        kind: kind.parse::<TokenKind>().map_err(anyhow::Error::msg)?,
        session_id: row.get("session_id"),
        identity: row.get("identity"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    })
}
