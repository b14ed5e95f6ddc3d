//! Database connection pool
//!
//! folio keeps its documents and identity tokens in a single SQLite
//! database. File-based databases get their parent directory created on
//! first start.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::config::DatabaseConfig;

/// Shared pool handle
pub type DbPool = SqlitePool;

/// Normalize a configured database location into a sqlx connection URL.
fn connection_url(url: &str) -> String {
    if url == ":memory:" || url == "sqlite::memory:" {
        "sqlite::memory:".to_string()
    } else if url.starts_with("sqlite:") {
        if url.contains('?') {
            url.to_string()
        } else {
            format!("{}?mode=rwc", url)
        }
    } else {
        format!("sqlite:{}?mode=rwc", url)
    }
}

fn is_memory(url: &str) -> bool {
    url.starts_with(":memory:") || url.starts_with("sqlite::memory:")
}

/// Create a database connection pool from configuration.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let url = config.url.as_str();

    if !is_memory(url) {
        let path = url.trim_start_matches("sqlite:");
        let path = path.split('?').next().unwrap_or(path);
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
            }
        }
    }

    // In-memory databases live per connection set, keep a single connection
    // so every query sees the same data.
    let mut options = SqlitePoolOptions::new().max_connections(20);
    if is_memory(url) {
        options = options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = options
        .connect(&connection_url(url))
        .await
        .with_context(|| format!("Failed to connect to SQLite database: {}", url))?;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .context("Failed to enable foreign keys")?;

    Ok(pool)
}

/// Create a SQLite in-memory database pool for testing
pub async fn create_test_pool() -> Result<DbPool> {
    let config = DatabaseConfig {
        url: ":memory:".to_string(),
    };
    create_pool(&config).await
}

/// Check that the database answers
pub async fn ping(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Database ping failed")?;
    Ok(())
}
