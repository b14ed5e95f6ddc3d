//! Database migrations module
//!
//! Migrations are embedded directly in Rust code as SQL strings so the
//! binary carries its own schema.
//!
//! # Usage
//!
//! ```ignore
//! use folio::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;

use super::DbPool;

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements
    pub up: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    // Collections of JSON documents (posts, comments, messages, likes)
    Migration {
        version: 1,
        name: "create_documents",
        up: r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection VARCHAR(100) NOT NULL,
                id VARCHAR(100) NOT NULL,
                data TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                PRIMARY KEY (collection, id)
            );
            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
        "#,
    },
    // Bearer and refresh tokens issued by the identity authority
    Migration {
        version: 2,
        name: "create_identity_tokens",
        up: r#"
            CREATE TABLE IF NOT EXISTS identity_tokens (
                token VARCHAR(64) PRIMARY KEY,
                kind VARCHAR(10) NOT NULL,
                session_id VARCHAR(64) NOT NULL,
                identity VARCHAR(255) NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_identity_tokens_session ON identity_tokens(session_id);
            CREATE INDEX IF NOT EXISTS idx_identity_tokens_expires ON identity_tokens(expires_at);
        "#,
    },
];

/// Run all pending migrations
///
/// Returns the number of migrations applied.
pub async fn run_migrations(pool: &DbPool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create migrations table")?;
    Ok(())
}

async fn get_applied_migrations(pool: &DbPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    let mut records = Vec::new();
    for row in rows {
        records.push(MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        });
    }

    Ok(records)
}

async fn apply_migration(pool: &DbPool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await?;

    for statement in split_sql_statements(migration.up) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    if sql.len() > 100 {
        let mut end = 100;
        while !sql.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &sql[..end])
    } else {
        sql.to_string()
    }
}

/// Split SQL into individual statements, dropping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty() && !is_comment_only(s))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines().all(|line| {
        let trimmed = line.trim();
        trimmed.is_empty() || trimmed.starts_with("--")
    })
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DbPool) -> Result<bool> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(applied.len() == MIGRATIONS.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let applied = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(applied, MIGRATIONS.len());
        assert!(is_up_to_date(&pool).await.unwrap());
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.unwrap();
        let second = run_migrations(&pool).await.unwrap();
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn test_documents_primary_key_is_per_collection() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let now = Utc::now();
        for collection in ["blog-posts", "comments"] {
            sqlx::query(
                "INSERT INTO documents (collection, id, data, created_at, updated_at) VALUES (?, 'same', '{}', ?, ?)",
            )
            .bind(collection)
            .bind(now)
            .bind(now)
            .execute(&pool)
            .await
            .expect("same id in two collections should be allowed");
        }

        let duplicate = sqlx::query(
            "INSERT INTO documents (collection, id, data, created_at, updated_at) VALUES ('comments', 'same', '{}', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await;
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n-- comment only\n;CREATE INDEX i ON a(id);";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)", "CREATE INDEX i ON a(id)"]);
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- a\n   -- b"));
        assert!(!is_comment_only("-- a\nSELECT 1"));
    }
}
