//! Document repository
//!
//! Stores documents as JSON text keyed by (collection, id). Filtering and
//! ordering happen above this layer; the repository only knows rows.

use crate::db::DbPool;
use crate::models::{Document, Fields};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqliteConnection};
use std::sync::Arc;

/// Expected state of a document when a conditional write runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    Any,
    Exists,
    Missing,
}

impl Precondition {
    pub fn holds(self, exists: bool) -> bool {
        match self {
            Self::Any => true,
            Self::Exists => exists,
            Self::Missing => !exists,
        }
    }
}

/// Counter adjustment applied in the same transaction as another write
#[derive(Debug, Clone)]
pub struct CounterChange {
    pub collection: String,
    pub id: String,
    pub field: String,
    pub delta: i64,
    /// Fields of a counter document created on first use
    pub defaults: Fields,
    /// Lowest value the counter may reach
    pub floor: Option<i64>,
}

/// Document repository trait
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// All documents in a collection, in insertion order
    async fn list(&self, collection: &str) -> Result<Vec<Document>>;

    /// Get a document by id
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Insert a new document; fails if the id is taken
    async fn insert(&self, collection: &str, id: &str, fields: &Fields) -> Result<Document>;

    /// Create or fully replace a document, keeping its original creation time.
    /// Returns `None` without writing when `precondition` does not hold.
    async fn replace(
        &self,
        collection: &str,
        id: &str,
        fields: &Fields,
        precondition: Precondition,
    ) -> Result<Option<Document>>;

    /// Merge fields into an existing document. Returns `None` if it does not exist.
    async fn merge(&self, collection: &str, id: &str, fields: &Fields) -> Result<Option<Document>>;

    /// Delete a document, returning whether it existed
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// Add `delta` to a numeric field, creating the document from `defaults`
    /// when missing. Returns the new value, or `None` without writing when
    /// `precondition` does not hold.
    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
        defaults: &Fields,
        precondition: Precondition,
    ) -> Result<Option<i64>>;

    /// Insert a new document and apply `counter` in one transaction.
    /// Returns the counter value, or `None` if the id is taken.
    async fn insert_counted(
        &self,
        collection: &str,
        id: &str,
        fields: &Fields,
        counter: &CounterChange,
    ) -> Result<Option<i64>>;

    /// Delete a document and apply `counter` in one transaction.
    /// Returns the counter value, or `None` if the document did not exist.
    async fn delete_counted(
        &self,
        collection: &str,
        id: &str,
        counter: &CounterChange,
    ) -> Result<Option<i64>>;
}

/// SQLx-based document repository implementation
pub struct SqlxDocumentRepository {
    pool: DbPool,
}

impl SqlxDocumentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DbPool) -> Arc<dyn DocumentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl DocumentRepository for SqlxDocumentRepository {
    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT id, data, created_at, updated_at
            FROM documents
            WHERE collection = ?
            ORDER BY created_at, rowid
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to list collection {}", collection))?;

        rows.iter().map(row_to_document).collect()
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT id, data, created_at, updated_at
            FROM documents
            WHERE collection = ? AND id = ?
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to get document {}/{}", collection, id))?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn insert(&self, collection: &str, id: &str, fields: &Fields) -> Result<Document> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(serde_json::to_string(fields)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert document {}/{}", collection, id))?;

        Ok(Document {
            id: id.to_string(),
            fields: fields.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn replace(
        &self,
        collection: &str,
        id: &str,
        fields: &Fields,
        precondition: Precondition,
    ) -> Result<Option<Document>> {
        let mut tx = self.pool.begin().await?;
        if !precondition.holds(exists(&mut tx, collection, id).await?) {
            return Ok(None);
        }

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (collection, id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(serde_json::to_string(fields)?)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to replace document {}/{}", collection, id))?;

        let row = sqlx::query(
            "SELECT id, data, created_at, updated_at FROM documents WHERE collection = ? AND id = ?",
        )
        .bind(collection)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        let document = row_to_document(&row)?;

        tx.commit().await?;
        Ok(Some(document))
    }

    async fn merge(&self, collection: &str, id: &str, fields: &Fields) -> Result<Option<Document>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT id, data, created_at, updated_at FROM documents WHERE collection = ? AND id = ?",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut document = row_to_document(&row)?;
        for (key, value) in fields {
            document.fields.insert(key.clone(), value.clone());
        }
        document.updated_at = Utc::now();

        sqlx::query(
            "UPDATE documents SET data = ?, updated_at = ? WHERE collection = ? AND id = ?",
        )
        .bind(serde_json::to_string(&document.fields)?)
        .bind(document.updated_at)
        .bind(collection)
        .bind(id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to update document {}/{}", collection, id))?;

        tx.commit().await?;
        Ok(Some(document))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete document {}/{}", collection, id))?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
        defaults: &Fields,
        precondition: Precondition,
    ) -> Result<Option<i64>> {
        let mut tx = self.pool.begin().await?;
        if !precondition.holds(exists(&mut tx, collection, id).await?) {
            return Ok(None);
        }

        let counter = CounterChange {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            delta,
            defaults: defaults.clone(),
            floor: None,
        };
        let value = apply_counter(&mut tx, &counter).await?;

        tx.commit()
            .await
            .with_context(|| format!("Failed to increment {}/{}.{}", collection, id, field))?;
        Ok(Some(value))
    }

    async fn insert_counted(
        &self,
        collection: &str,
        id: &str,
        fields: &Fields,
        counter: &CounterChange,
    ) -> Result<Option<i64>> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let inserted = sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (collection, id) DO NOTHING
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(serde_json::to_string(fields)?)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert document {}/{}", collection, id))?;

        if inserted.rows_affected() == 0 {
            return Ok(None);
        }

        let value = apply_counter(&mut tx, counter).await?;
        tx.commit().await?;
        Ok(Some(value))
    }

    async fn delete_counted(
        &self,
        collection: &str,
        id: &str,
        counter: &CounterChange,
    ) -> Result<Option<i64>> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to delete document {}/{}", collection, id))?;

        if deleted.rows_affected() == 0 {
            return Ok(None);
        }

        let value = apply_counter(&mut tx, counter).await?;
        tx.commit().await?;
        Ok(Some(value))
    }
}

async fn exists(conn: &mut SqliteConnection, collection: &str, id: &str) -> Result<bool> {
    let row = sqlx::query("SELECT 1 FROM documents WHERE collection = ? AND id = ?")
        .bind(collection)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("Failed to look up document {}/{}", collection, id))?;
    Ok(row.is_some())
}

/// Add the counter's delta, creating the counter document when missing
async fn apply_counter(conn: &mut SqliteConnection, counter: &CounterChange) -> Result<i64> {
    let now = Utc::now();
    let clamp = |value: i64| counter.floor.map_or(value, |floor| value.max(floor));

    let row = sqlx::query("SELECT data FROM documents WHERE collection = ? AND id = ?")
        .bind(&counter.collection)
        .bind(&counter.id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let data: String = row.get("data");
            let mut fields: Fields = serde_json::from_str(&data)?;
            let current = fields.get(&counter.field).and_then(Value::as_i64).unwrap_or(0);
            let value = clamp(current + counter.delta);
            fields.insert(counter.field.clone(), Value::from(value));

            sqlx::query(
                "UPDATE documents SET data = ?, updated_at = ? WHERE collection = ? AND id = ?",
            )
            .bind(serde_json::to_string(&fields)?)
            .bind(now)
            .bind(&counter.collection)
            .bind(&counter.id)
            .execute(&mut *conn)
            .await?;
            Ok(value)
        }
        None => {
            let value = clamp(counter.delta);
            let mut fields = counter.defaults.clone();
            fields.insert(counter.field.clone(), Value::from(value));

            sqlx::query(
                r#"
                INSERT INTO documents (collection, id, data, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&counter.collection)
            .bind(&counter.id)
            .bind(serde_json::to_string(&fields)?)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await?;
            Ok(value)
        }
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let data: String = row.get("data");
    let fields: Fields = serde_json::from_str(&data).context("Corrupt document body")?;
    let created_at: DateTime<Utc> = row.get("created_at");
    let updated_at: DateTime<Utc> = row.get("updated_at");

    Ok(Document {
        id: row.get("id"),
        fields,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use serde_json::json;

    async fn setup_test_repo() -> SqlxDocumentRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxDocumentRepository::new(pool)
    }

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().expect("object")
    }

    #[tokio::test]
    async fn test_insert_get_and_list() {
        let repo = setup_test_repo().await;
        repo.insert("notes", "a", &fields(json!({"n": 1}))).await.unwrap();
        repo.insert("notes", "b", &fields(json!({"n": 2}))).await.unwrap();
        repo.insert("other", "c", &fields(json!({"n": 3}))).await.unwrap();

        let doc = repo.get("notes", "a").await.unwrap().expect("exists");
        assert_eq!(doc.get("n"), Some(&json!(1)));

        let ids: Vec<String> = repo
            .list("notes")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_insert_duplicate_fails() {
        let repo = setup_test_repo().await;
        repo.insert("notes", "a", &Fields::new()).await.unwrap();
        assert!(repo.insert("notes", "a", &Fields::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_replace_keeps_created_at() {
        let repo = setup_test_repo().await;
        let first = repo
            .replace("notes", "a", &fields(json!({"v": 1})), Precondition::Any)
            .await
            .unwrap()
            .expect("written");
        let second = repo
            .replace("notes", "a", &fields(json!({"w": 2})), Precondition::Any)
            .await
            .unwrap()
            .expect("written");

        assert_eq!(first.created_at, second.created_at);
        assert!(second.get("v").is_none());
        assert_eq!(second.get("w"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_merge_missing_returns_none() {
        let repo = setup_test_repo().await;
        let merged = repo.merge("notes", "nope", &fields(json!({"x": 1}))).await.unwrap();
        assert!(merged.is_none());
    }

    #[tokio::test]
    async fn test_merge_keeps_other_fields() {
        let repo = setup_test_repo().await;
        repo.insert("notes", "a", &fields(json!({"title": "t", "read": false})))
            .await
            .unwrap();

        let merged = repo
            .merge("notes", "a", &fields(json!({"read": true})))
            .await
            .unwrap()
            .expect("exists");

        assert_eq!(merged.get("title"), Some(&json!("t")));
        assert_eq!(merged.get("read"), Some(&json!(true)));
        let stored = repo.get("notes", "a").await.unwrap().unwrap();
        assert_eq!(stored.fields, merged.fields);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let repo = setup_test_repo().await;
        repo.insert("notes", "a", &Fields::new()).await.unwrap();
        assert!(repo.delete("notes", "a").await.unwrap());
        assert!(!repo.delete("notes", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_increment_creates_then_adds() {
        let repo = setup_test_repo().await;
        let defaults = fields(json!({"post_id": "p1"}));

        let any = Precondition::Any;
        assert_eq!(repo.increment("counts", "p1", "count", 1, &defaults, any).await.unwrap(), Some(1));
        assert_eq!(repo.increment("counts", "p1", "count", 1, &defaults, any).await.unwrap(), Some(2));
        assert_eq!(repo.increment("counts", "p1", "count", -1, &defaults, any).await.unwrap(), Some(1));

        let doc = repo.get("counts", "p1").await.unwrap().unwrap();
        assert_eq!(doc.get("post_id"), Some(&json!("p1")));
        assert_eq!(doc.get("count"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_conditional_writes_check_existence_in_the_write() {
        let repo = setup_test_repo().await;
        let defaults = Fields::new();

        let missing = repo
            .replace("notes", "a", &fields(json!({"v": 1})), Precondition::Exists)
            .await
            .unwrap();
        assert!(missing.is_none());
        assert!(repo.get("notes", "a").await.unwrap().is_none());

        repo.insert("notes", "a", &Fields::new()).await.unwrap();
        let taken = repo
            .replace("notes", "a", &fields(json!({"v": 2})), Precondition::Missing)
            .await
            .unwrap();
        assert!(taken.is_none());
        assert!(repo.get("notes", "a").await.unwrap().unwrap().get("v").is_none());

        let bumped = repo
            .increment("notes", "b", "n", 1, &defaults, Precondition::Exists)
            .await
            .unwrap();
        assert_eq!(bumped, None);
        assert!(repo.get("notes", "b").await.unwrap().is_none());
    }

    fn counter(delta: i64) -> CounterChange {
        CounterChange {
            collection: "counts".into(),
            id: "p1".into(),
            field: "count".into(),
            delta,
            defaults: fields(json!({"post_id": "p1"})),
            floor: Some(0),
        }
    }

    #[tokio::test]
    async fn test_insert_counted_only_counts_new_documents() {
        let repo = setup_test_repo().await;

        let first = repo.insert_counted("marks", "m1", &Fields::new(), &counter(1)).await.unwrap();
        let again = repo.insert_counted("marks", "m1", &Fields::new(), &counter(1)).await.unwrap();

        assert_eq!(first, Some(1));
        assert_eq!(again, None);
        let doc = repo.get("counts", "p1").await.unwrap().unwrap();
        assert_eq!(doc.get("count"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_delete_counted_respects_floor() {
        let repo = setup_test_repo().await;
        repo.insert("marks", "m1", &Fields::new()).await.unwrap();

        // Counter was never created: the floor keeps it at zero
        assert_eq!(repo.delete_counted("marks", "m1", &counter(-1)).await.unwrap(), Some(0));
        assert_eq!(repo.delete_counted("marks", "m1", &counter(-1)).await.unwrap(), None);
        assert!(repo.get("marks", "m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_counted_inserts_count_once() {
        let repo = Arc::new(setup_test_repo().await);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    let marker = Fields::new();
                    let result = repo.insert_counted("marks", "m1", &marker, &counter(1)).await;
                    result
                })
            })
            .collect();
        let mut counted = 0;
        for task in tasks {
            if task.await.unwrap().unwrap().is_some() {
                counted += 1;
            }
        }

        assert_eq!(counted, 1);
        let doc = repo.get("counts", "p1").await.unwrap().unwrap();
        assert_eq!(doc.get("count"), Some(&json!(1)));
    }
}
