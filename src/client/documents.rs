//! Document store over the documents API

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

use super::{check, segment, ApiClient, Failure};
use crate::api::documents::{IncrementRequest, IncrementResponse};
use crate::models::{Document, Fields};
use crate::store::{DocumentError, DocumentStore, Query};

/// [`DocumentStore`] talking to `/api/v1/documents` and `/api/v1/query`
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    api: ApiClient,
}

impl HttpDocumentStore {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn document_path(collection: &str, id: &str) -> String {
        format!("/documents/{}/{}", segment(collection), segment(id))
    }
}

fn transport(err: reqwest::Error) -> DocumentError {
    DocumentError::Unavailable(err.to_string())
}

impl From<Failure> for DocumentError {
    fn from(failure: Failure) -> Self {
        match (failure.code.as_str(), failure.status) {
            ("PERMISSION_DENIED" | "UNAUTHORIZED", _)
            | (_, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                Self::PermissionDenied(failure.message)
            }
            ("NOT_FOUND", _) => Self::NotFound(failure.message),
            ("VALIDATION_ERROR", _) => Self::InvalidArgument(failure.message),
            _ if failure.is_unavailable() => Self::Unavailable(failure.message),
            _ => Self::Internal(format!("{}: {}", failure.status, failure.message)),
        }
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, DocumentError> {
    let response = check(response).await?;
    response.json().await.map_err(transport)
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn list(
        &self,
        auth: Option<&str>,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<Document>, DocumentError> {
        let path = format!("/query/{}", segment(collection));
        let response = self
            .api
            .request(Method::POST, &path, auth)
            .json(query)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn get(
        &self,
        auth: Option<&str>,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, DocumentError> {
        let response = self
            .api
            .request(Method::GET, &Self::document_path(collection, id), auth)
            .send()
            .await
            .map_err(transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response).await.map(Some)
    }

    async fn create(
        &self,
        auth: Option<&str>,
        collection: &str,
        fields: Fields,
    ) -> Result<Document, DocumentError> {
        let path = format!("/documents/{}", segment(collection));
        let response = self
            .api
            .request(Method::POST, &path, auth)
            .json(&fields)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn put(
        &self,
        auth: Option<&str>,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<Document, DocumentError> {
        let response = self
            .api
            .request(Method::PUT, &Self::document_path(collection, id), auth)
            .json(&fields)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn update(
        &self,
        auth: Option<&str>,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<Document, DocumentError> {
        let response = self
            .api
            .request(Method::PATCH, &Self::document_path(collection, id), auth)
            .json(&fields)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn delete(
        &self,
        auth: Option<&str>,
        collection: &str,
        id: &str,
    ) -> Result<(), DocumentError> {
        let response = self
            .api
            .request(Method::DELETE, &Self::document_path(collection, id), auth)
            .send()
            .await
            .map_err(transport)?;
        check(response).await?;
        Ok(())
    }

    async fn increment(
        &self,
        auth: Option<&str>,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
        defaults: Fields,
    ) -> Result<i64, DocumentError> {
        let path = format!("{}/increment", Self::document_path(collection, id));
        let body = IncrementRequest {
            field: field.to_string(),
            delta,
            defaults,
        };
        let response = self
            .api
            .request(Method::POST, &path, auth)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let IncrementResponse { value } = decode(response).await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::collections::{BLOG_POSTS, CONTACT_MESSAGES, LIKE_COUNTS};
    use crate::store::Filter;
    use crate::testing::{admin_token, spawn_server, test_state};
    use serde_json::json;
    use tempfile::TempDir;

    fn fields(value: serde_json::Value) -> Fields {
        serde_json::from_value(value).unwrap()
    }

    async fn remote() -> (HttpDocumentStore, String, TempDir) {
        let uploads = TempDir::new().unwrap();
        let (state, _store) = test_state(uploads.path()).await;
        let token = admin_token(&state.authority).await;
        let base = spawn_server(state).await;
        (HttpDocumentStore::new(ApiClient::new(base).unwrap()), token, uploads)
    }

    #[tokio::test]
    async fn test_crud_round_trip() {
        let (store, token, _uploads) = remote().await;
        let auth = Some(token.as_str());

        let created = store
            .create(auth, BLOG_POSTS, fields(json!({ "title": "Hello", "slug": "hello" })))
            .await
            .unwrap();

        let fetched = store.get(None, BLOG_POSTS, &created.id).await.unwrap().unwrap();
        assert_eq!(fetched.fields["title"], "Hello");

        let updated = store
            .update(auth, BLOG_POSTS, &created.id, fields(json!({ "title": "Hi" })))
            .await
            .unwrap();
        assert_eq!(updated.fields["slug"], "hello");
        assert_eq!(updated.fields["title"], "Hi");

        let found = store
            .list(
                None,
                BLOG_POSTS,
                &Query {
                    filters: vec![Filter::Eq {
                        field: "slug".into(),
                        value: json!("hello"),
                    }],
                    ..Query::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        store.delete(auth, BLOG_POSTS, &created.id).await.unwrap();
        assert!(store.get(None, BLOG_POSTS, &created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rules_surface_as_permission_denied() {
        let (store, _token, _uploads) = remote().await;

        let denied = store.list(None, CONTACT_MESSAGES, &Query::default()).await;
        assert!(matches!(denied, Err(DocumentError::PermissionDenied(_))));

        let forged = store
            .create(Some("forged"), BLOG_POSTS, fields(json!({ "title": "x" })))
            .await;
        assert!(matches!(forged, Err(DocumentError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let (store, token, _uploads) = remote().await;

        let result = store
            .update(Some(&token), BLOG_POSTS, "missing", fields(json!({ "a": 1 })))
            .await;
        assert!(matches!(result, Err(DocumentError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_counters_increment_for_admins_only() {
        let (store, token, _uploads) = remote().await;

        let denied = store
            .increment(None, LIKE_COUNTS, "p1", "count", 1, Fields::new())
            .await;
        assert!(matches!(denied, Err(DocumentError::PermissionDenied(_))));

        let first = store
            .increment(Some(&token), LIKE_COUNTS, "p1", "count", 1, Fields::new())
            .await
            .unwrap();
        let second = store
            .increment(Some(&token), LIKE_COUNTS, "p1", "count", 2, Fields::new())
            .await
            .unwrap();
        assert_eq!((first, second), (1, 3));
        let counter = store.get(None, LIKE_COUNTS, "p1").await.unwrap().unwrap();
        assert_eq!(counter.fields["count"], 3);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let store = HttpDocumentStore::new(ApiClient::new("http://127.0.0.1:9").unwrap());
        let result = store.get(None, BLOG_POSTS, "x").await;
        assert!(matches!(result, Err(DocumentError::Unavailable(_))));
    }
}
