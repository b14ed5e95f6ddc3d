//! API layer - HTTP handlers and routing
//!
//! - Page shells (login, admin) behind the route interceptor
//! - Auth API (login, token refresh, logout)
//! - Document store API
//! - Public blog, comment, contact and like endpoints
//! - Image uploads, served back from the upload directory

pub mod auth;
pub mod contact;
pub mod documents;
pub mod likes;
pub mod middleware;
pub mod pages;
pub mod posts;
pub mod upload;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer,
};

pub use middleware::{ApiError, AppState, Bearer};

use crate::session::route_interceptor;

/// Room for multipart framing around an uploaded file
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the `/api/v1` router
pub fn build_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .merge(documents::router())
        .merge(posts::router())
        .merge(contact::router())
        .merge(likes::router())
        .merge(upload::router())
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let origin = state
        .config
        .server
        .cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS origin: {}", state.config.server.cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    let uploads = ServeDir::new(&state.config.upload.path);
    let body_limit = usize::try_from(state.config.upload.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Ok(Router::new()
        .nest("/api/v1", build_api_router())
        .merge(pages::router())
        .nest_service(&state.config.upload.public_prefix, uploads)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum_middleware::from_fn_with_state(
            state.guard.clone(),
            route_interceptor,
        ))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlogPost, CreatePostInput};
    use crate::services::BlogService;
    use crate::store::collections::BLOG_POSTS;
    use crate::store::{Collections, HostedDocumentStore};
    use crate::testing::{admin_store, admin_token, test_state, ADMIN_IDENTITY, ADMIN_SECRET};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, Response, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        state: AppState,
        store: Arc<HostedDocumentStore>,
        _uploads: TempDir,
    }

    async fn test_app() -> TestApp {
        let uploads = TempDir::new().unwrap();
        let (state, store) = test_state(uploads.path()).await;
        TestApp {
            router: build_router(state.clone()).unwrap(),
            state,
            store,
            _uploads: uploads,
        }
    }

    impl TestApp {
        async fn send(&self, request: Request<Body>) -> Response<Body> {
            self.router.clone().oneshot(request).await.unwrap()
        }

        async fn token(&self) -> String {
            admin_token(&self.state.authority).await
        }

        async fn create_post(&self, title: &str, tags: &[&str]) -> BlogPost {
            let admin = admin_store(&self.store, &self.state.authority).await;
            BlogService::new(admin)
                .create_post(CreatePostInput {
                    title: title.to_string(),
                    content: "# Heading\n\nBody text".to_string(),
                    tags: tags.iter().map(|t| t.to_string()).collect(),
                    ..Default::default()
                })
                .await
                .unwrap()
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn with_bearer(mut request: Request<Body>, token: &str) -> Request<Body> {
        request.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        request
    }

    fn with_cookie(mut request: Request<Body>, cookie: &str) -> Request<Body> {
        request
            .headers_mut()
            .insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        request
    }

    async fn body_json(response: Response<Body>) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn set_cookies(response: &Response<Body>) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    /// `name=value` pairs of the cookies a response sets, ready for a
    /// `Cookie` header
    fn cookie_header(response: &Response<Body>) -> String {
        set_cookies(response)
            .iter()
            .filter_map(|c| c.split(';').next())
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn login_body(password: &str) -> Value {
        json!({ "identity": ADMIN_IDENTITY, "password": password })
    }

    #[tokio::test]
    async fn test_admin_pages_redirect_to_login_without_marker() {
        let app = test_app().await;

        for path in ["/admin", "/admin/blog", "/admin/blog/edit/abc", "/admin/messages"] {
            let response = app.send(get(path)).await;
            assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT, "{}", path);
            assert_eq!(response.headers()[header::LOCATION], "/login");
        }

        let response = app.send(get("/login")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_then_admin_pages_render() {
        let app = test_app().await;

        let response = app
            .send(json_request("POST", "/api/v1/auth/login", login_body(ADMIN_SECRET)))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().any(|c| c.starts_with("admin_authenticated=true")));
        assert!(cookies
            .iter()
            .any(|c| c.starts_with("admin_user=admin%40example.com")));
        let cookie = cookie_header(&response);

        let session = body_json(response).await;
        assert_eq!(session["identity"]["name"], ADMIN_IDENTITY);
        assert!(session["id_token"].as_str().is_some());
        assert!(session["refresh_token"].as_str().is_some());

        let response = app.send(with_cookie(get("/admin/blog"), &cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.send(with_cookie(get("/admin/blog/new"), &cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_failures() {
        let app = test_app().await;

        let response = app
            .send(json_request("POST", "/api/v1/auth/login", login_body("wrong")))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(set_cookies(&response).is_empty());
        assert_eq!(body_json(response).await["error"]["code"], "INVALID_CREDENTIALS");

        let response = app
            .send(json_request(
                "POST",
                "/api/v1/auth/login",
                json!({ "identity": "", "password": "x" }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_rate_limited_after_repeated_failures() {
        let app = test_app().await;

        for _ in 0..5 {
            let response = app
                .send(json_request("POST", "/api/v1/auth/login", login_body("wrong")))
                .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        let response = app
            .send(json_request("POST", "/api/v1/auth/login", login_body(ADMIN_SECRET)))
            .await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "RATE_LIMIT");
        assert_eq!(body["error"]["details"]["retry_after"], 900);
    }

    #[tokio::test]
    async fn test_token_refresh_and_logout() {
        let app = test_app().await;
        let response = app
            .send(json_request("POST", "/api/v1/auth/login", login_body(ADMIN_SECRET)))
            .await;
        let session = body_json(response).await;
        let refresh = session["refresh_token"].as_str().unwrap().to_string();

        let response = app
            .send(json_request(
                "POST",
                "/api/v1/auth/token",
                json!({ "refresh_token": refresh }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let token = body_json(response).await;
        let id_token = token["id_token"].as_str().unwrap().to_string();

        let response = app
            .send(with_bearer(get("/api/v1/documents/contact-messages"), &id_token))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .send(json_request(
                "POST",
                "/api/v1/auth/logout",
                json!({ "refresh_token": refresh }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));

        // The whole session is gone
        let response = app
            .send(with_bearer(get("/api/v1/documents/contact-messages"), &id_token))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let response = app
            .send(json_request(
                "POST",
                "/api/v1/auth/token",
                json!({ "refresh_token": refresh }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_without_body_clears_cookies() {
        let app = test_app().await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/logout")
            .body(Body::empty())
            .unwrap();

        let response = app.send(request).await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(set_cookies(&response).len(), 2);
    }

    #[tokio::test]
    async fn test_documents_api_enforces_rules() {
        let app = test_app().await;
        let token = app.token().await;

        let response = app.send(get("/api/v1/documents/contact-messages")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"]["code"], "PERMISSION_DENIED");

        let response = app
            .send(json_request(
                "POST",
                "/api/v1/documents/contact-messages",
                json!({ "name": "A", "read": false }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let uri = format!("/api/v1/documents/contact-messages/{}", id);
        let response = app
            .send(with_bearer(
                json_request("PATCH", &uri, json!({ "read": true })),
                &token,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["fields"]["read"], true);

        let response = app
            .send(with_bearer(
                json_request(
                    "POST",
                    "/api/v1/query/contact-messages",
                    json!({ "filters": [{ "op": "eq", "field": "read", "value": true }] }),
                ),
                &token,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

        let delete = Request::builder()
            .method("DELETE")
            .uri(&uri)
            .body(Body::empty())
            .unwrap();
        let response = app.send(with_bearer(delete, &token)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.send(with_bearer(get(&uri), &token)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_increment_endpoint() {
        let app = test_app().await;
        let token = app.token().await;
        let increment = || {
            json_request(
                "POST",
                "/api/v1/documents/likeCounts/p1/increment",
                json!({ "field": "count", "defaults": { "post_id": "p1" } }),
            )
        };

        let response = app.send(increment()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        for expected in [1, 2] {
            let response = app.send(with_bearer(increment(), &token)).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await["value"], expected);
        }
    }

    #[tokio::test]
    async fn test_raw_writes_cannot_bypass_moderation_or_counters() {
        let app = test_app().await;
        let post = app.create_post("Guarded", &[]).await;

        let response = app
            .send(json_request(
                "POST",
                "/api/v1/documents/comments",
                json!({
                    "post_id": post.id,
                    "slug": "guarded",
                    "name": "spam",
                    "email": "s@x.io",
                    "text": "BUY NOW",
                    "created_at": "2024-01-01T00:00:00Z",
                    "is_approved": true,
                }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app.send(get("/api/v1/posts/guarded/comments")).await;
        assert!(body_json(response).await.as_array().unwrap().is_empty());

        let response = app
            .send(json_request(
                "PUT",
                "/api/v1/documents/likeCounts/p1",
                json!({ "post_id": "p1", "count": 1000 }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let response = app.send(get("/api/v1/documents/likeCounts/p1")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_public_query_sorts_mixed_timestamps() {
        let app = test_app().await;
        let admin = admin_store(&app.store, &app.state.authority).await;
        for stamp in [
            "2024-01-01T10:00:00+09:00",
            "2024-01-01T05:30",
            "2024-01-01T02:00:00Z",
            "2024-01-01T05:00:00+02:00",
            "2024-01-01T01:30",
        ] {
            let fields = json!({ "title": stamp, "stamp": stamp });
            admin
                .create(BLOG_POSTS, fields.as_object().cloned().unwrap())
                .await
                .unwrap();
        }

        let response = app
            .send(json_request(
                "POST",
                "/api/v1/query/blog-posts",
                json!({ "order_by": [{ "field": "stamp", "direction": "asc" }] }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let stamps: Vec<_> = body_json(response)
            .await
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["fields"]["stamp"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            stamps,
            vec![
                "2024-01-01T10:00:00+09:00",
                "2024-01-01T02:00:00Z",
                "2024-01-01T05:00:00+02:00",
                "2024-01-01T01:30",
                "2024-01-01T05:30",
            ]
        );
    }

    #[tokio::test]
    async fn test_public_post_endpoints() {
        let app = test_app().await;
        let first = app.create_post("First Post", &["rust"]).await;
        app.create_post("Second Post", &["rust"]).await;

        let response = app.send(get("/api/v1/posts")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 2);

        let response = app.send(get("/api/v1/posts/first-post")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let detail = body_json(response).await;
        assert_eq!(detail["id"], first.id.as_str());
        assert!(detail["content_html"].as_str().unwrap().contains("<h1>Heading</h1>"));

        let response = app.send(get("/api/v1/posts/first-post/related")).await;
        let related = body_json(response).await;
        assert_eq!(related.as_array().unwrap().len(), 1);
        assert_eq!(related[0]["slug"], "second-post");

        let response = app.send(get("/api/v1/posts/featured")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await.as_array().unwrap().is_empty());

        let response = app.send(get("/api/v1/posts/missing")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_comment_endpoints() {
        let app = test_app().await;
        app.create_post("Commented", &[]).await;

        let response = app
            .send(json_request(
                "POST",
                "/api/v1/posts/commented/comments",
                json!({ "name": "V", "email": "v@x.io", "text": "Hello" }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let comment = body_json(response).await;
        assert_eq!(comment["is_approved"], false);

        let response = app.send(get("/api/v1/posts/commented/comments")).await;
        assert!(body_json(response).await.as_array().unwrap().is_empty());

        let response = app
            .send(json_request(
                "POST",
                "/api/v1/posts/commented/comments",
                json!({ "name": "V", "email": "v@x.io", "text": "" }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .send(json_request(
                "POST",
                "/api/v1/posts/nope/comments",
                json!({ "name": "V", "email": "v@x.io", "text": "Hi" }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_contact_endpoint() {
        let app = test_app().await;

        let response = app
            .send(json_request(
                "POST",
                "/api/v1/contact",
                json!({ "name": "A", "email": "a@x.io", "message": "Hi there" }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(body_json(response).await["id"].as_str().is_some());

        let response = app
            .send(json_request(
                "POST",
                "/api/v1/contact",
                json!({ "name": "A", "email": "nope", "message": "Hi" }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_like_endpoints_track_visitor() {
        let app = test_app().await;
        let post = app.create_post("Likeable", &[]).await;
        let uri = format!("/api/v1/likes/{}", post.id);

        let like = Request::builder()
            .method("POST")
            .uri(&uri)
            .body(Body::empty())
            .unwrap();
        let response = app.send(like).await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = cookie_header(&response);
        assert!(cookie.starts_with("visitor_id="));
        assert_eq!(body_json(response).await["count"], 1);

        // Same visitor again: idempotent, no new cookie
        let like = Request::builder()
            .method("POST")
            .uri(&uri)
            .body(Body::empty())
            .unwrap();
        let response = app.send(with_cookie(like, &cookie)).await;
        assert!(set_cookies(&response).is_empty());
        assert_eq!(body_json(response).await["count"], 1);

        let response = app.send(with_cookie(get(&uri), &cookie)).await;
        let status = body_json(response).await;
        assert_eq!(status["liked"], true);
        assert_eq!(status["count"], 1);

        let unlike = Request::builder()
            .method("DELETE")
            .uri(&uri)
            .body(Body::empty())
            .unwrap();
        let response = app.send(with_cookie(unlike, &cookie)).await;
        let status = body_json(response).await;
        assert_eq!(status["count"], 0);
        assert_eq!(status["liked"], false);

        let response = app
            .send(Request::builder().method("POST").uri("/api/v1/likes/missing").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    fn multipart_upload(content_type: &str, bytes: &[u8]) -> Request<Body> {
        let boundary = "folio-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"cover.png\"\r\nContent-Type: {ct}\r\n\r\n",
                b = boundary,
                ct = content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/v1/uploads")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_serve_and_delete() {
        let app = test_app().await;
        let token = app.token().await;

        let response = app.send(multipart_upload("image/png", b"\x89PNG fake")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .send(with_bearer(multipart_upload("text/plain", b"hi"), &token))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .send(with_bearer(multipart_upload("image/png", b"\x89PNG fake"), &token))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let blob = body_json(response).await;
        let url = blob["url"].as_str().unwrap().to_string();
        assert!(url.starts_with("/uploads/blog-images/"));

        let response = app.send(get(&url)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"\x89PNG fake");

        let delete = |uri: String| {
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap()
        };
        let response = app.send(with_bearer(delete("/api/v1/uploads".into()), &token)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let uri = format!("/api/v1/uploads?url={}", urlencoding::encode(&url));
        let response = app.send(delete(uri.clone())).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app.send(with_bearer(delete(uri), &token)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = app.send(get(&url)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
