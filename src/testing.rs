//! Shared fixtures for unit tests

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::api::{build_router, AppState};
use crate::blob::LocalBlobStore;
use crate::config::{AccountConfig, AuthConfig, Config, UploadConfig};
use crate::db::repositories::{SqlxDocumentRepository, SqlxTokenRepository};
use crate::db::{create_test_pool, migrations, DbPool};
use crate::identity::{
    IdentityAuthority, IdentityBackend, IdentityClient, IdentityError, IssuedSession, IssuedToken,
};
use crate::services::password::hash_password;
use crate::services::LoginRateLimiter;
use crate::session::{AuthorizedStore, MarkerJar, RouteGuard, SessionContext, SessionSnapshot};
use crate::store::{AccessRules, Collections, HostedDocumentStore};

pub const ADMIN_IDENTITY: &str = "admin@example.com";
pub const ADMIN_SECRET: &str = "correct horse battery staple";

/// Argon2 is slow in debug builds, hash the fixture secret once
fn admin_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(ADMIN_SECRET).expect("hash fixture secret"))
        .clone()
}

pub fn test_auth_config() -> AuthConfig {
    AuthConfig {
        accounts: vec![AccountConfig {
            identity: ADMIN_IDENTITY.to_string(),
            password_hash: admin_hash(),
        }],
        ..AuthConfig::default()
    }
}

pub async fn test_pool() -> DbPool {
    let pool = create_test_pool().await.expect("create test pool");
    migrations::run_migrations(&pool).await.expect("run migrations");
    pool
}

pub async fn test_authority() -> (Arc<IdentityAuthority>, DbPool) {
    let pool = test_pool().await;
    let authority = IdentityAuthority::new(
        &test_auth_config(),
        SqlxTokenRepository::boxed(pool.clone()),
    );
    (Arc::new(authority), pool)
}

/// Fresh id token for the fixture account
pub async fn admin_token(authority: &IdentityAuthority) -> String {
    authority
        .exchange(ADMIN_IDENTITY, ADMIN_SECRET)
        .await
        .expect("fixture sign-in")
        .id_token
}

pub async fn test_store() -> (Arc<HostedDocumentStore>, Arc<IdentityAuthority>, DbPool) {
    let (authority, pool) = test_authority().await;
    let store = HostedDocumentStore::new(
        SqlxDocumentRepository::boxed(pool.clone()),
        AccessRules::portfolio(),
        authority.clone(),
    );
    (Arc::new(store), authority, pool)
}

/// A tab: identity client plus session context sharing `jar`. The context
/// is not initialized yet.
pub fn test_session(
    backend: Arc<dyn IdentityBackend>,
    jar: MarkerJar,
) -> (Arc<IdentityClient>, Arc<SessionContext>) {
    let client = Arc::new(IdentityClient::new(backend));
    let session = Arc::new(SessionContext::new(client.clone(), jar));
    (client, session)
}

/// Wait until the session publishes a snapshot matching `predicate`
pub async fn wait_for(
    session: &SessionContext,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut snapshots = session.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(5), snapshots.wait_for(predicate))
        .await
        .expect("session did not settle in time")
        .expect("session dropped")
        .clone();
    snapshot
}

/// Backend whose revocation can be made to fail
pub struct FlakyBackend {
    inner: Arc<IdentityAuthority>,
    fail_revoke: AtomicBool,
}

impl FlakyBackend {
    pub fn new(inner: Arc<IdentityAuthority>) -> Self {
        Self {
            inner,
            fail_revoke: AtomicBool::new(false),
        }
    }

    pub fn fail_revoke(&self, fail: bool) {
        self.fail_revoke.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityBackend for FlakyBackend {
    async fn exchange(&self, identity: &str, secret: &str) -> Result<IssuedSession, IdentityError> {
        self.inner.exchange(identity, secret).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<IssuedToken, IdentityError> {
        self.inner.refresh(refresh_token).await
    }

    async fn revoke(&self, refresh_token: &str) -> Result<(), IdentityError> {
        if self.fail_revoke.load(Ordering::SeqCst) {
            return Err(IdentityError::Unavailable("connection reset".to_string()));
        }
        self.inner.revoke(refresh_token).await
    }
}

/// Document handle signed in as the fixture admin, going through a live
/// session and the authorized wrapper
pub async fn admin_store(
    store: &Arc<HostedDocumentStore>,
    authority: &Arc<IdentityAuthority>,
) -> Arc<dyn Collections> {
    let (_client, session) = test_session(authority.clone(), MarkerJar::new());
    session.init();
    session
        .login(ADMIN_IDENTITY, ADMIN_SECRET)
        .await
        .expect("fixture login");
    Arc::new(AuthorizedStore::new(store.clone(), session))
}

/// Application state over fresh stores, with uploads under `uploads`
pub async fn test_state(uploads: &Path) -> (AppState, Arc<HostedDocumentStore>) {
    let (store, authority, _pool) = test_store().await;
    let config = Config {
        auth: test_auth_config(),
        upload: UploadConfig {
            path: uploads.to_path_buf(),
            ..UploadConfig::default()
        },
        ..Config::default()
    };
    let blobs = LocalBlobStore::new(config.upload.clone(), authority.clone());
    let state = AppState {
        guard: RouteGuard::from_config(&config.auth),
        config: Arc::new(config),
        authority,
        documents: store.clone(),
        site: Arc::new(store.site()),
        blobs: Arc::new(blobs),
        rate_limiter: Arc::new(LoginRateLimiter::new()),
    };
    (state, store)
}

/// Serve `state` on an ephemeral local port, returning the base URL
pub async fn spawn_server(state: AppState) -> String {
    let router = build_router(state).expect("build router");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{}", addr)
}
