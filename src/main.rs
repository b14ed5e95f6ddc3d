//! Folio - portfolio and blog backend
//!
//! `folio` serves the site; `folio hash-password <secret>` prints an
//! account hash for `config.yml`.

use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio::{
    api::{self, AppState},
    blob::LocalBlobStore,
    config::Config,
    db::{
        self,
        repositories::{SqlxDocumentRepository, SqlxTokenRepository},
    },
    identity::IdentityAuthority,
    services::{password::hash_password, LoginRateLimiter},
    session::RouteGuard,
    store::{AccessRules, HostedDocumentStore},
};

/// How often expired tokens and rate limiter windows are swept
const CLEANUP_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None | Some("serve") => serve().await,
        Some("hash-password") => {
            let Some(secret) = args.next() else {
                bail!("usage: folio hash-password <secret>");
            };
            println!("{}", hash_password(&secret)?);
            Ok(())
        }
        Some(other) => bail!("unknown command: {} (expected serve or hash-password)", other),
    }
}

async fn serve() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Folio...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    db::ping(&pool).await?;
    tracing::info!("Database connected: {}", config.database.url);

    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed ({} applied)", applied);

    // Identity and stores
    let authority = Arc::new(IdentityAuthority::new(
        &config.auth,
        SqlxTokenRepository::boxed(pool.clone()),
    ));
    if authority.account_count() == 0 {
        tracing::warn!("No admin accounts configured; the admin area is unreachable");
    }

    let documents = Arc::new(HostedDocumentStore::new(
        SqlxDocumentRepository::boxed(pool.clone()),
        AccessRules::portfolio(),
        authority.clone(),
    ));
    let site = Arc::new(documents.site());
    let blobs = Arc::new(LocalBlobStore::new(config.upload.clone(), authority.clone()));
    tokio::fs::create_dir_all(blobs.root()).await?;

    let rate_limiter = Arc::new(LoginRateLimiter::new());

    // Periodic cleanup of expired tokens and limiter entries
    {
        let limiter = rate_limiter.clone();
        let authority = authority.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                limiter.cleanup().await;
                match authority.purge_expired().await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!("Purged {} expired tokens", n),
                    Err(e) => tracing::warn!("Failed to purge expired tokens: {}", e),
                }
            }
        });
    }

    let state = AppState {
        guard: RouteGuard::from_config(&config.auth),
        config: Arc::new(config.clone()),
        authority,
        documents,
        site,
        blobs,
        rate_limiter,
    };

    // Build router
    let app = api::build_router(state)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
