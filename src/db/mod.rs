//! Database layer
//!
//! SQLite storage for folio's document collections and identity tokens.
//!
//! # Usage
//!
//! ```ignore
//! use folio::config::DatabaseConfig;
//! use folio::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, ping, DbPool};
