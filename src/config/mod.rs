//! Configuration management
//!
//! This module handles loading and parsing configuration for folio.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Admin authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Upload configuration
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path or URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/folio.db".to_string()
}

/// An account allowed to sign in to the admin area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Login identity (email or username)
    pub identity: String,
    /// Argon2 PHC string
    pub password_hash: String,
}

/// Admin authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Accounts allowed to sign in. Every account is an admin.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    /// Lifetime of a bearer (id) token in minutes
    #[serde(default = "default_id_token_ttl_minutes")]
    pub id_token_ttl_minutes: i64,
    /// Lifetime of a refresh token in days
    #[serde(default = "default_refresh_token_ttl_days")]
    pub refresh_token_ttl_days: i64,
    /// Lifetime of the route marker cookie in hours
    #[serde(default = "default_marker_max_age_hours")]
    pub marker_max_age_hours: i64,
    /// Path prefix guarded by the route interceptor
    #[serde(default = "default_protected_prefix")]
    pub protected_prefix: String,
    /// Where unauthenticated visitors are sent
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Mark cookies `Secure`
    #[serde(default)]
    pub secure_cookies: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            id_token_ttl_minutes: default_id_token_ttl_minutes(),
            refresh_token_ttl_days: default_refresh_token_ttl_days(),
            marker_max_age_hours: default_marker_max_age_hours(),
            protected_prefix: default_protected_prefix(),
            login_path: default_login_path(),
            secure_cookies: false,
        }
    }
}

fn default_id_token_ttl_minutes() -> i64 {
    60
}

fn default_refresh_token_ttl_days() -> i64 {
    30
}

fn default_marker_max_age_hours() -> i64 {
    24
}

fn default_protected_prefix() -> String {
    "/admin".to_string()
}

fn default_login_path() -> String {
    "/login".to_string()
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Upload directory path
    #[serde(default = "default_upload_path")]
    pub path: PathBuf,
    /// URL prefix under which uploads are served
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
    /// Maximum file size in bytes (default: 10MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed image MIME types
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: default_upload_path(),
            public_prefix: default_public_prefix(),
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

fn default_upload_path() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_public_prefix() -> String {
    "/uploads".to_string()
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/gif".to_string(),
        "image/webp".to_string(),
        "image/svg+xml".to_string(),
    ]
}

impl UploadConfig {
    /// Check if a MIME type is allowed
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == mime_type)
    }

    /// Get file extension for a MIME type
    pub fn get_extension(&self, mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/svg+xml" => "svg",
            _ => "bin",
        }
    }
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - FOLIO_SERVER_HOST
    /// - FOLIO_SERVER_PORT
    /// - FOLIO_SERVER_CORS_ORIGIN
    /// - FOLIO_DATABASE_URL
    /// - FOLIO_ADMIN_IDENTITY + FOLIO_ADMIN_PASSWORD_HASH (adds one account)
    /// - FOLIO_AUTH_ID_TOKEN_TTL_MINUTES
    /// - FOLIO_AUTH_SECURE_COOKIES
    /// - FOLIO_UPLOAD_PATH
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("FOLIO_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("FOLIO_SERVER_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid FOLIO_SERVER_PORT: {}", port),
            }
        }
        if let Ok(cors_origin) = std::env::var("FOLIO_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(url) = std::env::var("FOLIO_DATABASE_URL") {
            self.database.url = url;
        }

        if let (Ok(identity), Ok(password_hash)) = (
            std::env::var("FOLIO_ADMIN_IDENTITY"),
            std::env::var("FOLIO_ADMIN_PASSWORD_HASH"),
        ) {
            self.auth.accounts.retain(|a| a.identity != identity);
            self.auth.accounts.push(AccountConfig {
                identity,
                password_hash,
            });
        }
        if let Ok(ttl) = std::env::var("FOLIO_AUTH_ID_TOKEN_TTL_MINUTES") {
            match ttl.parse::<i64>() {
                Ok(ttl) if ttl > 0 => self.auth.id_token_ttl_minutes = ttl,
                _ => tracing::warn!("Ignoring invalid FOLIO_AUTH_ID_TOKEN_TTL_MINUTES: {}", ttl),
            }
        }
        if let Ok(secure) = std::env::var("FOLIO_AUTH_SECURE_COOKIES") {
            match secure.to_lowercase().as_str() {
                "true" | "1" => self.auth.secure_cookies = true,
                "false" | "0" => self.auth.secure_cookies = false,
                _ => {}
            }
        }

        if let Ok(path) = std::env::var("FOLIO_UPLOAD_PATH") {
            self.upload.path = PathBuf::from(path);
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
