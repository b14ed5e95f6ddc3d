//! Client-side session storage
//!
//! [`MarkerJar`] is the profile-wide cookie jar: clones share one store, so
//! every tab of a profile sees the same markers and entries expire on their
//! own. [`TabStorage`] holds one tab's bearer credential and is never shared.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::marker::{IDENTITY_COOKIE, MARKER_COOKIE, MARKER_VALUE};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Shared cookie jar of one browser profile
#[derive(Debug, Clone, Default)]
pub struct MarkerJar {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MarkerJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, name: &str, value: &str, max_age: Duration) {
        self.entries.write().await.insert(
            name.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Utc::now() + max_age,
            },
        );
    }

    /// Current value, ignoring expired entries
    pub async fn get(&self, name: &str) -> Option<String> {
        self.entries
            .read()
            .await
            .get(name)
            .filter(|e| e.expires_at > Utc::now())
            .map(|e| e.value.clone())
    }

    pub async fn remove(&self, name: &str) {
        self.entries.write().await.remove(name);
    }

    /// Check for the authorization marker
    pub async fn has_marker(&self) -> bool {
        self.get(MARKER_COOKIE).await.as_deref() == Some(MARKER_VALUE)
    }

    /// Last signed-in identity label
    pub async fn identity_label(&self) -> Option<String> {
        self.get(IDENTITY_COOKIE).await
    }

    /// Set the marker and identity label together
    pub async fn set_markers(&self, identity: &str, max_age: Duration) {
        let expires_at = Utc::now() + max_age;
        let mut entries = self.entries.write().await;
        for (name, value) in [(MARKER_COOKIE, MARKER_VALUE), (IDENTITY_COOKIE, identity)] {
            entries.insert(
                name.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at,
                },
            );
        }
    }

    /// Remove the marker and identity label together
    pub async fn clear_markers(&self) {
        let mut entries = self.entries.write().await;
        entries.remove(MARKER_COOKIE);
        entries.remove(IDENTITY_COOKIE);
    }

    /// `Cookie` request header for the live entries
    pub async fn cookie_header(&self) -> Option<String> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        let mut pairs: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.expires_at > now)
            .map(|(name, e)| format!("{}={}", name, e.value))
            .collect();
        pairs.sort();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }
}

/// Bearer credential of one tab
#[derive(Debug, Default)]
pub struct TabStorage {
    bearer: RwLock<Option<String>>,
}

impl TabStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bearer(&self) -> Option<String> {
        self.bearer.read().await.clone()
    }

    pub async fn set_bearer(&self, token: String) {
        *self.bearer.write().await = Some(token);
    }

    pub async fn clear(&self) {
        *self.bearer.write().await = None;
    }
}
