//! Credential refresh
//!
//! Refresh is on demand: once when a signed-in identity shows up, and before
//! a data call finds no cached bearer. Failures are logged and swallowed; a
//! missing credential surfaces later as a denied data call.

use super::storage::TabStorage;
use crate::identity::IdentityService;

/// Force a new bearer credential and cache it in the tab.
pub async fn refresh_credential(identity: &dyn IdentityService, tab: &TabStorage) -> Option<String> {
    match identity.current_credential(true).await {
        Ok(Some(token)) => {
            tab.set_bearer(token.clone()).await;
            Some(token)
        }
        Ok(None) => {
            tracing::debug!("No signed-in identity, no credential to refresh");
            None
        }
        Err(e) => {
            tracing::warn!("Credential refresh failed: {}", e);
            None
        }
    }
}

/// Cached bearer credential, refreshed when the tab holds none.
pub async fn ensure_credential(identity: &dyn IdentityService, tab: &TabStorage) -> Option<String> {
    match tab.bearer().await {
        Some(token) => Some(token),
        None => refresh_credential(identity, tab).await,
    }
}
