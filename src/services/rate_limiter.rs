//! Rate limiter for login attempts
//!
//! Guards the credential exchange against brute force:
//! - failed attempts per identity (5 per 15 minutes)
//! - login requests per client IP (10 per minute)

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Why a login was refused before the password was checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginLimit {
    /// Too many requests from one address; retry after the given seconds
    Ip { retry_after: i64 },
    /// Too many failures for one identity; retry after the given seconds
    Identity { retry_after: i64 },
}

/// Sliding window of timestamps per key
struct Window<K> {
    hits: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
    span: Duration,
    max: usize,
}

impl<K: Eq + Hash> Window<K> {
    fn new(span: Duration, max: usize) -> Self {
        Self {
            hits: RwLock::new(HashMap::new()),
            span,
            max,
        }
    }

    async fn is_full(&self, key: K) -> bool {
        let cutoff = Utc::now() - self.span;
        let mut hits = self.hits.write().await;
        let times = hits.entry(key).or_default();
        times.retain(|t| *t > cutoff);
        times.len() >= self.max
    }

    async fn record(&self, key: K) {
        self.hits.write().await.entry(key).or_default().push(Utc::now());
    }

    async fn clear(&self, key: &K) {
        self.hits.write().await.remove(key);
    }

    async fn cleanup(&self) {
        let cutoff = Utc::now() - self.span;
        self.hits.write().await.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
    }
}

/// Login rate limiter shared by the auth endpoints
pub struct LoginRateLimiter {
    identity_failures: Window<String>,
    ip_requests: Window<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            identity_failures: Window::new(Duration::minutes(15), 5),
            ip_requests: Window::new(Duration::minutes(1), 10),
        }
    }

    /// Admit a login request, recording it against the client address.
    ///
    /// Identities are compared case-insensitively.
    pub async fn admit(&self, identity: &str, ip: Option<IpAddr>) -> Result<(), LoginLimit> {
        if let Some(ip) = ip {
            if self.ip_requests.is_full(ip).await {
                return Err(LoginLimit::Ip { retry_after: 60 });
            }
            self.ip_requests.record(ip).await;
        }

        if self.identity_failures.is_full(identity.to_lowercase()).await {
            return Err(LoginLimit::Identity { retry_after: 900 });
        }
        Ok(())
    }

    /// Record a failed credential exchange
    pub async fn record_failure(&self, identity: &str) {
        self.identity_failures.record(identity.to_lowercase()).await;
    }

    /// Forget failures after a successful exchange
    pub async fn record_success(&self, identity: &str) {
        self.identity_failures.clear(&identity.to_lowercase()).await;
    }

    /// Drop expired entries; run periodically
    pub async fn cleanup(&self) {
        self.identity_failures.cleanup().await;
        self.ip_requests.cleanup().await;
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_identity_limited_after_five_failures() {
        let limiter = LoginRateLimiter::new();

        for _ in 0..5 {
            assert!(limiter.admit("admin@example.com", None).await.is_ok());
            limiter.record_failure("admin@example.com").await;
        }

        assert_eq!(
            limiter.admit("ADMIN@example.com", None).await,
            Err(LoginLimit::Identity { retry_after: 900 })
        );

        limiter.record_success("admin@example.com").await;
        assert!(limiter.admit("admin@example.com", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_ip_limited_after_ten_requests() {
        let limiter = LoginRateLimiter::new();
        let ip: IpAddr = "10.0.0.7".parse().unwrap();

        for i in 0..10 {
            assert!(limiter.admit(&format!("user{}", i), Some(ip)).await.is_ok());
        }

        assert_eq!(
            limiter.admit("someone", Some(ip)).await,
            Err(LoginLimit::Ip { retry_after: 60 })
        );
        let other: IpAddr = "10.0.0.8".parse().unwrap();
        assert!(limiter.admit("someone", Some(other)).await.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_entries() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..5 {
            limiter.record_failure("a").await;
        }
        limiter.cleanup().await;
        assert!(limiter.admit("a", None).await.is_err());
    }
}
