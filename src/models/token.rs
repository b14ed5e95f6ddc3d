//! Identity token model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a token is good for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Short-lived bearer credential presented to the stores
    Id,
    /// Long-lived token used to mint new id tokens
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id => write!(f, "id"),
            Self::Refresh => write!(f, "refresh"),
        }
    }
}

impl FromStr for TokenKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(Self::Id),
            "refresh" => Ok(Self::Refresh),
            _ => Err(format!("Invalid token kind: {}", s)),
        }
    }
}

/// A token issued by the identity authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityToken {
    /// Opaque token value
    pub token: String,
    pub kind: TokenKind,
    /// Groups the tokens minted from one sign-in
    pub session_id: String,
    /// Identity the token was issued to
    pub identity: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl IdentityToken {
    /// Check if the token has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}
