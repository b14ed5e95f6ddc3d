//! Contact message model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contact message as stored in the `contact-messages` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactMessageData {
    pub name: String,
    pub email: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

/// Contact message entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactMessage {
    pub id: String,
    #[serde(flatten)]
    pub data: ContactMessageData,
}

/// Contact form submission
#[derive(Debug, Clone, Deserialize)]
pub struct ContactInput {
    pub name: String,
    pub email: String,
    pub message: String,
}
