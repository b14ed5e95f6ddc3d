//! Contact message service

use chrono::Utc;
use std::sync::Arc;

use crate::models::{to_fields, ContactInput, ContactMessage, ContactMessageData, Fields};
use crate::store::collections::CONTACT_MESSAGES;
use crate::store::{record, records, Collections, Direction, DocumentError, Query};

const MAX_MESSAGE_LEN: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum MessageServiceError {
    #[error("Message not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Store(#[from] DocumentError),
}

impl From<serde_json::Error> for MessageServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(DocumentError::from(err))
    }
}

/// Contact form submissions and their admin inbox
pub struct MessageService {
    store: Arc<dyn Collections>,
}

impl MessageService {
    pub fn new(store: Arc<dyn Collections>) -> Self {
        Self { store }
    }

    /// Store a contact form submission as unread
    pub async fn submit(&self, input: ContactInput) -> Result<ContactMessage, MessageServiceError> {
        let data = validate(input)?;
        let doc = self.store.create(CONTACT_MESSAGES, to_fields(&data)?).await?;
        tracing::info!("Contact message {} from {}", doc.id, data.email);
        Ok(ContactMessage { id: doc.id, data })
    }

    /// All messages, newest first
    pub async fn list_all(&self) -> Result<Vec<ContactMessage>, MessageServiceError> {
        let query = Query::new().order_by("created_at", Direction::Desc);
        Ok(records(self.store.list(CONTACT_MESSAGES, &query).await?)?)
    }

    /// Unread messages, newest first
    pub async fn list_unread(&self) -> Result<Vec<ContactMessage>, MessageServiceError> {
        let query = Query::new()
            .eq("read", false)
            .order_by("created_at", Direction::Desc);
        Ok(records(self.store.list(CONTACT_MESSAGES, &query).await?)?)
    }

    pub async fn get(&self, id: &str) -> Result<Option<ContactMessage>, MessageServiceError> {
        Ok(record(self.store.get(CONTACT_MESSAGES, id).await?)?)
    }

    pub async fn set_read(&self, id: &str, read: bool) -> Result<ContactMessage, MessageServiceError> {
        let mut fields = Fields::new();
        fields.insert("read".into(), read.into());
        let doc = self
            .store
            .update(CONTACT_MESSAGES, id, fields)
            .await
            .map_err(|e| match e {
                DocumentError::NotFound(_) => MessageServiceError::NotFound(id.to_string()),
                other => other.into(),
            })?;
        Ok(doc.into_record()?)
    }

    pub async fn delete(&self, id: &str) -> Result<(), MessageServiceError> {
        self.store.delete(CONTACT_MESSAGES, id).await?;
        tracing::info!("Deleted contact message {}", id);
        Ok(())
    }
}

fn validate(input: ContactInput) -> Result<ContactMessageData, MessageServiceError> {
    let name = input.name.trim();
    let email = input.email.trim();
    let message = input.message.trim();

    if name.is_empty() || email.is_empty() || message.is_empty() {
        return Err(MessageServiceError::ValidationError(
            "Name, email and message are required".to_string(),
        ));
    }
    if !email.contains('@') {
        return Err(MessageServiceError::ValidationError(format!(
            "Invalid email address: {}",
            email
        )));
    }
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(MessageServiceError::ValidationError(
            "Message is too long".to_string(),
        ));
    }

    Ok(ContactMessageData {
        name: name.to_string(),
        email: email.to_string(),
        message: message.to_string(),
        created_at: Utc::now(),
        read: false,
    })
}
