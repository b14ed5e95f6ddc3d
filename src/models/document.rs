//! Document model
//!
//! A document is a JSON object stored under an id inside a named
//! collection. Content records are (de)serialized to and from documents.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Field map of a document
pub type Fields = serde_json::Map<String, Value>;

/// A stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier, unique within its collection
    pub id: String,
    /// Document body
    pub fields: Fields,
    /// When the document was first written
    pub created_at: DateTime<Utc>,
    /// When the document was last written
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Get a top-level field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Deserialize the document into a record type, exposing the id as `id`.
    pub fn into_record<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        let mut fields = self.fields;
        fields.insert("id".to_string(), Value::String(self.id));
        serde_json::from_value(Value::Object(fields))
    }
}

/// Serialize a record into document fields. A top-level `id` is dropped since
/// the id lives beside the fields, not inside them.
pub fn to_fields<T: Serialize>(record: &T) -> Result<Fields, serde_json::Error> {
    match serde_json::to_value(record)? {
        Value::Object(mut fields) => {
            fields.remove("id");
            Ok(fields)
        }
        other => Err(serde::de::Error::custom(format!(
            "expected an object, got {}",
            other
        ))),
    }
}
