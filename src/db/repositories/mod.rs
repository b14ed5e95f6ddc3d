//! Database repositories
//!
//! Repository pattern implementations for database access.

pub mod document;
pub mod token;

pub use document::{CounterChange, DocumentRepository, Precondition, SqlxDocumentRepository};
pub use token::{SqlxTokenRepository, TokenRepository};
