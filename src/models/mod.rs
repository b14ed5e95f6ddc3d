//! Data models
//!
//! This module contains the data structures used throughout folio:
//! - Store primitives (Document, identity tokens)
//! - Content records (BlogPost, Comment, ContactMessage, likes)
//! - Input types for creating and updating content

mod blog;
mod comment;
mod document;
mod like;
mod message;
mod token;

pub use blog::{BlogPost, CreatePostInput, UpdatePostInput};
pub use comment::{Comment, CommentData, CreateCommentInput};
pub use document::{to_fields, Document, Fields};
pub use like::{Like, LikeCount};
pub use message::{ContactInput, ContactMessage, ContactMessageData};
pub use token::{IdentityToken, TokenKind};
