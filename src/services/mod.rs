//! Services layer - Business logic
//!
//! Content services work against a [`crate::store::Collections`] handle, so
//! the same service serves public visitors (anonymous handle) and the admin
//! (authorized handle). Services are responsible for:
//! - Implementing content rules and validation
//! - Shaping documents into records
//! - Logging content changes

pub mod blog;
pub mod comment;
pub mod like;
pub mod markdown;
pub mod message;
pub mod password;
pub mod rate_limiter;

pub use blog::{generate_slug, BlogService, BlogServiceError};
pub use comment::{CommentService, CommentServiceError};
pub use like::LikeService;
pub use markdown::{estimate_read_time, render_markdown};
pub use message::{MessageService, MessageServiceError};
pub use password::{hash_password, verify_password};
pub use rate_limiter::{LoginLimit, LoginRateLimiter};
