//! Admin session guard
//!
//! Two tiers:
//! - [`interceptor`]: a cheap server-side gate on the admin pages that only
//!   looks for the marker cookie
//! - [`context`] and [`authorized`]: client-side session state whose data
//!   calls are checked by the stores, the authoritative tier
//!
//! A stale session is detected at the data tier and turned into a logout.

pub mod authorized;
pub mod context;
pub mod interceptor;
pub mod marker;
pub mod refresh;
pub mod storage;

pub use authorized::AuthorizedStore;
pub use context::{authorization_signal, SessionContext, SessionPhase, SessionSnapshot};
pub use interceptor::{route_interceptor, RouteDecision, RouteGuard};
pub use storage::{MarkerJar, TabStorage};
