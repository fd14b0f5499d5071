//! Session tokens and per-request identity resolution.

pub mod gate;
pub mod token;

pub use gate::{AuthUser, CurrentUser, PUBLIC_ENDPOINTS, auth_gate, require_identity};
pub use token::{Claims, TOKEN_TTL_SECONDS, TokenService};

/// The reserved "no identity" id carried by anonymous callers. The store never
/// assigns it to a user.
pub const ANONYMOUS_USER_ID: i64 = 0;
