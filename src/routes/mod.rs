/// Router Module Index
///
/// Routes are grouped by resource. Access control is not decided here: the
/// `auth_gate` and `require_identity` layers applied in `create_router` check
/// every route against `auth::PUBLIC_ENDPOINTS`, and protected handlers take
/// an `AuthUser`.

/// Account registration, authentication and profile management.
pub mod users;

/// Posts, their attachments and the like/dislike engine.
pub mod posts;
