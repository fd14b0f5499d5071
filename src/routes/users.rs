use crate::{AppState, handlers::users};
use axum::{
    Router,
    routing::{get, post, put},
};

/// User Router Module
///
/// `/users/*`. Register, authenticate, refresh-token and the user listing are
/// public; everything else needs a session token. Update and delete are
/// further restricted to the caller's own account by `UserService`.
pub fn user_routes() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/users", get(users::get_users))
        // POST /users/register
        // Creates an account; a taken username is rejected with 400.
        .route("/users/register", post(users::register_user))
        // POST /users/authenticate
        // Returns the profile and a one-hour session token.
        .route("/users/authenticate", post(users::authenticate))
        // POST /users/refresh-token
        // Token comes from the Authorization header, not the body.
        .route("/users/refresh-token", post(users::refresh_token))
        .route("/users/me", get(users::get_me))
        .route(
            "/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/{id}/update-profile", put(users::update_profile))
}
