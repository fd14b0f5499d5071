use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};

use crate::{
    AppState,
    auth::{AuthUser, gate::bearer_token},
    error::{AppError, AppResult},
    models::{
        AuthenticateRequest, AuthenticateResponse, MessageResponse, RegisterRequest,
        TokenResponse, UpdateUserRequest, UserResponse,
    },
};

/// register_user
///
/// [Public Route] Creates an account. The username must be unused.
#[utoipa::path(
    post,
    path = "/users/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = UserResponse),
        (status = 400, description = "Missing field or username already taken")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let user = state.users.register(payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// authenticate
///
/// [Public Route] Exchanges credentials for the user profile and a one-hour
/// session token.
#[utoipa::path(
    post,
    path = "/users/authenticate",
    request_body = AuthenticateRequest,
    responses(
        (status = 200, description = "Authenticated", body = AuthenticateResponse),
        (status = 400, description = "Username or password is incorrect")
    )
)]
pub async fn authenticate(
    State(state): State<AppState>,
    Json(payload): Json<AuthenticateRequest>,
) -> AppResult<Json<AuthenticateResponse>> {
    Ok(Json(state.users.authenticate(payload).await?))
}

/// refresh_token
///
/// [Public Route] Reads the bearer token from the `Authorization` header and
/// returns a fresh one for the same user. Expired tokens are not refreshable.
#[utoipa::path(
    post,
    path = "/users/refresh-token",
    responses(
        (status = 200, description = "New token", body = TokenResponse),
        (status = 400, description = "No token supplied"),
        (status = 401, description = "Token invalid or expired")
    ),
    security(("bearer_auth" = []))
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<TokenResponse>> {
    let token = bearer_token(&headers)
        .ok_or_else(|| AppError::Validation("Token is required".to_string()))?;
    let token = state.users.refresh(token).await?;
    Ok(Json(TokenResponse { token }))
}

/// get_users
///
/// [Public Route] Lists every account.
#[utoipa::path(
    get,
    path = "/users",
    responses((status = 200, description = "Users", body = [UserResponse]))
)]
pub async fn get_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserResponse>>> {
    let users = state.users.list().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// get_me
///
/// [Authenticated Route] The caller's own profile.
#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_me(user: AuthUser, State(state): State<AppState>) -> AppResult<Json<UserResponse>> {
    Ok(Json(state.users.current(user).await?.into()))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<UserResponse>> {
    Ok(Json(state.users.get(id).await?.into()))
}

/// update_user
///
/// [Authenticated Route] Updates the caller's own account. Any other id is
/// Forbidden.
#[utoipa::path(
    put,
    path = "/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserResponse),
        (status = 400, description = "Username already taken"),
        (status = 403, description = "Not your account")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    Ok(Json(state.users.update(user, id, payload).await?.into()))
}

/// update_profile
///
/// [Authenticated Route] Alias of `update_user` kept for existing clients.
#[utoipa::path(
    put,
    path = "/users/{id}/update-profile",
    params(("id" = i64, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserResponse),
        (status = 403, description = "Not your account")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_profile(
    user: AuthUser,
    state: State<AppState>,
    id: Path<i64>,
    payload: Json<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    update_user(user, state, id, payload).await
}

/// delete_user
///
/// [Authenticated Route] Deletes the caller's account, their posts and
/// their reactions.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not your account")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    state.users.delete(user, id).await?;
    Ok(Json(MessageResponse::new("User deleted successfully")))
}
