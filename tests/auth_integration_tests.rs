use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, Method, Request, Uri, header, request::Parts},
};
use postboard::{
    AppConfig, AppError, AppState,
    auth::{ANONYMOUS_USER_ID, AuthUser, CurrentUser, TOKEN_TTL_SECONDS, gate::resolve_caller},
    models::{RegisterRequest, User},
};
use std::time::SystemTime;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

fn now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn create_app_state() -> AppState {
    let config = AppConfig {
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    };
    AppState::in_memory(config)
}

async fn register(state: &AppState, username: &str) -> User {
    state
        .users
        .register(RegisterRequest {
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            username: username.to_string(),
            password: "password123".to_string(),
        })
        .await
        .unwrap()
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
    headers
}

/// Helper to get the mutable Parts struct from a generated Request
fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

// --- Extractors ---

#[tokio::test]
async fn test_auth_user_from_resolved_identity() {
    let state = create_app_state();
    let mut parts = get_request_parts(Method::GET, "/users/me".parse().unwrap());
    parts.extensions.insert(CurrentUser::new(7));

    let auth_user = AuthUser::from_request_parts(&mut parts, &state).await;

    assert_eq!(auth_user.unwrap().id(), 7);
}

#[tokio::test]
async fn test_auth_user_rejects_anonymous_caller() {
    let state = create_app_state();
    let mut parts = get_request_parts(Method::GET, "/users/me".parse().unwrap());
    parts.extensions.insert(CurrentUser::anonymous());

    let auth_user = AuthUser::from_request_parts(&mut parts, &state).await;

    assert!(matches!(auth_user, Err(AppError::Unauthenticated)));
}

#[tokio::test]
async fn test_auth_user_rejects_request_that_skipped_the_gate() {
    let state = create_app_state();
    let mut parts = get_request_parts(Method::GET, "/users/me".parse().unwrap());

    let auth_user = AuthUser::from_request_parts(&mut parts, &state).await;
    let Ok(current) = CurrentUser::from_request_parts(&mut parts, &state).await;

    assert!(matches!(auth_user, Err(AppError::Unauthenticated)));
    assert_eq!(current.id(), ANONYMOUS_USER_ID);
}

// --- Identity resolution ---

#[tokio::test]
async fn test_valid_token_resolves_to_user() {
    let state = create_app_state();
    let user = register(&state, "alice").await;
    let token = state.tokens.issue(&user).unwrap();

    let current = resolve_caller(&state.tokens, state.repo.as_ref(), &bearer(&token)).await;

    assert!(current.is_authenticated());
    assert_eq!(current.id(), user.id);
}

#[tokio::test]
async fn test_missing_header_is_anonymous() {
    let state = create_app_state();
    let current = resolve_caller(&state.tokens, state.repo.as_ref(), &HeaderMap::new()).await;
    assert_eq!(current, CurrentUser::anonymous());
}

#[tokio::test]
async fn test_garbage_token_is_anonymous() {
    let state = create_app_state();
    let current = resolve_caller(&state.tokens, state.repo.as_ref(), &bearer("garbage")).await;
    assert_eq!(current, CurrentUser::anonymous());
}

#[tokio::test]
async fn test_expired_token_is_anonymous() {
    let state = create_app_state();
    let user = register(&state, "alice").await;
    let token = state
        .tokens
        .issue_at(user.id, now() - TOKEN_TTL_SECONDS - 5)
        .unwrap();

    let current = resolve_caller(&state.tokens, state.repo.as_ref(), &bearer(&token)).await;

    assert_eq!(current, CurrentUser::anonymous());
}

#[tokio::test]
async fn test_token_for_deleted_user_is_anonymous() {
    let state = create_app_state();
    let user = register(&state, "alice").await;
    let token = state.tokens.issue(&user).unwrap();
    state
        .users
        .delete(AuthUser::new(user.id).unwrap(), user.id)
        .await
        .unwrap();

    let current = resolve_caller(&state.tokens, state.repo.as_ref(), &bearer(&token)).await;

    assert_eq!(current, CurrentUser::anonymous());
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_anonymous() {
    let state = create_app_state();
    let user = register(&state, "alice").await;
    let foreign = AppState::in_memory(AppConfig {
        jwt_secret: "another-secret-entirely".to_string(),
        ..AppConfig::default()
    });
    let token = foreign.tokens.issue(&user).unwrap();

    let current = resolve_caller(&state.tokens, state.repo.as_ref(), &bearer(&token)).await;

    assert_eq!(current, CurrentUser::anonymous());
}

// --- Refresh ---

#[tokio::test]
async fn test_refresh_issues_token_for_same_user() {
    let state = create_app_state();
    let user = register(&state, "alice").await;
    let token = state.tokens.issue_at(user.id, now() - 60).unwrap();

    let refreshed = state.users.refresh(&token).await.unwrap();

    assert_ne!(refreshed, token);
    assert_eq!(state.tokens.validate(&refreshed), Some(user.id));
}

#[tokio::test]
async fn test_refresh_rejects_expired_token() {
    let state = create_app_state();
    let user = register(&state, "alice").await;
    let token = state
        .tokens
        .issue_at(user.id, now() - TOKEN_TTL_SECONDS)
        .unwrap();

    let result = state.users.refresh(&token).await;

    assert!(matches!(result, Err(AppError::Unauthenticated)));
}

#[tokio::test]
async fn test_refresh_rejects_deleted_user() {
    let state = create_app_state();
    let user = register(&state, "alice").await;
    let token = state.tokens.issue(&user).unwrap();
    state.repo.delete_user(user.id).await.unwrap();

    let result = state.users.refresh(&token).await;

    assert!(matches!(result, Err(AppError::Unauthenticated)));
}

// --- Authenticate ---

#[tokio::test]
async fn test_authenticate_returns_valid_token() {
    let state = create_app_state();
    let user = register(&state, "alice").await;

    let response = state
        .users
        .authenticate(postboard::models::AuthenticateRequest {
            username: "alice".to_string(),
            password: "password123".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(response.id, user.id);
    assert_eq!(state.tokens.validate(&response.token), Some(user.id));
}

#[tokio::test]
async fn test_authenticate_rejects_bad_credentials_uniformly() {
    let state = create_app_state();
    register(&state, "alice").await;

    let wrong_password = state
        .users
        .authenticate(postboard::models::AuthenticateRequest {
            username: "alice".to_string(),
            password: "nope".to_string(),
        })
        .await
        .unwrap_err();
    let unknown_user = state
        .users
        .authenticate(postboard::models::AuthenticateRequest {
            username: "bob".to_string(),
            password: "password123".to_string(),
        })
        .await
        .unwrap_err();

    assert!(matches!(wrong_password, AppError::Validation(_)));
    assert_eq!(wrong_password.to_string(), unknown_user.to_string());
}
