use axum::{
    extract::{FromRequestParts, MatchedPath, Request, State},
    http::{HeaderMap, Method, header, request::Parts},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;

use super::{ANONYMOUS_USER_ID, TokenService};
use crate::{
    error::AppError,
    repository::{Repository, RepositoryState},
};

/// Endpoints reachable without a resolved identity, keyed by method and the
/// route template they were registered under. Every other route requires an
/// authenticated caller.
pub const PUBLIC_ENDPOINTS: &[(&str, &str)] = &[
    ("GET", "/health"),
    ("POST", "/users/register"),
    ("POST", "/users/authenticate"),
    ("POST", "/users/refresh-token"),
    ("GET", "/users"),
    ("GET", "/posts"),
    ("GET", "/posts/filtered"),
    ("GET", "/posts/top-liked"),
    ("GET", "/posts/{id}"),
    ("GET", "/posts/{id}/files/{file_id}/content"),
    ("GET", "/posts/{id}/files/{file_id}/thumbnail"),
];

pub fn is_public(method: &Method, route: &str) -> bool {
    PUBLIC_ENDPOINTS
        .iter()
        .any(|(m, path)| *m == method.as_str() && *path == route)
}

/// CurrentUser
///
/// The caller identity the gate resolved for this request. Anonymous callers
/// carry the sentinel id `0` instead of an absent value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    id: i64,
}

impl Default for CurrentUser {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl CurrentUser {
    pub fn anonymous() -> Self {
        Self {
            id: ANONYMOUS_USER_ID,
        }
    }

    pub fn new(id: i64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn is_authenticated(&self) -> bool {
        self.id > ANONYMOUS_USER_ID
    }
}

/// Public handlers take `CurrentUser` to see who is calling, if anyone.
/// Requests that bypassed the gate are anonymous.
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CurrentUser>()
            .copied()
            .unwrap_or_default())
    }
}

/// AuthUser
///
/// An identity that is known to be authenticated. Protected handlers take
/// this as an argument; it cannot hold the sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    id: i64,
}

impl AuthUser {
    /// `None` for the sentinel (or any non-positive id).
    pub fn new(id: i64) -> Option<Self> {
        (id > ANONYMOUS_USER_ID).then_some(Self { id })
    }

    pub fn id(&self) -> i64 {
        self.id
    }
}

impl TryFrom<CurrentUser> for AuthUser {
    type Error = AppError;

    fn try_from(current: CurrentUser) -> Result<Self, Self::Error> {
        AuthUser::new(current.id()).ok_or(AppError::Unauthenticated)
    }
}

/// Rejection: `AppError::Unauthenticated` (401) when the gate left the caller
/// anonymous.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(current) = CurrentUser::from_request_parts(parts, state).await;
        AuthUser::try_from(current)
    }
}

/// bearer_token
///
/// Extracts `<token>` from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// resolve_caller
///
/// Turns the request headers into a caller identity:
/// 1. No bearer credential: anonymous.
/// 2. Token fails validation: anonymous.
/// 3. Token valid but the user no longer exists: anonymous.
///
/// Failures are logged and degrade to anonymous; rejecting protected routes
/// is `require_identity`'s job.
pub async fn resolve_caller(
    tokens: &TokenService,
    repo: &dyn Repository,
    headers: &HeaderMap,
) -> CurrentUser {
    let Some(token) = bearer_token(headers) else {
        return CurrentUser::anonymous();
    };

    let Some(user_id) = tokens.validate(token) else {
        tracing::debug!("invalid session token, continuing as anonymous");
        return CurrentUser::anonymous();
    };

    match repo.get_user(user_id).await {
        Ok(Some(user)) => CurrentUser::new(user.id),
        Ok(None) => {
            tracing::debug!(user_id, "token names an unknown user, continuing as anonymous");
            CurrentUser::anonymous()
        }
        Err(e) => {
            tracing::warn!(user_id, error = %e, "user lookup failed, continuing as anonymous");
            CurrentUser::anonymous()
        }
    }
}

/// auth_gate
///
/// Middleware run on every routed request before any handler. Resolves the
/// caller and stores it in the request extensions as `CurrentUser`. Never
/// rejects.
pub async fn auth_gate(
    State(tokens): State<TokenService>,
    State(repo): State<RepositoryState>,
    mut request: Request,
    next: Next,
) -> Response {
    let current = resolve_caller(&tokens, repo.as_ref(), request.headers()).await;
    request.extensions_mut().insert(current);
    next.run(request).await
}

/// require_identity
///
/// The authorization layer: consults `PUBLIC_ENDPOINTS` for the matched route
/// and rejects anonymous callers everywhere else with `Unauthenticated`.
pub async fn require_identity(request: Request, next: Next) -> Result<Response, AppError> {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    let authenticated = request
        .extensions()
        .get::<CurrentUser>()
        .is_some_and(CurrentUser::is_authenticated);

    if !authenticated && !is_public(request.method(), &route) {
        tracing::debug!(method = %request.method(), %route, "anonymous caller on protected route");
        return Err(AppError::Unauthenticated);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(&headers_with("Bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(&headers_with("Bearer ")), None);
        assert_eq!(bearer_token(&headers_with("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn allow_list_is_explicit() {
        assert!(is_public(&Method::GET, "/posts"));
        assert!(is_public(&Method::GET, "/posts/{id}"));
        assert!(is_public(&Method::POST, "/users/register"));
        assert!(!is_public(&Method::POST, "/posts"));
        assert!(!is_public(&Method::DELETE, "/posts/{id}"));
        assert!(!is_public(&Method::POST, "/posts/{id}/like"));
        assert!(!is_public(&Method::GET, "/users/me"));
        assert!(!is_public(&Method::GET, "/posts/{id}/files/{file_id}/download"));
    }

    #[test]
    fn sentinel_is_not_authenticated() {
        assert!(!CurrentUser::anonymous().is_authenticated());
        assert!(CurrentUser::new(5).is_authenticated());
        assert!(AuthUser::new(ANONYMOUS_USER_ID).is_none());
        assert!(AuthUser::try_from(CurrentUser::anonymous()).is_err());
        assert_eq!(AuthUser::new(5).map(|u| u.id()), Some(5));
    }
}
