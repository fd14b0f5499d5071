use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::repository::StoreError;

/// AppError
///
/// The error taxonomy shared by the auth layer, the services and the handlers.
/// Every failure a request can hit is one of these kinds; the HTTP mapping lives
/// in the `IntoResponse` impl below and nowhere else.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing, invalid or expired session token on a protected path.
    #[error("Authentication required")]
    Unauthenticated,

    /// Authenticated, but not the owner of the resource.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Duplicate username and similar uniqueness failures.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    /// Store or signing failure. The message is logged, never returned to the client.
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Store errors reaching this conversion had no more specific meaning at the
/// call site; services translate the expected cases (missing post, taken
/// username) themselves before falling back to this.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound("Record not found".to_string()),
            StoreError::UserNotFound => AppError::NotFound("User not found".to_string()),
            StoreError::UniqueViolation(detail) => {
                tracing::debug!(%detail, "unique constraint violated");
                AppError::Conflict("Record already exists".to_string())
            }
            StoreError::Backend(detail) => AppError::Internal(detail),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}
