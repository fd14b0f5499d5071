use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::ANONYMOUS_USER_ID;
use crate::{
    error::{AppError, AppResult},
    models::User,
    repository::Repository,
};

/// Lifetime of a session token: one hour from issuance.
pub const TOKEN_TTL_SECONDS: u64 = 60 * 60;

/// Claims
///
/// Payload of a session token. `id` is the user identity claim; `exp` is an
/// absolute unix timestamp checked with zero clock skew.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,
    pub iat: u64,
    pub exp: u64,
}

/// TokenService
///
/// Issues and validates HS256-signed session tokens with the symmetric key
/// from `AppConfig::jwt_secret`. Validation is computation-only and never
/// fails loudly: every rejection is `None`.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, user: &User) -> AppResult<String> {
        self.issue_at(user.id, unix_now())
    }

    /// issue_at
    ///
    /// Signs a token for `user_id` as if issued at `issued_at` (unix seconds).
    pub fn issue_at(&self, user_id: i64, issued_at: u64) -> AppResult<String> {
        let claims = Claims {
            id: user_id,
            iat: issued_at,
            exp: issued_at + TOKEN_TTL_SECONDS,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("failed to sign session token: {}", e)))
    }

    pub fn validate(&self, token: &str) -> Option<i64> {
        self.validate_at(token, unix_now())
    }

    /// validate_at
    ///
    /// Returns the embedded user id when the signature verifies and `now` is
    /// strictly before `exp`. Empty, malformed, tampered, wrongly signed and
    /// expired tokens all yield `None`.
    pub fn validate_at(&self, token: &str, now: u64) -> Option<i64> {
        if token.trim().is_empty() {
            return None;
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below against `now` with no leeway.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let token_data = match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(error = %e, "rejected session token");
                return None;
            }
        };

        if now >= token_data.claims.exp {
            tracing::debug!(
                user_id = token_data.claims.id,
                exp = token_data.claims.exp,
                "session token expired"
            );
            return None;
        }

        // The sentinel (and anything below it) is never a real identity.
        (token_data.claims.id > ANONYMOUS_USER_ID).then_some(token_data.claims.id)
    }

    /// refresh
    ///
    /// Exchanges a still-valid token for a fresh one for the same user. An
    /// expired token cannot be refreshed; the user must authenticate again.
    pub async fn refresh(&self, token: &str, repo: &dyn Repository) -> AppResult<String> {
        let user_id = self.validate(token).ok_or(AppError::Unauthenticated)?;

        let user = repo
            .get_user(user_id)
            .await?
            // Deleted after the token was issued.
            .ok_or(AppError::Unauthenticated)?;

        tracing::info!(user_id = user.id, "session token refreshed");
        self.issue(&user)
    }
}
