use crate::{
    auth::{AuthUser, TokenService},
    error::{AppError, AppResult},
    models::{
        AuthenticateRequest, AuthenticateResponse, NewUser, RegisterRequest, UpdateUserRequest,
        User,
    },
    repository::{RepositoryState, StoreError},
};

const BAD_CREDENTIALS: &str = "Username or password is incorrect";

fn taken(username: &str) -> AppError {
    AppError::Conflict(format!("Username '{}' is already taken", username))
}

fn user_not_found() -> AppError {
    AppError::NotFound("User not found".to_string())
}

/// Non-empty trimmed value of an optional field; blank counts as absent.
fn provided(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn require(value: &str, field: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

/// UserService
///
/// Account lifecycle: registration, credential checks, profile reads and
/// self-service updates. Passwords are bcrypt-hashed with the configured
/// cost and never leave this module in clear text.
#[derive(Clone)]
pub struct UserService {
    repo: RepositoryState,
    tokens: TokenService,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(repo: RepositoryState, tokens: TokenService, bcrypt_cost: u32) -> Self {
        Self {
            repo,
            tokens,
            bcrypt_cost,
        }
    }

    fn hash_password(&self, password: &str) -> AppResult<String> {
        bcrypt::hash(password, self.bcrypt_cost)
            .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
    }

    /// authenticate
    ///
    /// Verifies the credentials and issues a session token. Unknown username
    /// and wrong password produce the same error.
    pub async fn authenticate(&self, req: AuthenticateRequest) -> AppResult<AuthenticateResponse> {
        let user = self
            .repo
            .find_user_by_username(&req.username)
            .await?
            .ok_or_else(|| AppError::Validation(BAD_CREDENTIALS.to_string()))?;

        // A malformed stored hash is treated as a mismatch.
        let verified = bcrypt::verify(&req.password, &user.password_hash).unwrap_or(false);
        if !verified {
            tracing::info!(username = %req.username, "authentication failed");
            return Err(AppError::Validation(BAD_CREDENTIALS.to_string()));
        }

        let token = self.tokens.issue(&user)?;
        tracing::info!(user_id = user.id, "user authenticated");

        Ok(AuthenticateResponse {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            username: user.username,
            token,
        })
    }

    /// register
    ///
    /// Creates an account. A taken username is a `Conflict` and creates no
    /// row, whether caught by the lookup or by the UNIQUE constraint.
    pub async fn register(&self, req: RegisterRequest) -> AppResult<User> {
        require(&req.first_name, "First name")?;
        require(&req.last_name, "Last name")?;
        require(&req.username, "Username")?;
        require(&req.password, "Password")?;

        if self.repo.find_user_by_username(&req.username).await?.is_some() {
            return Err(taken(&req.username));
        }

        let password_hash = self.hash_password(&req.password)?;
        let user = self
            .repo
            .insert_user(NewUser {
                first_name: req.first_name,
                last_name: req.last_name,
                username: req.username.clone(),
                password_hash,
            })
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => taken(&req.username),
                other => other.into(),
            })?;

        tracing::info!(user_id = user.id, username = %user.username, "user registered");
        Ok(user)
    }

    pub async fn list(&self) -> AppResult<Vec<User>> {
        Ok(self.repo.list_users().await?)
    }

    pub async fn get(&self, id: i64) -> AppResult<User> {
        self.repo.get_user(id).await?.ok_or_else(user_not_found)
    }

    pub async fn current(&self, caller: AuthUser) -> AppResult<User> {
        self.get(caller.id()).await
    }

    /// update
    ///
    /// Self-service profile update. Blank fields keep their value; a new
    /// username is re-checked for uniqueness; a new password is re-hashed.
    pub async fn update(&self, caller: AuthUser, id: i64, req: UpdateUserRequest) -> AppResult<User> {
        if caller.id() != id {
            return Err(AppError::Forbidden(
                "You can only update your own account".to_string(),
            ));
        }

        let mut user = self.get(id).await?;

        if let Some(username) = provided(req.username) {
            if username != user.username
                && self.repo.find_user_by_username(&username).await?.is_some()
            {
                return Err(taken(&username));
            }
            user.username = username;
        }
        if let Some(first_name) = provided(req.first_name) {
            user.first_name = first_name;
        }
        if let Some(last_name) = provided(req.last_name) {
            user.last_name = last_name;
        }
        if let Some(password) = provided(req.password) {
            user.password_hash = self.hash_password(&password)?;
        }

        let updated = self.repo.update_user(&user).await.map_err(|e| match e {
            StoreError::UniqueViolation(_) => taken(&user.username),
            StoreError::NotFound => user_not_found(),
            other => other.into(),
        })?;

        tracing::info!(user_id = updated.id, "user updated");
        Ok(updated)
    }

    /// delete
    ///
    /// Deletes the caller's own account along with their posts and reactions.
    pub async fn delete(&self, caller: AuthUser, id: i64) -> AppResult<()> {
        if caller.id() != id {
            return Err(AppError::Forbidden(
                "You can only delete your own account".to_string(),
            ));
        }

        if !self.repo.delete_user(id).await? {
            return Err(user_not_found());
        }

        tracing::info!(user_id = id, "user deleted");
        Ok(())
    }

    /// Exchanges a valid session token for a fresh one.
    pub async fn refresh(&self, token: &str) -> AppResult<String> {
        self.tokens.refresh(token, self.repo.as_ref()).await
    }
}
