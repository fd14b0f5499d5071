use crate::models::{
    NewPost, NewUser, Post, PostChanges, PostDetails, PostFetch, PostFile, PostFilter, Reaction,
    ReactionChange, ReactionOutcome, User,
};
use async_trait::async_trait;
use std::sync::Arc;

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// StoreError
///
/// What the persistence layer can report. These never cross the service
/// boundary as-is: services and `From<StoreError> for AppError` translate them.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The row an update/delete targeted does not exist.
    #[error("record not found")]
    NotFound,

    /// The acting user row is gone (deleted after their token was resolved).
    #[error("user not found")]
    UserNotFound,

    /// A UNIQUE constraint rejected the write (duplicate username, concurrent
    /// reaction insert for the same post and user).
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::UniqueViolation(db.message().to_string())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

/// Decides the write for a reaction request from the existing row's `is_like`
/// (`None` when the user has not reacted). Supplied by the toggle engine and
/// invoked by the store inside its transaction.
pub type ReactionDecider = dyn Fn(Option<bool>) -> ReactionChange + Send + Sync;

/// Repository Trait
///
/// The credential and content store: find-by-id, find-by-predicate, insert,
/// update and delete for users, posts, attachments and reactions.
///
/// `Send + Sync + async_trait` make `Arc<dyn Repository>` shareable across
/// axum handlers. The production implementation is Postgres; the in-memory
/// implementation backs tests and database-less local runs.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: i64) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    // UniqueViolation when the username is taken.
    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;
    // Overwrites every column but the id. NotFound / UniqueViolation.
    async fn update_user(&self, user: &User) -> StoreResult<User>;
    /// Deletes the user, their posts and their reactions, and recomputes the
    /// counters of other users' posts they had reacted to. False if absent.
    async fn delete_user(&self, id: i64) -> StoreResult<bool>;

    // --- Posts ---
    /// Inserts the post and its attachments atomically.
    async fn insert_post(&self, post: NewPost) -> StoreResult<Post>;
    async fn get_post(&self, id: i64) -> StoreResult<Option<Post>>;
    async fn get_post_details(&self, id: i64, fetch: PostFetch)
    -> StoreResult<Option<PostDetails>>;
    async fn list_posts(&self, filter: &PostFilter, fetch: PostFetch)
    -> StoreResult<Vec<PostDetails>>;
    // NotFound when the post is gone.
    async fn update_post(&self, id: i64, changes: PostChanges) -> StoreResult<Post>;
    /// Cascades to the post's attachments and reactions. False if absent.
    async fn delete_post(&self, id: i64) -> StoreResult<bool>;

    // --- Attachments ---
    async fn get_file(&self, post_id: i64, file_id: i64) -> StoreResult<Option<PostFile>>;
    async fn delete_file(&self, post_id: i64, file_id: i64) -> StoreResult<bool>;

    // --- Reactions ---
    async fn get_reaction(&self, post_id: i64, user_id: i64) -> StoreResult<Option<Reaction>>;
    /// Reads the (post, user) reaction, applies the change chosen by `decide`
    /// and recomputes the post's counters, all as one atomic unit.
    /// NotFound when the post does not exist, UserNotFound when the user
    /// does not.
    async fn apply_reaction(
        &self,
        post_id: i64,
        user_id: i64,
        decide: &ReactionDecider,
    ) -> StoreResult<ReactionOutcome>;
}

/// RepositoryState
///
/// The concrete type used to share the store across the application state.
pub type RepositoryState = Arc<dyn Repository>;
