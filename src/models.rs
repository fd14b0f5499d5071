use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Core Records (Mapped to Database) ---

/// User
///
/// Canonical account record from the `users` table. The password hash stays
/// inside the crate; responses are built from `UserResponse`.
#[derive(Debug, Clone, FromRow, Default, PartialEq)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    // Globally unique (UNIQUE constraint + service-level check).
    pub username: String,
    pub password_hash: String,
}

/// Insert payload for a new account; the id is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password_hash: String,
}

/// Post
///
/// A row of the `posts` table. `likes` and `dislikes` are denormalized
/// counters, always recomputed from `post_reactions` in the same transaction
/// that changes a reaction.
#[derive(Debug, Clone, FromRow, Default, PartialEq)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    // Owner. Immutable after creation.
    pub user_id: i64,
    pub likes: i64,
    pub dislikes: i64,
}

/// PostFile
///
/// An attachment including its bytes. Only loaded when the content itself is
/// requested; listings use `PostFileMeta`.
#[derive(Debug, Clone, FromRow, Default, PartialEq)]
pub struct PostFile {
    pub id: i64,
    pub post_id: i64,
    pub file_name: String,
    pub file_type: String,
    pub file_content: Vec<u8>,
}

/// Attachment metadata without the blob.
#[derive(Debug, Clone, FromRow, Default, PartialEq)]
pub struct PostFileMeta {
    pub id: i64,
    pub post_id: i64,
    pub file_name: String,
    pub file_type: String,
}

impl From<&PostFile> for PostFileMeta {
    fn from(file: &PostFile) -> Self {
        Self {
            id: file.id,
            post_id: file.post_id,
            file_name: file.file_name.clone(),
            file_type: file.file_type.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPostFile {
    pub file_name: String,
    pub file_type: String,
    pub file_content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub user_id: i64,
    pub files: Vec<NewPostFile>,
}

/// PostChanges
///
/// Partial update applied by the owner. `None` leaves a column untouched;
/// `category: Some(None)` clears the category. `new_files` are appended to
/// the existing attachments.
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<Option<String>>,
    pub new_files: Vec<NewPostFile>,
}

/// Reaction
///
/// A row of `post_reactions`: one user's like (`is_like = true`) or dislike of
/// one post. At most one per (post_id, user_id).
#[derive(Debug, Clone, FromRow, Default, PartialEq)]
pub struct Reaction {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub is_like: bool,
}

// --- Explicit Fetch Parameters ---

/// PostFetch
///
/// Which related data a post query should join in. Callers ask for exactly
/// what they render; nothing is loaded lazily.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostFetch {
    pub with_author: bool,
    pub with_files: bool,
}

impl PostFetch {
    pub const BARE: PostFetch = PostFetch {
        with_author: false,
        with_files: false,
    };
    pub const FULL: PostFetch = PostFetch {
        with_author: true,
        with_files: true,
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PostOrder {
    /// Insertion order.
    #[default]
    IdAsc,
    /// `likes` descending, ties broken by id ascending.
    MostLiked,
}

/// PostFilter
///
/// Predicate for `Repository::list_posts`. All conditions are ANDed.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub owner_id: Option<i64>,
    /// Only posts this user currently likes.
    pub liked_by: Option<i64>,
    /// Prefix of an attachment MIME type, case-insensitive ("image" or "image/png").
    pub file_type: Option<String>,
    /// Case-insensitive substring of title or content.
    pub search: Option<String>,
    pub order: PostOrder,
    pub limit: Option<i64>,
}

/// Post joined with the data requested through `PostFetch`.
#[derive(Debug, Clone, Default)]
pub struct PostDetails {
    pub post: Post,
    pub author: Option<User>,
    pub files: Vec<PostFileMeta>,
}

// --- Reaction State Machine Types ---

/// ReactionState
///
/// The per-(user, post) state of the like/dislike machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ReactionState {
    #[default]
    None,
    Liked,
    Disliked,
}

impl ReactionState {
    pub fn from_row(is_like: Option<bool>) -> Self {
        match is_like {
            None => ReactionState::None,
            Some(true) => ReactionState::Liked,
            Some(false) => ReactionState::Disliked,
        }
    }

    pub fn is_like(self) -> Option<bool> {
        match self {
            ReactionState::None => None,
            ReactionState::Liked => Some(true),
            ReactionState::Disliked => Some(false),
        }
    }
}

/// ReactionChange
///
/// The write a reaction request resolves to, decided from the existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionChange {
    /// No row yet: insert one with this `is_like`.
    Create(bool),
    /// Row exists with the opposite flag: set it to this value.
    Flip(bool),
    /// Row exists with the same flag: delete it.
    Retract,
}

impl ReactionChange {
    pub fn resulting_state(self) -> ReactionState {
        match self {
            ReactionChange::Create(is_like) | ReactionChange::Flip(is_like) => {
                ReactionState::from_row(Some(is_like))
            }
            ReactionChange::Retract => ReactionState::None,
        }
    }
}

/// Result of an atomic reaction update: the caller's new state and the
/// recomputed counters of the post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionOutcome {
    pub state: ReactionState,
    pub likes: i64,
    pub dislikes: i64,
}

/// file_url
///
/// The reference URL clients use to fetch an attachment. Derived from the ids
/// every time; never stored.
pub fn file_url(post_id: i64, file_id: i64) -> String {
    format!("/posts/{}/files/{}/content", post_id, file_id)
}

// --- Request Payloads (Input Schemas) ---

/// RegisterRequest
///
/// Input payload for `POST /users/register`. The password is hashed before it
/// reaches the store and is never logged.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateRequest {
    pub username: String,
    pub password: String,
}

/// UpdateUserRequest
///
/// Partial profile update. Absent or empty fields keep their current value; a
/// non-empty password is re-hashed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// PostFileRequest
///
/// An attachment as it crosses the API boundary: content is base64 text.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct PostFileRequest {
    #[schema(example = "holiday.png")]
    pub file_name: String,
    #[schema(example = "image/png")]
    pub file_type: String,
    /// Base64 (standard alphabet) encoded bytes.
    pub file_content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub files: Vec<PostFileRequest>,
}

/// UpdatePostRequest
///
/// Owner-only partial update. `files` are appended; single attachments are
/// removed through `DELETE /posts/{id}/files/{file_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub files: Vec<PostFileRequest>,
}

// --- Response Schemas (Output) ---

/// UserResponse
///
/// Public view of an account. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserResponse {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            username: user.username.clone(),
        }
    }
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            username: user.username,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuthenticateResponse {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PostFileResponse {
    pub id: i64,
    pub file_name: String,
    pub file_type: String,
    /// Derived from the post and file ids; see `file_url`.
    pub file_url: String,
    pub post_id: i64,
}

impl From<PostFileMeta> for PostFileResponse {
    fn from(file: PostFileMeta) -> Self {
        Self {
            file_url: file_url(file.post_id, file.id),
            id: file.id,
            file_name: file.file_name,
            file_type: file.file_type,
            post_id: file.post_id,
        }
    }
}

/// PostResponse
///
/// A post as rendered to clients. `user` is present when the query asked for
/// the author.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PostResponse {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub user_id: i64,
    pub user: Option<UserResponse>,
    pub files: Vec<PostFileResponse>,
    pub likes: i64,
    pub dislikes: i64,
}

impl From<PostDetails> for PostResponse {
    fn from(details: PostDetails) -> Self {
        let PostDetails {
            post,
            author,
            files,
        } = details;
        Self {
            id: post.id,
            title: post.title,
            content: post.content,
            category: post.category,
            user_id: post.user_id,
            user: author.map(UserResponse::from),
            files: files.into_iter().map(PostFileResponse::from).collect(),
            likes: post.likes,
            dislikes: post.dislikes,
        }
    }
}

impl From<Post> for PostResponse {
    fn from(post: Post) -> Self {
        PostDetails {
            post,
            ..Default::default()
        }
        .into()
    }
}

/// ReactionResponse
///
/// Returned by the like/dislike endpoints: the caller's new state plus the
/// post counters after recomputation.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReactionResponse {
    pub message: String,
    pub reaction: ReactionState,
    pub likes: i64,
    pub dislikes: i64,
}

/// LikeStatusResponse
///
/// `isLike` is `true`, `false`, or `null` when the caller has not reacted.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LikeStatusResponse {
    pub is_like: Option<bool>,
    pub reaction: ReactionState,
}

impl From<ReactionState> for LikeStatusResponse {
    fn from(reaction: ReactionState) -> Self {
        Self {
            is_like: reaction.is_like(),
            reaction,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_url_is_derived_from_ids() {
        assert_eq!(file_url(7, 42), "/posts/7/files/42/content");
        assert_eq!(file_url(7, 42), file_url(7, 42));
    }

    #[test]
    fn reaction_change_resulting_state() {
        assert_eq!(
            ReactionChange::Create(true).resulting_state(),
            ReactionState::Liked
        );
        assert_eq!(
            ReactionChange::Flip(false).resulting_state(),
            ReactionState::Disliked
        );
        assert_eq!(
            ReactionChange::Retract.resulting_state(),
            ReactionState::None
        );
    }
}
