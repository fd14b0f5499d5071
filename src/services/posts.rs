use axum::http::HeaderValue;
use base64::{Engine as _, engine::general_purpose::STANDARD};

use super::PostOwnershipGuard;
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{
        CreatePostRequest, NewPost, NewPostFile, PostChanges, PostDetails, PostFetch, PostFile,
        PostFileRequest, PostFilter, UpdatePostRequest,
    },
    repository::{RepositoryState, StoreError},
};

fn post_not_found() -> AppError {
    AppError::NotFound("Post not found".to_string())
}

fn file_not_found() -> AppError {
    AppError::NotFound("File not found".to_string())
}

/// Blank query parameters count as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// RFC 9110 token characters, the alphabet of MIME type and subtype names.
fn is_token(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

/// A `type/subtype` MIME type, optionally with parameters, that can be sent
/// back verbatim as a `Content-Type` header.
fn is_mime_type(value: &str) -> bool {
    if HeaderValue::from_str(value).is_err() {
        return false;
    }
    let essence = value.split(';').next().unwrap_or_default().trim();
    matches!(essence.split_once('/'), Some((kind, subtype)) if is_token(kind) && is_token(subtype))
}

/// decode_files
///
/// Turns API attachments into store payloads. Content must be standard
/// base64; name and a `type/subtype` MIME type are required.
fn decode_files(files: Vec<PostFileRequest>) -> AppResult<Vec<NewPostFile>> {
    files
        .into_iter()
        .map(|file| {
            if file.file_name.trim().is_empty() {
                return Err(AppError::Validation("File name is required".to_string()));
            }
            if file.file_type.trim().is_empty() {
                return Err(AppError::Validation(format!(
                    "File type is required for '{}'",
                    file.file_name
                )));
            }
            if !is_mime_type(&file.file_type) {
                return Err(AppError::Validation(format!(
                    "File type '{}' of '{}' is not a valid MIME type",
                    file.file_type.escape_debug(),
                    file.file_name
                )));
            }
            let file_content = STANDARD.decode(file.file_content.as_bytes()).map_err(|_| {
                AppError::Validation(format!(
                    "File '{}' content is not valid base64",
                    file.file_name
                ))
            })?;
            Ok(NewPostFile {
                file_name: file.file_name,
                file_type: file.file_type,
                file_content,
            })
        })
        .collect()
}

/// PostService
///
/// Post CRUD, listings and attachment access. Every owner-only mutation
/// runs `PostOwnershipGuard::authorize` first.
#[derive(Clone)]
pub struct PostService {
    repo: RepositoryState,
    guard: PostOwnershipGuard,
}

impl PostService {
    pub fn new(repo: RepositoryState) -> Self {
        Self {
            guard: PostOwnershipGuard::new(repo.clone()),
            repo,
        }
    }

    /// create
    ///
    /// Creates a post owned by the caller, attachments included, and returns
    /// it with author and file metadata.
    pub async fn create(&self, caller: AuthUser, req: CreatePostRequest) -> AppResult<PostDetails> {
        if req.title.trim().is_empty() {
            return Err(AppError::Validation("Title is required".to_string()));
        }
        if req.content.trim().is_empty() {
            return Err(AppError::Validation("Content is required".to_string()));
        }
        let files = decode_files(req.files)?;

        let post = self
            .repo
            .insert_post(NewPost {
                title: req.title,
                content: req.content,
                category: non_blank(req.category),
                user_id: caller.id(),
                files,
            })
            .await?;

        tracing::info!(post_id = post.id, user_id = caller.id(), "post created");
        self.get(post.id).await
    }

    pub async fn all(&self) -> AppResult<Vec<PostDetails>> {
        Ok(self
            .repo
            .list_posts(&PostFilter::default(), PostFetch::FULL)
            .await?)
    }

    /// filtered
    ///
    /// Posts having an attachment whose MIME type starts with `file_type`
    /// and whose title or content contains `search`, both case-insensitive.
    /// Absent parameters do not filter.
    pub async fn filtered(
        &self,
        file_type: Option<String>,
        search: Option<String>,
    ) -> AppResult<Vec<PostDetails>> {
        let filter = PostFilter {
            file_type: non_blank(file_type),
            search: non_blank(search),
            ..Default::default()
        };
        Ok(self.repo.list_posts(&filter, PostFetch::FULL).await?)
    }

    pub async fn by_user(&self, user_id: i64) -> AppResult<Vec<PostDetails>> {
        let filter = PostFilter {
            owner_id: Some(user_id),
            ..Default::default()
        };
        Ok(self.repo.list_posts(&filter, PostFetch::FULL).await?)
    }

    /// Posts `user_id` currently likes (disliked posts are excluded).
    pub async fn liked_by(&self, user_id: i64) -> AppResult<Vec<PostDetails>> {
        let filter = PostFilter {
            liked_by: Some(user_id),
            ..Default::default()
        };
        Ok(self.repo.list_posts(&filter, PostFetch::FULL).await?)
    }

    pub async fn get(&self, id: i64) -> AppResult<PostDetails> {
        self.repo
            .get_post_details(id, PostFetch::FULL)
            .await?
            .ok_or_else(post_not_found)
    }

    /// update
    ///
    /// Owner-only. Provided title, content and category replace the current
    /// values; a blank category clears it. Files are appended.
    pub async fn update(
        &self,
        caller: AuthUser,
        id: i64,
        req: UpdatePostRequest,
    ) -> AppResult<PostDetails> {
        self.guard.authorize(id, caller.id()).await?;

        if req.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(AppError::Validation("Title cannot be empty".to_string()));
        }
        if req.content.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(AppError::Validation("Content cannot be empty".to_string()));
        }

        let changes = PostChanges {
            title: req.title,
            content: req.content,
            category: req.category.map(|c| non_blank(Some(c))),
            new_files: decode_files(req.files)?,
        };

        self.repo
            .update_post(id, changes)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => post_not_found(),
                other => other.into(),
            })?;

        tracing::info!(post_id = id, user_id = caller.id(), "post updated");
        self.get(id).await
    }

    /// Owner-only. Cascades to attachments and reactions.
    pub async fn delete(&self, caller: AuthUser, id: i64) -> AppResult<()> {
        self.guard.authorize(id, caller.id()).await?;

        if !self.repo.delete_post(id).await? {
            return Err(post_not_found());
        }

        tracing::info!(post_id = id, user_id = caller.id(), "post deleted");
        Ok(())
    }

    /// file
    ///
    /// An attachment with its bytes. The post must exist and own the file.
    pub async fn file(&self, post_id: i64, file_id: i64) -> AppResult<PostFile> {
        if self.repo.get_post(post_id).await?.is_none() {
            return Err(post_not_found());
        }
        self.repo
            .get_file(post_id, file_id)
            .await?
            .ok_or_else(file_not_found)
    }

    /// Same as `file`, for an authenticated download.
    pub async fn download(&self, caller: AuthUser, post_id: i64, file_id: i64) -> AppResult<PostFile> {
        let file = self.file(post_id, file_id).await?;
        tracing::debug!(post_id, file_id, user_id = caller.id(), "file downloaded");
        Ok(file)
    }

    /// thumbnail
    ///
    /// Only image attachments have a thumbnail; anything else is NotFound.
    pub async fn thumbnail(&self, post_id: i64, file_id: i64) -> AppResult<PostFile> {
        let file = self.file(post_id, file_id).await?;
        if !file.file_type.to_ascii_lowercase().starts_with("image/") {
            return Err(AppError::NotFound(
                "Thumbnail is only available for images".to_string(),
            ));
        }
        Ok(file)
    }

    /// Owner-only removal of a single attachment.
    pub async fn remove_file(&self, caller: AuthUser, post_id: i64, file_id: i64) -> AppResult<()> {
        self.guard.authorize(post_id, caller.id()).await?;

        if !self.repo.delete_file(post_id, file_id).await? {
            return Err(file_not_found());
        }

        tracing::info!(post_id, file_id, user_id = caller.id(), "file removed from post");
        Ok(())
    }
}
