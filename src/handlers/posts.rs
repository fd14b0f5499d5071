use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{
    AppState,
    auth::AuthUser,
    error::AppResult,
    models::{
        CreatePostRequest, LikeStatusResponse, MessageResponse, PostDetails, PostFile,
        PostResponse, ReactionOutcome, ReactionResponse, ReactionState, UpdatePostRequest,
    },
};

// --- Filter Structs ---

/// PostListFilter
///
/// Query parameters of `GET /posts/filtered`. Both are optional and
/// case-insensitive.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PostListFilter {
    /// MIME type prefix an attachment must match, e.g. `image` or `image/png`.
    pub file_type: Option<String>,
    /// Substring of the title or content.
    pub search_term: Option<String>,
}

fn render(posts: Vec<PostDetails>) -> Json<Vec<PostResponse>> {
    Json(posts.into_iter().map(PostResponse::from).collect())
}

/// Raw attachment bytes served with their stored MIME type.
fn inline_file(file: PostFile) -> Response {
    ([(header::CONTENT_TYPE, file.file_type)], file.file_content).into_response()
}

/// Header-safe filename for `Content-Disposition`.
fn disposition_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn reaction_response(outcome: ReactionOutcome) -> ReactionResponse {
    let message = match outcome.state {
        ReactionState::Liked => "Post liked successfully",
        ReactionState::Disliked => "Post disliked successfully",
        ReactionState::None => "Reaction removed",
    };
    ReactionResponse {
        message: message.to_string(),
        reaction: outcome.state,
        likes: outcome.likes,
        dislikes: outcome.dislikes,
    }
}

// --- Posts ---

/// create_post
///
/// [Authenticated Route] Creates a post owned by the caller. Attachments
/// arrive base64-encoded and are stored with the post.
#[utoipa::path(
    post,
    path = "/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = PostResponse),
        (status = 400, description = "Missing title/content or invalid attachment"),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_post(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<PostResponse>)> {
    let post = state.posts.create(user, payload).await?;
    Ok((StatusCode::CREATED, Json(post.into())))
}

/// get_posts
///
/// [Public Route] Every post with its author and attachment metadata.
#[utoipa::path(
    get,
    path = "/posts",
    responses((status = 200, description = "Posts", body = [PostResponse]))
)]
pub async fn get_posts(State(state): State<AppState>) -> AppResult<Json<Vec<PostResponse>>> {
    Ok(render(state.posts.all().await?))
}

#[utoipa::path(
    get,
    path = "/posts/filtered",
    params(PostListFilter),
    responses((status = 200, description = "Matching posts", body = [PostResponse]))
)]
pub async fn get_filtered_posts(
    State(state): State<AppState>,
    Query(filter): Query<PostListFilter>,
) -> AppResult<Json<Vec<PostResponse>>> {
    let posts = state
        .posts
        .filtered(filter.file_type, filter.search_term)
        .await?;
    Ok(render(posts))
}

/// get_top_liked
///
/// [Public Route] The ten most liked posts, ties broken by id.
#[utoipa::path(
    get,
    path = "/posts/top-liked",
    responses((status = 200, description = "Top liked posts", body = [PostResponse]))
)]
pub async fn get_top_liked(State(state): State<AppState>) -> AppResult<Json<Vec<PostResponse>>> {
    Ok(render(state.reactions.top_liked().await?))
}

#[utoipa::path(
    get,
    path = "/posts/user/{user_id}",
    params(("user_id" = i64, Path, description = "Owner id")),
    responses((status = 200, description = "Posts owned by the user", body = [PostResponse])),
    security(("bearer_auth" = []))
)]
pub async fn get_posts_by_user(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<Vec<PostResponse>>> {
    Ok(render(state.posts.by_user(user_id).await?))
}

#[utoipa::path(
    get,
    path = "/posts/liked/{user_id}",
    params(("user_id" = i64, Path, description = "User id")),
    responses((status = 200, description = "Posts the user likes", body = [PostResponse])),
    security(("bearer_auth" = []))
)]
pub async fn get_liked_posts(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<Vec<PostResponse>>> {
    Ok(render(state.posts.liked_by(user_id).await?))
}

#[utoipa::path(
    get,
    path = "/posts/{id}",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post", body = PostResponse),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<PostResponse>> {
    Ok(Json(state.posts.get(id).await?.into()))
}

/// update_post
///
/// [Authenticated Route] Owner-only. Replaces the provided fields and appends
/// any new attachments.
#[utoipa::path(
    put,
    path = "/posts/{id}",
    params(("id" = i64, Path, description = "Post id")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Updated", body = PostResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Post not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePostRequest>,
) -> AppResult<Json<PostResponse>> {
    Ok(Json(state.posts.update(user, id, payload).await?.into()))
}

/// delete_post
///
/// [Authenticated Route] Owner-only. Attachments and reactions go with it.
#[utoipa::path(
    delete,
    path = "/posts/{id}",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Post not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    state.posts.delete(user, id).await?;
    Ok(Json(MessageResponse::new("Post deleted successfully")))
}

// --- Attachments ---

/// get_file_content
///
/// [Public Route] The attachment bytes, served inline. This is the URL every
/// `fileUrl` points at.
#[utoipa::path(
    get,
    path = "/posts/{id}/files/{file_id}/content",
    params(
        ("id" = i64, Path, description = "Post id"),
        ("file_id" = i64, Path, description = "File id")
    ),
    responses(
        (status = 200, description = "File bytes", content_type = "application/octet-stream"),
        (status = 404, description = "Post or file not found")
    )
)]
pub async fn get_file_content(
    State(state): State<AppState>,
    Path((id, file_id)): Path<(i64, i64)>,
) -> AppResult<Response> {
    Ok(inline_file(state.posts.file(id, file_id).await?))
}

/// download_file
///
/// [Authenticated Route] The attachment bytes as a download, named after the
/// stored file name.
#[utoipa::path(
    get,
    path = "/posts/{id}/files/{file_id}/download",
    params(
        ("id" = i64, Path, description = "Post id"),
        ("file_id" = i64, Path, description = "File id")
    ),
    responses(
        (status = 200, description = "File download", content_type = "application/octet-stream"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Post or file not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn download_file(
    user: AuthUser,
    State(state): State<AppState>,
    Path((id, file_id)): Path<(i64, i64)>,
) -> AppResult<Response> {
    let file = state.posts.download(user, id, file_id).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        disposition_name(&file.file_name)
    );
    Ok((
        [
            (header::CONTENT_TYPE, file.file_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.file_content,
    )
        .into_response())
}

/// get_thumbnail
///
/// [Public Route] Image attachments only; other types are 404.
#[utoipa::path(
    get,
    path = "/posts/{id}/files/{file_id}/thumbnail",
    params(
        ("id" = i64, Path, description = "Post id"),
        ("file_id" = i64, Path, description = "File id")
    ),
    responses(
        (status = 200, description = "Image bytes", content_type = "image/*"),
        (status = 404, description = "Not found or not an image")
    )
)]
pub async fn get_thumbnail(
    State(state): State<AppState>,
    Path((id, file_id)): Path<(i64, i64)>,
) -> AppResult<Response> {
    Ok(inline_file(state.posts.thumbnail(id, file_id).await?))
}

#[utoipa::path(
    delete,
    path = "/posts/{id}/files/{file_id}",
    params(
        ("id" = i64, Path, description = "Post id"),
        ("file_id" = i64, Path, description = "File id")
    ),
    responses(
        (status = 200, description = "Removed", body = MessageResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Post or file not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn remove_file(
    user: AuthUser,
    State(state): State<AppState>,
    Path((id, file_id)): Path<(i64, i64)>,
) -> AppResult<Json<MessageResponse>> {
    state.posts.remove_file(user, id, file_id).await?;
    Ok(Json(MessageResponse::new("File removed from post successfully")))
}

// --- Reactions ---

/// like_post
///
/// [Authenticated Route] Toggles the caller's like: likes an unreacted post,
/// flips a dislike, retracts an existing like.
#[utoipa::path(
    post,
    path = "/posts/{id}/like",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Reaction applied", body = ReactionResponse),
        (status = 404, description = "Post not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn like_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ReactionResponse>> {
    let outcome = state.reactions.like(id, user.id()).await?;
    Ok(Json(reaction_response(outcome)))
}

/// dislike_post
///
/// [Authenticated Route] Mirror of `like_post`.
#[utoipa::path(
    post,
    path = "/posts/{id}/dislike",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Reaction applied", body = ReactionResponse),
        (status = 404, description = "Post not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn dislike_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ReactionResponse>> {
    let outcome = state.reactions.dislike(id, user.id()).await?;
    Ok(Json(reaction_response(outcome)))
}

#[utoipa::path(
    get,
    path = "/posts/{id}/like-status",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Caller's reaction", body = LikeStatusResponse),
        (status = 404, description = "Post not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_like_status(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<LikeStatusResponse>> {
    let reaction = state.reactions.get_user_reaction(id, user.id()).await?;
    Ok(Json(reaction.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_name_is_header_safe() {
        assert_eq!(disposition_name("report 2024.pdf"), "report 2024.pdf");
        assert_eq!(disposition_name("a\"b\\c.txt"), "a_b_c.txt");
        assert_eq!(disposition_name("zdjęcie.png"), "zdj_cie.png");
    }

    #[test]
    fn reaction_messages_follow_state() {
        let outcome = ReactionOutcome {
            state: ReactionState::None,
            likes: 0,
            dislikes: 0,
        };
        assert_eq!(reaction_response(outcome).message, "Reaction removed");
    }
}
