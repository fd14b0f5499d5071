use crate::{AppState, handlers::posts};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Post Router Module
///
/// `/posts/*`. Listings, single reads, inline file content and thumbnails
/// are public. Creating, reacting, downloading and the per-user listings
/// need a session token; update, delete and file removal additionally pass
/// through `PostOwnershipGuard`.
pub fn post_routes() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/posts", get(posts::get_posts).post(posts::create_post))
        // GET /posts/filtered?fileType=image&searchTerm=cat
        .route("/posts/filtered", get(posts::get_filtered_posts))
        // GET /posts/top-liked
        // At most ten posts, likes descending then id ascending.
        .route("/posts/top-liked", get(posts::get_top_liked))
        .route("/posts/user/{user_id}", get(posts::get_posts_by_user))
        .route("/posts/liked/{user_id}", get(posts::get_liked_posts))
        .route(
            "/posts/{id}",
            get(posts::get_post)
                .put(posts::update_post)
                .delete(posts::delete_post),
        )
        // --- Attachments ---
        .route(
            "/posts/{id}/files/{file_id}/content",
            get(posts::get_file_content),
        )
        .route(
            "/posts/{id}/files/{file_id}/download",
            get(posts::download_file),
        )
        .route(
            "/posts/{id}/files/{file_id}/thumbnail",
            get(posts::get_thumbnail),
        )
        .route("/posts/{id}/files/{file_id}", delete(posts::remove_file))
        // --- Reactions ---
        // Repeating the same reaction retracts it; the opposite one flips it.
        .route("/posts/{id}/like", post(posts::like_post))
        .route("/posts/{id}/dislike", post(posts::dislike_post))
        .route("/posts/{id}/like-status", get(posts::get_like_status))
}
