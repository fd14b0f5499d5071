use crate::{
    auth::ANONYMOUS_USER_ID,
    error::{AppError, AppResult},
    models::Post,
    repository::RepositoryState,
};

/// PostOwnershipGuard
///
/// Resolves a post and checks that the caller owns it. Mandatory before any
/// post update, post delete or attachment removal. Creating, reading and
/// reacting to posts do not go through the guard.
#[derive(Clone)]
pub struct PostOwnershipGuard {
    repo: RepositoryState,
}

impl PostOwnershipGuard {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// authorize
    ///
    /// Returns the post when `caller_id` owns it.
    /// - sentinel caller: `Unauthenticated`
    /// - no such post: `NotFound`
    /// - someone else's post: `Forbidden`
    pub async fn authorize(&self, post_id: i64, caller_id: i64) -> AppResult<Post> {
        if caller_id <= ANONYMOUS_USER_ID {
            return Err(AppError::Unauthenticated);
        }

        let post = self
            .repo
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

        if post.user_id != caller_id {
            tracing::warn!(
                post_id,
                caller_id,
                owner_id = post.user_id,
                "ownership check failed"
            );
            return Err(AppError::Forbidden(
                "You are not allowed to modify this post".to_string(),
            ));
        }

        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPost, NewUser};
    use crate::repository::{InMemoryRepository, Repository};
    use std::sync::Arc;

    async fn seeded() -> (PostOwnershipGuard, i64, i64, i64) {
        let repo = Arc::new(InMemoryRepository::new());
        let mut ids = Vec::new();
        for name in ["owner", "stranger"] {
            let user = repo
                .insert_user(NewUser {
                    first_name: name.to_string(),
                    last_name: "Test".to_string(),
                    username: name.to_string(),
                    password_hash: "hash".to_string(),
                })
                .await
                .unwrap();
            ids.push(user.id);
        }
        let post = repo
            .insert_post(NewPost {
                title: "title".to_string(),
                content: "content".to_string(),
                category: None,
                user_id: ids[0],
                files: vec![],
            })
            .await
            .unwrap();
        (PostOwnershipGuard::new(repo), ids[0], ids[1], post.id)
    }

    #[tokio::test]
    async fn owner_is_authorized() {
        let (guard, owner, _, post_id) = seeded().await;
        let post = guard.authorize(post_id, owner).await.unwrap();
        assert_eq!(post.id, post_id);
        assert_eq!(post.user_id, owner);
    }

    #[tokio::test]
    async fn other_user_is_forbidden() {
        let (guard, _, stranger, post_id) = seeded().await;
        let err = guard.authorize(post_id, stranger).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn missing_post_is_not_found() {
        let (guard, owner, _, post_id) = seeded().await;
        let err = guard.authorize(post_id + 100, owner).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn sentinel_is_unauthenticated() {
        let (guard, _, _, post_id) = seeded().await;
        let err = guard
            .authorize(post_id, ANONYMOUS_USER_ID)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }
}
