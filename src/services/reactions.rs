use crate::{
    auth::ANONYMOUS_USER_ID,
    error::{AppError, AppResult},
    models::{
        PostDetails, PostFetch, PostFilter, PostOrder, ReactionChange, ReactionOutcome,
        ReactionState,
    },
    repository::{RepositoryState, StoreError},
};

/// Number of posts returned by the top-liked query.
pub const TOP_LIKED_LIMIT: i64 = 10;

/// transition
///
/// The like/dislike state machine. Given the stored flag (`None` when the
/// user has not reacted) and the requested reaction:
/// - no reaction: create it
/// - same reaction again: retract it
/// - opposite reaction: flip it
pub fn transition(existing: Option<bool>, want_like: bool) -> ReactionChange {
    match existing {
        None => ReactionChange::Create(want_like),
        Some(current) if current == want_like => ReactionChange::Retract,
        Some(_) => ReactionChange::Flip(want_like),
    }
}

/// ReactionService
///
/// The toggle engine. The store runs read, decide, write and counter
/// recomputation as one atomic unit; this service supplies the decision,
/// retries once when a concurrent first reaction wins the unique key, and
/// translates store failures.
#[derive(Clone)]
pub struct ReactionService {
    repo: RepositoryState,
}

impl ReactionService {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// set_reaction
    ///
    /// Applies `want_like` for `user_id` on `post_id` and returns the caller's
    /// new state with the post's recomputed counters.
    pub async fn set_reaction(
        &self,
        post_id: i64,
        user_id: i64,
        want_like: bool,
    ) -> AppResult<ReactionOutcome> {
        if user_id <= ANONYMOUS_USER_ID {
            return Err(AppError::Unauthenticated);
        }

        let decide = move |existing: Option<bool>| transition(existing, want_like);

        let outcome = match self.repo.apply_reaction(post_id, user_id, &decide).await {
            Err(StoreError::UniqueViolation(detail)) => {
                // Another request inserted the first reaction for this pair
                // between our read and our insert. Re-read and decide again.
                tracing::debug!(post_id, user_id, %detail, "reaction insert raced, retrying once");
                self.repo.apply_reaction(post_id, user_id, &decide).await
            }
            other => other,
        };

        let outcome = outcome.map_err(|e| match e {
            StoreError::NotFound => AppError::NotFound("Post not found".to_string()),
            StoreError::UserNotFound => AppError::NotFound("User not found".to_string()),
            other => AppError::from(other),
        })?;

        tracing::info!(
            post_id,
            user_id,
            state = ?outcome.state,
            likes = outcome.likes,
            dislikes = outcome.dislikes,
            "reaction applied"
        );
        Ok(outcome)
    }

    pub async fn like(&self, post_id: i64, user_id: i64) -> AppResult<ReactionOutcome> {
        self.set_reaction(post_id, user_id, true).await
    }

    pub async fn dislike(&self, post_id: i64, user_id: i64) -> AppResult<ReactionOutcome> {
        self.set_reaction(post_id, user_id, false).await
    }

    /// get_user_reaction
    ///
    /// The caller's current state on a post. `NotFound` when the post does
    /// not exist.
    pub async fn get_user_reaction(&self, post_id: i64, user_id: i64) -> AppResult<ReactionState> {
        if self.repo.get_post(post_id).await?.is_none() {
            return Err(AppError::NotFound("Post not found".to_string()));
        }
        let reaction = self.repo.get_reaction(post_id, user_id).await?;
        Ok(ReactionState::from_row(reaction.map(|r| r.is_like)))
    }

    /// top_liked
    ///
    /// At most `TOP_LIKED_LIMIT` posts ordered by likes descending, ties by
    /// id ascending.
    pub async fn top_liked(&self) -> AppResult<Vec<PostDetails>> {
        let filter = PostFilter {
            order: PostOrder::MostLiked,
            limit: Some(TOP_LIKED_LIMIT),
            ..Default::default()
        };
        Ok(self.repo.list_posts(&filter, PostFetch::FULL).await?)
    }
}
