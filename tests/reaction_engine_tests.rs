use async_trait::async_trait;
use postboard::{
    AppError, InMemoryRepository, ReactionService, Repository,
    models::{
        NewPost, NewUser, Post, PostChanges, PostDetails, PostFetch, PostFile, PostFilter,
        Reaction, ReactionOutcome, ReactionState, User,
    },
    repository::{ReactionDecider, StoreError, StoreResult},
    services::TOP_LIKED_LIMIT,
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

// --- Fixtures ---

async fn add_user(repo: &dyn Repository, username: &str) -> i64 {
    repo.insert_user(NewUser {
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        username: username.to_string(),
        password_hash: "hash".to_string(),
    })
    .await
    .unwrap()
    .id
}

async fn add_post(repo: &dyn Repository, owner: i64, title: &str) -> i64 {
    repo.insert_post(NewPost {
        title: title.to_string(),
        content: "content".to_string(),
        category: None,
        user_id: owner,
        files: vec![],
    })
    .await
    .unwrap()
    .id
}

struct Fixture {
    repo: Arc<InMemoryRepository>,
    service: ReactionService,
    owner: i64,
    u1: i64,
    u2: i64,
    post: i64,
}

async fn fixture() -> Fixture {
    let repo = Arc::new(InMemoryRepository::new());
    let owner = add_user(repo.as_ref(), "owner").await;
    let u1 = add_user(repo.as_ref(), "u1").await;
    let u2 = add_user(repo.as_ref(), "u2").await;
    let post = add_post(repo.as_ref(), owner, "post").await;
    Fixture {
        service: ReactionService::new(repo.clone()),
        repo,
        owner,
        u1,
        u2,
        post,
    }
}

fn outcome(state: ReactionState, likes: i64, dislikes: i64) -> ReactionOutcome {
    ReactionOutcome {
        state,
        likes,
        dislikes,
    }
}

/// Stored counters must always equal the row counts.
async fn assert_counters_match_rows(repo: &dyn Repository, post_id: i64, users: &[i64]) {
    let post = repo.get_post(post_id).await.unwrap().unwrap();
    let (mut likes, mut dislikes) = (0, 0);
    for &user in users {
        match repo.get_reaction(post_id, user).await.unwrap() {
            Some(r) if r.is_like => likes += 1,
            Some(_) => dislikes += 1,
            None => {}
        }
    }
    assert_eq!((post.likes, post.dislikes), (likes, dislikes));
}

// --- Toggle scenarios ---

#[tokio::test]
async fn test_like_on_fresh_post() {
    let f = fixture().await;

    let result = f.service.like(f.post, f.u1).await.unwrap();

    assert_eq!(result, outcome(ReactionState::Liked, 1, 0));
    assert_eq!(
        f.service.get_user_reaction(f.post, f.u1).await.unwrap(),
        ReactionState::Liked
    );
}

#[tokio::test]
async fn test_like_twice_retracts() {
    let f = fixture().await;

    f.service.like(f.post, f.u1).await.unwrap();
    let result = f.service.like(f.post, f.u1).await.unwrap();

    assert_eq!(result, outcome(ReactionState::None, 0, 0));
    assert!(f.repo.get_reaction(f.post, f.u1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_dislike_flips_like() {
    let f = fixture().await;

    f.service.like(f.post, f.u1).await.unwrap();
    let result = f.service.dislike(f.post, f.u1).await.unwrap();

    assert_eq!(result, outcome(ReactionState::Disliked, 0, 1));
    assert_eq!(
        f.service.get_user_reaction(f.post, f.u1).await.unwrap(),
        ReactionState::Disliked
    );
}

#[tokio::test]
async fn test_like_flips_dislike() {
    let f = fixture().await;

    f.service.dislike(f.post, f.u1).await.unwrap();
    let result = f.service.like(f.post, f.u1).await.unwrap();

    assert_eq!(result, outcome(ReactionState::Liked, 1, 0));
}

#[tokio::test]
async fn test_dislike_twice_retracts() {
    let f = fixture().await;

    f.service.dislike(f.post, f.u1).await.unwrap();
    let result = f.service.dislike(f.post, f.u1).await.unwrap();

    assert_eq!(result, outcome(ReactionState::None, 0, 0));
}

#[tokio::test]
async fn test_two_users_like_same_post() {
    let f = fixture().await;

    f.service.like(f.post, f.u1).await.unwrap();
    let result = f.service.like(f.post, f.u2).await.unwrap();

    assert_eq!(result, outcome(ReactionState::Liked, 2, 0));
}

#[tokio::test]
async fn test_counters_track_rows_through_mixed_sequence() {
    let f = fixture().await;
    let users = [f.owner, f.u1, f.u2];

    f.service.like(f.post, f.u1).await.unwrap();
    f.service.dislike(f.post, f.u2).await.unwrap();
    f.service.like(f.post, f.owner).await.unwrap();
    assert_counters_match_rows(f.repo.as_ref(), f.post, &users).await;

    f.service.dislike(f.post, f.u1).await.unwrap();
    f.service.dislike(f.post, f.u2).await.unwrap();
    assert_counters_match_rows(f.repo.as_ref(), f.post, &users).await;

    let post = f.repo.get_post(f.post).await.unwrap().unwrap();
    assert_eq!((post.likes, post.dislikes), (1, 1));
}

#[tokio::test]
async fn test_owner_may_react_to_own_post() {
    let f = fixture().await;
    let result = f.service.like(f.post, f.owner).await.unwrap();
    assert_eq!(result.state, ReactionState::Liked);
}

#[tokio::test]
async fn test_reaction_on_missing_post_is_not_found() {
    let f = fixture().await;

    let like = f.service.like(f.post + 99, f.u1).await;
    let status = f.service.get_user_reaction(f.post + 99, f.u1).await;

    assert!(matches!(like, Err(AppError::NotFound(_))));
    assert!(matches!(status, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_reaction_from_deleted_user_is_not_found() {
    let f = fixture().await;
    assert!(f.repo.delete_user(f.u2).await.unwrap());

    let like = f.service.like(f.post, f.u2).await;
    let unknown = f.service.dislike(f.post, 9_999).await;

    assert!(matches!(like, Err(AppError::NotFound(ref m)) if m == "User not found"));
    assert!(matches!(unknown, Err(AppError::NotFound(ref m)) if m == "User not found"));
    let post = f.repo.get_post(f.post).await.unwrap().unwrap();
    assert_eq!((post.likes, post.dislikes), (0, 0));
    assert!(f.repo.get_reaction(f.post, 9_999).await.unwrap().is_none());
}

#[tokio::test]
async fn test_sentinel_caller_cannot_react() {
    let f = fixture().await;
    let result = f.service.like(f.post, 0).await;
    assert!(matches!(result, Err(AppError::Unauthenticated)));
}

#[tokio::test]
async fn test_unreacted_caller_reports_none() {
    let f = fixture().await;
    assert_eq!(
        f.service.get_user_reaction(f.post, f.u2).await.unwrap(),
        ReactionState::None
    );
}

#[tokio::test]
async fn test_deleting_a_user_recomputes_counters_of_other_posts() {
    let f = fixture().await;
    f.service.like(f.post, f.u1).await.unwrap();
    f.service.like(f.post, f.u2).await.unwrap();

    assert!(f.repo.delete_user(f.u1).await.unwrap());

    let post = f.repo.get_post(f.post).await.unwrap().unwrap();
    assert_eq!((post.likes, post.dislikes), (1, 0));
}

// --- Concurrency ---

#[tokio::test]
async fn test_concurrent_first_likes_from_different_users() {
    let f = fixture().await;
    let mut tasks = Vec::new();
    for user in [f.owner, f.u1, f.u2] {
        let service = f.service.clone();
        let post = f.post;
        tasks.push(tokio::spawn(async move { service.like(post, user).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let post = f.repo.get_post(f.post).await.unwrap().unwrap();
    assert_eq!((post.likes, post.dislikes), (3, 0));
}

// --- Unique-violation retry ---

/// Delegates to an in-memory store but fails the first `failures` reaction
/// writes with a unique violation, as a racing insert would.
struct RacingRepo {
    inner: InMemoryRepository,
    failures: usize,
    attempts: AtomicUsize,
}

impl RacingRepo {
    fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryRepository::new(),
            failures,
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Repository for RacingRepo {
    async fn get_user(&self, id: i64) -> StoreResult<Option<User>> {
        self.inner.get_user(id).await
    }
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.inner.find_user_by_username(username).await
    }
    async fn list_users(&self) -> StoreResult<Vec<User>> {
        self.inner.list_users().await
    }
    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        self.inner.insert_user(user).await
    }
    async fn update_user(&self, user: &User) -> StoreResult<User> {
        self.inner.update_user(user).await
    }
    async fn delete_user(&self, id: i64) -> StoreResult<bool> {
        self.inner.delete_user(id).await
    }
    async fn insert_post(&self, post: NewPost) -> StoreResult<Post> {
        self.inner.insert_post(post).await
    }
    async fn get_post(&self, id: i64) -> StoreResult<Option<Post>> {
        self.inner.get_post(id).await
    }
    async fn get_post_details(
        &self,
        id: i64,
        fetch: PostFetch,
    ) -> StoreResult<Option<PostDetails>> {
        self.inner.get_post_details(id, fetch).await
    }
    async fn list_posts(
        &self,
        filter: &PostFilter,
        fetch: PostFetch,
    ) -> StoreResult<Vec<PostDetails>> {
        self.inner.list_posts(filter, fetch).await
    }
    async fn update_post(&self, id: i64, changes: PostChanges) -> StoreResult<Post> {
        self.inner.update_post(id, changes).await
    }
    async fn delete_post(&self, id: i64) -> StoreResult<bool> {
        self.inner.delete_post(id).await
    }
    async fn get_file(&self, post_id: i64, file_id: i64) -> StoreResult<Option<PostFile>> {
        self.inner.get_file(post_id, file_id).await
    }
    async fn delete_file(&self, post_id: i64, file_id: i64) -> StoreResult<bool> {
        self.inner.delete_file(post_id, file_id).await
    }
    async fn get_reaction(&self, post_id: i64, user_id: i64) -> StoreResult<Option<Reaction>> {
        self.inner.get_reaction(post_id, user_id).await
    }
    async fn apply_reaction(
        &self,
        post_id: i64,
        user_id: i64,
        decide: &ReactionDecider,
    ) -> StoreResult<ReactionOutcome> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(StoreError::UniqueViolation(
                "post_reactions_post_user_key".to_string(),
            ));
        }
        self.inner.apply_reaction(post_id, user_id, decide).await
    }
}

async fn racing_fixture(failures: usize) -> (Arc<RacingRepo>, ReactionService, i64, i64) {
    let repo = Arc::new(RacingRepo::new(failures));
    let owner = add_user(repo.as_ref(), "owner").await;
    let liker = add_user(repo.as_ref(), "liker").await;
    let post = add_post(repo.as_ref(), owner, "post").await;
    (repo.clone(), ReactionService::new(repo), liker, post)
}

#[tokio::test]
async fn test_unique_violation_is_retried_once() {
    let (repo, service, liker, post) = racing_fixture(1).await;

    let result = service.like(post, liker).await.unwrap();

    assert_eq!(result, outcome(ReactionState::Liked, 1, 0));
    assert_eq!(repo.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unique_violation_is_not_retried_twice() {
    let (repo, service, liker, post) = racing_fixture(2).await;

    let result = service.like(post, liker).await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert_eq!(repo.attempts.load(Ordering::SeqCst), 2);
    let stored = repo.get_post(post).await.unwrap().unwrap();
    assert_eq!((stored.likes, stored.dislikes), (0, 0));
}

// --- Top liked ---

#[tokio::test]
async fn test_top_liked_orders_by_likes_then_id() {
    let repo = Arc::new(InMemoryRepository::new());
    let service = ReactionService::new(repo.clone());
    let owner = add_user(repo.as_ref(), "owner").await;
    let fans = [
        add_user(repo.as_ref(), "fan1").await,
        add_user(repo.as_ref(), "fan2").await,
    ];

    let a = add_post(repo.as_ref(), owner, "a").await;
    let b = add_post(repo.as_ref(), owner, "b").await;
    let c = add_post(repo.as_ref(), owner, "c").await;

    // b: 2 likes, c: 1 like, a: 1 like (ties with c, lower id first)
    service.like(b, fans[0]).await.unwrap();
    service.like(b, fans[1]).await.unwrap();
    service.like(c, fans[0]).await.unwrap();
    service.like(a, fans[1]).await.unwrap();

    let top: Vec<i64> = service
        .top_liked()
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.post.id)
        .collect();

    assert_eq!(top, vec![b, a, c]);
}

#[tokio::test]
async fn test_top_liked_is_capped() {
    let repo = Arc::new(InMemoryRepository::new());
    let service = ReactionService::new(repo.clone());
    let owner = add_user(repo.as_ref(), "owner").await;
    for i in 0..(TOP_LIKED_LIMIT + 3) {
        add_post(repo.as_ref(), owner, &format!("post {}", i)).await;
    }

    let top = service.top_liked().await.unwrap();

    assert_eq!(top.len() as i64, TOP_LIKED_LIMIT);
    // All zero likes: plain id order.
    let ids: Vec<i64> = top.iter().map(|d| d.post.id).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[tokio::test]
async fn test_top_liked_on_empty_store() {
    let service = ReactionService::new(Arc::new(InMemoryRepository::new()));
    assert!(service.top_liked().await.unwrap().is_empty());
}
