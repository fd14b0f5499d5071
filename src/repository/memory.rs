use super::{ReactionDecider, Repository, StoreError, StoreResult};
use crate::models::{
    NewPost, NewPostFile, NewUser, Post, PostChanges, PostDetails, PostFetch, PostFile,
    PostFileMeta, PostFilter, PostOrder, Reaction, ReactionChange, ReactionOutcome, User,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

/// InMemoryRepository
///
/// A `Repository` held entirely in process memory. Every operation takes the
/// single table lock for its whole duration, which gives the same atomicity
/// the Postgres implementation gets from transactions. Used by the test suite
/// and for local runs without `DATABASE_URL`.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    posts: BTreeMap<i64, Post>,
    files: BTreeMap<i64, PostFile>,
    reactions: BTreeMap<i64, Reaction>,
    last_user_id: i64,
    last_post_id: i64,
    last_file_id: i64,
    last_reaction_id: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

impl Tables {
    fn username_taken(&self, username: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.username == username && Some(u.id) != except)
    }

    fn insert_files(&mut self, post_id: i64, files: Vec<NewPostFile>) {
        for file in files {
            let id = next_id(&mut self.last_file_id);
            self.files.insert(
                id,
                PostFile {
                    id,
                    post_id,
                    file_name: file.file_name,
                    file_type: file.file_type,
                    file_content: file.file_content,
                },
            );
        }
    }

    fn find_reaction(&self, post_id: i64, user_id: i64) -> Option<&Reaction> {
        self.reactions
            .values()
            .find(|r| r.post_id == post_id && r.user_id == user_id)
    }

    fn recompute_counters(&mut self, post_id: i64) -> (i64, i64) {
        let (mut likes, mut dislikes) = (0, 0);
        for reaction in self.reactions.values().filter(|r| r.post_id == post_id) {
            if reaction.is_like {
                likes += 1;
            } else {
                dislikes += 1;
            }
        }
        if let Some(post) = self.posts.get_mut(&post_id) {
            post.likes = likes;
            post.dislikes = dislikes;
        }
        (likes, dislikes)
    }

    fn remove_post(&mut self, post_id: i64) -> bool {
        if self.posts.remove(&post_id).is_none() {
            return false;
        }
        self.files.retain(|_, f| f.post_id != post_id);
        self.reactions.retain(|_, r| r.post_id != post_id);
        true
    }

    fn matches(&self, post: &Post, filter: &PostFilter) -> bool {
        if filter.owner_id.is_some_and(|owner| post.user_id != owner) {
            return false;
        }
        if let Some(user_id) = filter.liked_by {
            let liked = self
                .find_reaction(post.id, user_id)
                .is_some_and(|r| r.is_like);
            if !liked {
                return false;
            }
        }
        if let Some(prefix) = filter.file_type.as_deref() {
            let prefix = prefix.to_lowercase();
            let has_type = self
                .files
                .values()
                .any(|f| f.post_id == post.id && f.file_type.to_lowercase().starts_with(&prefix));
            if !has_type {
                return false;
            }
        }
        if let Some(search) = filter.search.as_deref() {
            let needle = search.to_lowercase();
            if !post.title.to_lowercase().contains(&needle)
                && !post.content.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }

    fn details(&self, post: &Post, fetch: PostFetch) -> PostDetails {
        let author = if fetch.with_author {
            self.users.get(&post.user_id).cloned()
        } else {
            None
        };
        let files = if fetch.with_files {
            self.files
                .values()
                .filter(|f| f.post_id == post.id)
                .map(PostFileMeta::from)
                .collect()
        } else {
            Vec::new()
        };
        PostDetails {
            post: post.clone(),
            author,
            files,
        }
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(self.lock()?.users.values().cloned().collect())
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.lock()?;
        if tables.username_taken(&user.username, None) {
            return Err(StoreError::UniqueViolation(format!(
                "username '{}' already exists",
                user.username
            )));
        }
        let id = next_id(&mut tables.last_user_id);
        let created = User {
            id,
            first_name: user.first_name,
            last_name: user.last_name,
            username: user.username,
            password_hash: user.password_hash,
        };
        tables.users.insert(id, created.clone());
        Ok(created)
    }

    async fn update_user(&self, user: &User) -> StoreResult<User> {
        let mut tables = self.lock()?;
        if !tables.users.contains_key(&user.id) {
            return Err(StoreError::NotFound);
        }
        if tables.username_taken(&user.username, Some(user.id)) {
            return Err(StoreError::UniqueViolation(format!(
                "username '{}' already exists",
                user.username
            )));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn delete_user(&self, id: i64) -> StoreResult<bool> {
        let mut tables = self.lock()?;
        if tables.users.remove(&id).is_none() {
            return Ok(false);
        }

        let owned: Vec<i64> = tables
            .posts
            .values()
            .filter(|p| p.user_id == id)
            .map(|p| p.id)
            .collect();
        for post_id in owned {
            tables.remove_post(post_id);
        }

        let touched: BTreeSet<i64> = tables
            .reactions
            .values()
            .filter(|r| r.user_id == id)
            .map(|r| r.post_id)
            .collect();
        tables.reactions.retain(|_, r| r.user_id != id);
        for post_id in touched {
            tables.recompute_counters(post_id);
        }
        Ok(true)
    }

    async fn insert_post(&self, post: NewPost) -> StoreResult<Post> {
        let mut tables = self.lock()?;
        // Mirrors the posts.user_id foreign key.
        if !tables.users.contains_key(&post.user_id) {
            return Err(StoreError::Backend(format!(
                "posts.user_id references missing user {}",
                post.user_id
            )));
        }
        let id = next_id(&mut tables.last_post_id);
        let created = Post {
            id,
            title: post.title,
            content: post.content,
            category: post.category,
            user_id: post.user_id,
            likes: 0,
            dislikes: 0,
        };
        tables.posts.insert(id, created.clone());
        tables.insert_files(id, post.files);
        Ok(created)
    }

    async fn get_post(&self, id: i64) -> StoreResult<Option<Post>> {
        Ok(self.lock()?.posts.get(&id).cloned())
    }

    async fn get_post_details(
        &self,
        id: i64,
        fetch: PostFetch,
    ) -> StoreResult<Option<PostDetails>> {
        let tables = self.lock()?;
        Ok(tables.posts.get(&id).map(|post| tables.details(post, fetch)))
    }

    async fn list_posts(
        &self,
        filter: &PostFilter,
        fetch: PostFetch,
    ) -> StoreResult<Vec<PostDetails>> {
        let tables = self.lock()?;
        let mut posts: Vec<&Post> = tables
            .posts
            .values()
            .filter(|p| tables.matches(p, filter))
            .collect();

        // BTreeMap iteration is already id ascending.
        if filter.order == PostOrder::MostLiked {
            posts.sort_by(|a, b| b.likes.cmp(&a.likes).then(a.id.cmp(&b.id)));
        }

        let limit = filter
            .limit
            .map(|l| usize::try_from(l).unwrap_or(0))
            .unwrap_or(usize::MAX);

        Ok(posts
            .into_iter()
            .take(limit)
            .map(|p| tables.details(p, fetch))
            .collect())
    }

    async fn update_post(&self, id: i64, changes: PostChanges) -> StoreResult<Post> {
        let mut tables = self.lock()?;
        let post = tables.posts.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(title) = changes.title {
            post.title = title;
        }
        if let Some(content) = changes.content {
            post.content = content;
        }
        if let Some(category) = changes.category {
            post.category = category;
        }
        let updated = post.clone();
        tables.insert_files(id, changes.new_files);
        Ok(updated)
    }

    async fn delete_post(&self, id: i64) -> StoreResult<bool> {
        Ok(self.lock()?.remove_post(id))
    }

    async fn get_file(&self, post_id: i64, file_id: i64) -> StoreResult<Option<PostFile>> {
        Ok(self
            .lock()?
            .files
            .get(&file_id)
            .filter(|f| f.post_id == post_id)
            .cloned())
    }

    async fn delete_file(&self, post_id: i64, file_id: i64) -> StoreResult<bool> {
        let mut tables = self.lock()?;
        let belongs = tables
            .files
            .get(&file_id)
            .is_some_and(|f| f.post_id == post_id);
        if belongs {
            tables.files.remove(&file_id);
        }
        Ok(belongs)
    }

    async fn get_reaction(&self, post_id: i64, user_id: i64) -> StoreResult<Option<Reaction>> {
        Ok(self.lock()?.find_reaction(post_id, user_id).cloned())
    }

    async fn apply_reaction(
        &self,
        post_id: i64,
        user_id: i64,
        decide: &ReactionDecider,
    ) -> StoreResult<ReactionOutcome> {
        let mut tables = self.lock()?;
        if !tables.posts.contains_key(&post_id) {
            return Err(StoreError::NotFound);
        }
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::UserNotFound);
        }

        let existing = tables.find_reaction(post_id, user_id).cloned();
        let change = decide(existing.as_ref().map(|r| r.is_like));

        match (change, existing) {
            (ReactionChange::Create(is_like), None) => {
                let id = next_id(&mut tables.last_reaction_id);
                tables.reactions.insert(
                    id,
                    Reaction {
                        id,
                        post_id,
                        user_id,
                        is_like,
                    },
                );
            }
            (ReactionChange::Flip(is_like), Some(row)) => {
                if let Some(stored) = tables.reactions.get_mut(&row.id) {
                    stored.is_like = is_like;
                }
            }
            (ReactionChange::Retract, Some(row)) => {
                tables.reactions.remove(&row.id);
            }
            (change, existing) => {
                return Err(StoreError::Backend(format!(
                    "reaction change {:?} does not apply to existing row {:?}",
                    change, existing
                )));
            }
        }

        let (likes, dislikes) = tables.recompute_counters(post_id);
        Ok(ReactionOutcome {
            state: change.resulting_state(),
            likes,
            dislikes,
        })
    }
}
