use super::{ReactionDecider, Repository, StoreError, StoreResult};
use crate::models::{
    NewPost, NewPostFile, NewUser, Post, PostChanges, PostDetails, PostFetch, PostFile,
    PostFileMeta, PostFilter, PostOrder, Reaction, ReactionChange, ReactionOutcome, User,
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction, query_builder::QueryBuilder};
use std::collections::HashMap;

/// PostgresRepository
///
/// The production implementation of `Repository`, backed by PostgreSQL.
/// All queries are runtime-checked (`query`/`query_as`/`QueryBuilder`) with
/// bound parameters only.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations in `./migrations`.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    /// Joins authors and attachment metadata onto `posts` as requested by
    /// `fetch`, one query per relation.
    async fn attach_related(
        &self,
        posts: Vec<Post>,
        fetch: PostFetch,
    ) -> StoreResult<Vec<PostDetails>> {
        let mut authors: HashMap<i64, User> = HashMap::new();
        let mut files: HashMap<i64, Vec<PostFileMeta>> = HashMap::new();

        if fetch.with_author && !posts.is_empty() {
            let owner_ids: Vec<i64> = posts.iter().map(|p| p.user_id).collect();
            let rows = sqlx::query_as::<_, User>(
                "SELECT id, first_name, last_name, username, password_hash FROM users WHERE id = ANY($1)",
            )
            .bind(&owner_ids)
            .fetch_all(&self.pool)
            .await?;
            authors = rows.into_iter().map(|u| (u.id, u)).collect();
        }

        if fetch.with_files && !posts.is_empty() {
            let post_ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
            let rows = sqlx::query_as::<_, PostFileMeta>(
                "SELECT id, post_id, file_name, file_type FROM post_files WHERE post_id = ANY($1) ORDER BY id ASC",
            )
            .bind(&post_ids)
            .fetch_all(&self.pool)
            .await?;
            for file in rows {
                files.entry(file.post_id).or_default().push(file);
            }
        }

        Ok(posts
            .into_iter()
            .map(|post| PostDetails {
                author: authors.get(&post.user_id).cloned(),
                files: files.remove(&post.id).unwrap_or_default(),
                post,
            })
            .collect())
    }
}

/// Escapes LIKE wildcards so user input only ever matches literally.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

async fn insert_files(
    tx: &mut Transaction<'_, Postgres>,
    post_id: i64,
    files: Vec<NewPostFile>,
) -> StoreResult<()> {
    for file in files {
        sqlx::query(
            "INSERT INTO post_files (post_id, file_name, file_type, file_content) VALUES ($1, $2, $3, $4)",
        )
        .bind(post_id)
        .bind(file.file_name)
        .bind(file.file_type)
        .bind(file.file_content)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Recomputes the denormalized counters of a post from its reaction rows.
/// Always runs inside the transaction that changed the reactions.
async fn recompute_counters(
    tx: &mut Transaction<'_, Postgres>,
    post_id: i64,
) -> StoreResult<(i64, i64)> {
    let counters = sqlx::query_as::<_, (i64, i64)>(
        r#"
        UPDATE posts
        SET likes = (SELECT COUNT(*) FROM post_reactions WHERE post_id = $1 AND is_like),
            dislikes = (SELECT COUNT(*) FROM post_reactions WHERE post_id = $1 AND NOT is_like)
        WHERE id = $1
        RETURNING likes, dislikes
        "#,
    )
    .bind(post_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(counters)
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: i64) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, first_name, last_name, username, password_hash FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, first_name, last_name, username, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, first_name, last_name, username, password_hash FROM users ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (first_name, last_name, username, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, first_name, last_name, username, password_hash
            "#,
        )
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.username)
        .bind(user.password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update_user(&self, user: &User) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3, username = $4, password_hash = $5
            WHERE id = $1
            RETURNING id, first_name, last_name, username, password_hash
            "#,
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.username)
        .bind(&user.password_hash)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_user(&self, id: i64) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        // Other users' posts whose counters include this user's reactions.
        let touched: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT p.id FROM posts p
            WHERE p.user_id <> $1
              AND p.id IN (SELECT post_id FROM post_reactions WHERE user_id = $1)
            ORDER BY p.id
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        for post_id in touched {
            recompute_counters(&mut tx, post_id).await?;
        }

        tx.commit().await?;
        Ok(deleted)
    }

    async fn insert_post(&self, post: NewPost) -> StoreResult<Post> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (title, content, category, user_id, likes, dislikes)
            VALUES ($1, $2, $3, $4, 0, 0)
            RETURNING id, title, content, category, user_id, likes, dislikes
            "#,
        )
        .bind(post.title)
        .bind(post.content)
        .bind(post.category)
        .bind(post.user_id)
        .fetch_one(&mut *tx)
        .await?;

        insert_files(&mut tx, created.id, post.files).await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn get_post(&self, id: i64) -> StoreResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            "SELECT id, title, content, category, user_id, likes, dislikes FROM posts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    async fn get_post_details(
        &self,
        id: i64,
        fetch: PostFetch,
    ) -> StoreResult<Option<PostDetails>> {
        let Some(post) = self.get_post(id).await? else {
            return Ok(None);
        };
        Ok(self.attach_related(vec![post], fetch).await?.pop())
    }

    /// list_posts
    ///
    /// Builds the predicate with QueryBuilder so every user-supplied value is
    /// a bound parameter; LIKE patterns are escaped before binding.
    async fn list_posts(
        &self,
        filter: &PostFilter,
        fetch: PostFetch,
    ) -> StoreResult<Vec<PostDetails>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT p.id, p.title, p.content, p.category, p.user_id, p.likes, p.dislikes FROM posts p WHERE TRUE",
        );

        if let Some(owner_id) = filter.owner_id {
            builder.push(" AND p.user_id = ");
            builder.push_bind(owner_id);
        }

        if let Some(user_id) = filter.liked_by {
            builder.push(
                " AND EXISTS (SELECT 1 FROM post_reactions r WHERE r.post_id = p.id AND r.is_like AND r.user_id = ",
            );
            builder.push_bind(user_id);
            builder.push(")");
        }

        if let Some(file_type) = filter.file_type.as_deref() {
            builder.push(
                " AND EXISTS (SELECT 1 FROM post_files f WHERE f.post_id = p.id AND f.file_type ILIKE ",
            );
            builder.push_bind(format!("{}%", escape_like(file_type)));
            builder.push(")");
        }

        if let Some(search) = filter.search.as_deref() {
            let pattern = format!("%{}%", escape_like(search));
            builder.push(" AND (p.title ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR p.content ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }

        match filter.order {
            PostOrder::IdAsc => builder.push(" ORDER BY p.id ASC"),
            PostOrder::MostLiked => builder.push(" ORDER BY p.likes DESC, p.id ASC"),
        };

        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }

        let posts = builder
            .build_query_as::<Post>()
            .fetch_all(&self.pool)
            .await?;

        self.attach_related(posts, fetch).await
    }

    /// update_post
    ///
    /// COALESCE keeps columns whose new value is NULL. The category is
    /// written (possibly as NULL) only when `$4` is set. New attachments are
    /// inserted in the same transaction.
    async fn update_post(&self, id: i64, changes: PostChanges) -> StoreResult<Post> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Post>(
            r#"
            UPDATE posts
            SET title = COALESCE($2, title),
                content = COALESCE($3, content),
                category = CASE WHEN $4 THEN $5 ELSE category END
            WHERE id = $1
            RETURNING id, title, content, category, user_id, likes, dislikes
            "#,
        )
        .bind(id)
        .bind(changes.title)
        .bind(changes.content)
        .bind(changes.category.is_some())
        .bind(changes.category.flatten())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        insert_files(&mut tx, id, changes.new_files).await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_post(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_file(&self, post_id: i64, file_id: i64) -> StoreResult<Option<PostFile>> {
        let file = sqlx::query_as::<_, PostFile>(
            r#"
            SELECT id, post_id, file_name, file_type, file_content
            FROM post_files
            WHERE id = $1 AND post_id = $2
            "#,
        )
        .bind(file_id)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(file)
    }

    async fn delete_file(&self, post_id: i64, file_id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM post_files WHERE id = $1 AND post_id = $2")
            .bind(file_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_reaction(&self, post_id: i64, user_id: i64) -> StoreResult<Option<Reaction>> {
        let reaction = sqlx::query_as::<_, Reaction>(
            "SELECT id, post_id, user_id, is_like FROM post_reactions WHERE post_id = $1 AND user_id = $2",
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(reaction)
    }

    /// apply_reaction
    ///
    /// Locks the post row first so concurrent reactions on the same post are
    /// serialized; the reaction write and the counter recomputation commit
    /// together or not at all.
    async fn apply_reaction(
        &self,
        post_id: i64,
        user_id: i64,
        decide: &ReactionDecider,
    ) -> StoreResult<ReactionOutcome> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(StoreError::NotFound);
        }

        // Held until commit so a concurrent user delete waits for this write.
        let reactor: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR SHARE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if reactor.is_none() {
            return Err(StoreError::UserNotFound);
        }

        let existing = sqlx::query_as::<_, Reaction>(
            "SELECT id, post_id, user_id, is_like FROM post_reactions WHERE post_id = $1 AND user_id = $2",
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let change = decide(existing.as_ref().map(|r| r.is_like));

        match (change, existing) {
            (ReactionChange::Create(is_like), None) => {
                sqlx::query(
                    "INSERT INTO post_reactions (post_id, user_id, is_like) VALUES ($1, $2, $3)",
                )
                .bind(post_id)
                .bind(user_id)
                .bind(is_like)
                .execute(&mut *tx)
                .await?;
            }
            (ReactionChange::Flip(is_like), Some(row)) => {
                sqlx::query("UPDATE post_reactions SET is_like = $1 WHERE id = $2")
                    .bind(is_like)
                    .bind(row.id)
                    .execute(&mut *tx)
                    .await?;
            }
            (ReactionChange::Retract, Some(row)) => {
                sqlx::query("DELETE FROM post_reactions WHERE id = $1")
                    .bind(row.id)
                    .execute(&mut *tx)
                    .await?;
            }
            (change, existing) => {
                return Err(StoreError::Backend(format!(
                    "reaction change {:?} does not apply to existing row {:?}",
                    change, existing
                )));
            }
        }

        let (likes, dislikes) = recompute_counters(&mut tx, post_id).await?;
        tx.commit().await?;

        Ok(ReactionOutcome {
            state: change.resulting_state(),
            likes,
            dislikes,
        })
    }
}
