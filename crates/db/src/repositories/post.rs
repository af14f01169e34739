//! Post repository.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use plaza_common::{AppError, AppResult, IdGenerator};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, Statement, TransactionTrait,
    prelude::DateTimeWithTimeZone, sea_query::OnConflict,
};

use crate::entities::{Post, PostLike, post, post_like};

/// A stored post together with its like-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    /// Post ID; also the feed sort key.
    pub id: String,
    /// Author user ID.
    pub author_id: String,
    /// Post text.
    pub content: String,
    /// Creation time.
    pub created_at: DateTimeWithTimeZone,
    /// IDs of users who like this post.
    pub likes: BTreeSet<String>,
}

impl PostRecord {
    /// Build a record from a post row and its likes.
    #[must_use]
    pub fn from_model(model: post::Model, likes: BTreeSet<String>) -> Self {
        Self {
            id: model.id,
            author_id: model.author_id,
            content: model.content,
            created_at: model.created_at,
            likes,
        }
    }

    /// Number of likes.
    #[must_use]
    pub fn likes_count(&self) -> usize {
        self.likes.len()
    }
}

/// A post about to be inserted.
#[derive(Debug, Clone)]
pub struct NewPost {
    /// Author user ID.
    pub author_id: String,
    /// Post text, already normalized by the caller.
    pub content: String,
}

impl NewPost {
    /// Reject posts without content or author.
    pub fn validate(&self) -> AppResult<()> {
        if self.content.trim().is_empty() {
            return Err(AppError::Validation("Content is required".to_string()));
        }
        if self.author_id.trim().is_empty() {
            return Err(AppError::Validation("Author is required".to_string()));
        }
        Ok(())
    }
}

/// Result of a like mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeOutcome {
    /// The post after the mutation.
    pub post: PostRecord,
    /// Whether the user likes the post after the mutation.
    pub liked: bool,
}

/// Storage capability for posts.
///
/// Implementations own the post collection. Every mutation is a single
/// atomic operation against the store.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Insert a post, assigning an ID greater than every ID assigned before.
    async fn insert(&self, post: NewPost) -> AppResult<PostRecord>;

    /// Find a post by ID.
    async fn find_by_id(&self, id: &str) -> AppResult<Option<PostRecord>>;

    /// Posts with an ID strictly less than `boundary` (or the newest posts
    /// when there is no boundary), newest first, at most `limit` of them.
    async fn scan_before(&self, boundary: Option<&str>, limit: u64)
    -> AppResult<Vec<PostRecord>>;

    /// Flip the membership of `user_id` in the like-set of a post.
    async fn toggle_like(&self, post_id: &str, user_id: &str) -> AppResult<LikeOutcome>;

    /// Make the membership of `user_id` in the like-set of a post equal to `liked`.
    async fn set_like(&self, post_id: &str, user_id: &str, liked: bool)
    -> AppResult<LikeOutcome>;
}

/// Shared handle to a post store.
pub type PostStoreRef = Arc<dyn PostStore>;

/// Advisory lock key serializing post inserts.
const POST_INSERT_LOCK_KEY: i64 = 0x0070_6c61_7a61;

/// Post repository backed by `PostgreSQL`.
///
/// Inserts take a transaction-scoped advisory lock and pick an ID above the
/// current maximum, so posts commit in ID order and a reader's cursor is never
/// passed by a later commit.
#[derive(Clone)]
pub struct PostRepository {
    db: Arc<DatabaseConnection>,
    id_gen: IdGenerator,
}

impl PostRepository {
    /// Create a new post repository.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            id_gen: IdGenerator::new(),
        }
    }

    /// Lock the post row for the rest of the transaction.
    async fn lock_post<C: ConnectionTrait>(conn: &C, post_id: &str) -> AppResult<post::Model> {
        Post::find_by_id(post_id)
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::PostNotFound(post_id.to_string()))
    }

    async fn remove_like<C: ConnectionTrait>(
        conn: &C,
        post_id: &str,
        user_id: &str,
    ) -> AppResult<bool> {
        let result = PostLike::delete_many()
            .filter(post_like::Column::PostId.eq(post_id))
            .filter(post_like::Column::UserId.eq(user_id))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected > 0)
    }

    async fn add_like<C: ConnectionTrait>(conn: &C, post_id: &str, user_id: &str) -> AppResult<()> {
        let model = post_like::ActiveModel {
            post_id: Set(post_id.to_string()),
            user_id: Set(user_id.to_string()),
            created_at: Set(Utc::now().into()),
        };

        PostLike::insert(model)
            .on_conflict(
                OnConflict::columns([post_like::Column::PostId, post_like::Column::UserId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Load the like-sets of the given posts in one query.
    async fn load_likes<C: ConnectionTrait>(
        conn: &C,
        post_ids: &[String],
    ) -> AppResult<BTreeMap<String, BTreeSet<String>>> {
        if post_ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let likes = PostLike::find()
            .filter(post_like::Column::PostId.is_in(post_ids.to_vec()))
            .all(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut by_post: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for like in likes {
            by_post.entry(like.post_id).or_default().insert(like.user_id);
        }
        Ok(by_post)
    }

    async fn with_likes<C: ConnectionTrait>(
        conn: &C,
        posts: Vec<post::Model>,
    ) -> AppResult<Vec<PostRecord>> {
        let ids: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();
        let mut likes = Self::load_likes(conn, &ids).await?;

        Ok(posts
            .into_iter()
            .map(|p| {
                let set = likes.remove(&p.id).unwrap_or_default();
                PostRecord::from_model(p, set)
            })
            .collect())
    }

    async fn finish_like_mutation(
        txn: sea_orm::DatabaseTransaction,
        post: post::Model,
        liked: bool,
    ) -> AppResult<LikeOutcome> {
        let mut records = Self::with_likes(&txn, vec![post]).await?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let post = records
            .pop()
            .ok_or_else(|| AppError::Internal("Post vanished during like update".to_string()))?;
        Ok(LikeOutcome { post, liked })
    }
}

fn map_insert_error(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
            AppError::Validation("Author does not exist".to_string())
        }
        _ => AppError::Database(err.to_string()),
    }
}

#[async_trait]
impl PostStore for PostRepository {
    async fn insert(&self, post: NewPost) -> AppResult<PostRecord> {
        post.validate()?;

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Held until commit; concurrent inserts queue here.
        txn.execute(Statement::from_string(
            DatabaseBackend::Postgres,
            format!("SELECT pg_advisory_xact_lock({POST_INSERT_LOCK_KEY})"),
        ))
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let latest = Post::find()
            .order_by_desc(post::Column::Id)
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let model = post::ActiveModel {
            id: Set(self.id_gen.generate_after(latest.as_ref().map(|p| p.id.as_str()))?),
            author_id: Set(post.author_id),
            content: Set(post.content),
            created_at: Set(Utc::now().into()),
        };

        let created = model.insert(&txn).await.map_err(map_insert_error)?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(PostRecord::from_model(created, BTreeSet::new()))
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<PostRecord>> {
        let Some(model) = Post::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let mut records = Self::with_likes(self.db.as_ref(), vec![model]).await?;
        Ok(records.pop())
    }

    async fn scan_before(
        &self,
        boundary: Option<&str>,
        limit: u64,
    ) -> AppResult<Vec<PostRecord>> {
        let mut query = Post::find().order_by_desc(post::Column::Id).limit(limit);

        if let Some(until) = boundary {
            query = query.filter(post::Column::Id.lt(until));
        }

        let posts = query
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Self::with_likes(self.db.as_ref(), posts).await
    }

    async fn toggle_like(&self, post_id: &str, user_id: &str) -> AppResult<LikeOutcome> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Concurrent like mutations on this post queue up behind the row lock.
        let post = Self::lock_post(&txn, post_id).await?;

        let removed = Self::remove_like(&txn, post_id, user_id).await?;
        if !removed {
            Self::add_like(&txn, post_id, user_id).await?;
        }

        Self::finish_like_mutation(txn, post, !removed).await
    }

    async fn set_like(
        &self,
        post_id: &str,
        user_id: &str,
        liked: bool,
    ) -> AppResult<LikeOutcome> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let post = Self::lock_post(&txn, post_id).await?;

        if liked {
            Self::add_like(&txn, post_id, user_id).await?;
        } else {
            Self::remove_like(&txn, post_id, user_id).await?;
        }

        Self::finish_like_mutation(txn, post, liked).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_post(id: &str, author_id: &str, content: &str) -> post::Model {
        post::Model {
            id: id.to_string(),
            author_id: author_id.to_string(),
            content: content.to_string(),
            created_at: Utc::now().into(),
        }
    }

    fn create_test_like(post_id: &str, user_id: &str) -> post_like::Model {
        post_like::Model {
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now().into(),
        }
    }

    fn exec(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    #[tokio::test]
    async fn test_find_by_id_found() {
        let post = create_test_post("post1", "user1", "Hello world");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[post.clone()]])
                .append_query_results([[
                    create_test_like("post1", "user2"),
                    create_test_like("post1", "user3"),
                ]])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let found = repo.find_by_id("post1").await.unwrap().unwrap();

        assert_eq!(found.id, "post1");
        assert_eq!(found.content, "Hello world");
        assert_eq!(found.likes_count(), 2);
        assert!(found.likes.contains("user2"));
    }

    #[tokio::test]
    async fn test_find_by_id_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<post::Model>::new()])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let result = repo.find_by_id("nonexistent").await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_scan_before_attaches_likes_per_post() {
        let newer = create_test_post("post2", "user1", "second");
        let older = create_test_post("post1", "user1", "first");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[newer, older]])
                .append_query_results([[create_test_like("post1", "user9")]])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let posts = repo.scan_before(Some("post3"), 3).await.unwrap();

        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "post2");
        assert!(posts[0].likes.is_empty());
        assert_eq!(posts[1].likes.iter().collect::<Vec<_>>(), vec!["user9"]);
    }

    #[tokio::test]
    async fn test_scan_before_empty_skips_like_query() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<post::Model>::new()])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let posts = repo.scan_before(None, 11).await.unwrap();

        assert!(posts.is_empty());
    }

    #[tokio::test]
    async fn test_toggle_like_adds_missing_like() {
        let post = create_test_post("post1", "user1", "Hello");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[post]])
                .append_exec_results([exec(0), exec(1)])
                .append_query_results([[create_test_like("post1", "user2")]])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let outcome = repo.toggle_like("post1", "user2").await.unwrap();

        assert!(outcome.liked);
        assert!(outcome.post.likes.contains("user2"));
    }

    #[tokio::test]
    async fn test_toggle_like_removes_existing_like() {
        let post = create_test_post("post1", "user1", "Hello");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[post]])
                .append_exec_results([exec(1)])
                .append_query_results([Vec::<post_like::Model>::new()])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let outcome = repo.toggle_like("post1", "user2").await.unwrap();

        assert!(!outcome.liked);
        assert!(outcome.post.likes.is_empty());
    }

    #[tokio::test]
    async fn test_toggle_like_missing_post() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<post::Model>::new()])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let result = repo.toggle_like("missing", "user2").await;

        match result {
            Err(AppError::PostNotFound(id)) => assert_eq!(id, "missing"),
            other => panic!("Expected PostNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_insert_holds_lock_and_reads_latest_id() {
        let latest = create_test_post("7zzzzzzzzzzzzzzzzzzzzzzzzy", "user1", "future");
        let stored = create_test_post("7zzzzzzzzzzzzzzzzzzzzzzzzz", "user1", "Hello");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([exec(1)])
                .append_query_results([[latest]])
                .append_query_results([[stored.clone()]])
                .into_connection(),
        );

        let repo = PostRepository::new(Arc::clone(&db));
        let created = repo
            .insert(NewPost {
                author_id: "user1".to_string(),
                content: "Hello".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(created.id, stored.id);
        assert!(created.likes.is_empty());

        drop(repo);
        let log = format!(
            "{:?}",
            Arc::try_unwrap(db).unwrap().into_transaction_log()
        );
        assert!(log.contains("pg_advisory_xact_lock"));
        assert!(log.contains("7zzzzzzzzzzzzzzzzzzzzzzzzz"));
    }

    #[tokio::test]
    async fn test_set_like_true_inserts_row() {
        let post = create_test_post("post1", "user1", "Hello");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[post]])
                .append_exec_results([exec(1)])
                .append_query_results([[create_test_like("post1", "user2")]])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let outcome = repo.set_like("post1", "user2", true).await.unwrap();

        assert!(outcome.liked);
        assert_eq!(outcome.post.likes_count(), 1);
        assert!(outcome.post.likes.contains("user2"));
    }

    #[tokio::test]
    async fn test_set_like_false_deletes_row() {
        let post = create_test_post("post1", "user1", "Hello");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[post]])
                .append_exec_results([exec(1)])
                .append_query_results([Vec::<post_like::Model>::new()])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let outcome = repo.set_like("post1", "user2", false).await.unwrap();

        assert!(!outcome.liked);
        assert!(outcome.post.likes.is_empty());
    }

    #[tokio::test]
    async fn test_set_like_missing_post() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<post::Model>::new()])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let result = repo.set_like("missing", "user2", true).await;

        assert!(matches!(result, Err(AppError::PostNotFound(_))));
    }

    #[tokio::test]
    async fn test_insert_rejects_blank_content() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());

        let repo = PostRepository::new(db);
        let result = repo
            .insert(NewPost {
                author_id: "user1".to_string(),
                content: "   ".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
