//! In-process stores.
//!
//! Used by tests and by deployments that set `database.in_memory`. Data lives
//! only as long as the process.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use chrono::Utc;
use plaza_common::{AppError, AppResult, IdGenerator};
use tokio::sync::RwLock;

use super::post::{LikeOutcome, NewPost, PostRecord, PostStore};
use super::user::{DUPLICATE_USER_MESSAGE, NewUser, UserStore};
use crate::entities::user;

/// Post store keyed by ID in a sorted map.
///
/// IDs are assigned while the write lock is held, so a reader can never see a
/// post with a smaller ID appear after a larger one.
#[derive(Debug, Default)]
pub struct MemoryPostStore {
    posts: RwLock<BTreeMap<String, PostRecord>>,
    id_gen: IdGenerator,
}

impl MemoryPostStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn mutate_likes<F>(&self, post_id: &str, apply: F) -> AppResult<LikeOutcome>
    where
        F: FnOnce(&mut BTreeSet<String>) -> bool + Send,
    {
        let mut posts = self.posts.write().await;
        let post = posts
            .get_mut(post_id)
            .ok_or_else(|| AppError::PostNotFound(post_id.to_string()))?;

        let liked = apply(&mut post.likes);
        Ok(LikeOutcome {
            post: post.clone(),
            liked,
        })
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn insert(&self, post: NewPost) -> AppResult<PostRecord> {
        post.validate()?;

        let mut posts = self.posts.write().await;
        let record = PostRecord {
            id: self.id_gen.generate()?,
            author_id: post.author_id,
            content: post.content,
            created_at: Utc::now().into(),
            likes: BTreeSet::new(),
        };
        posts.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<PostRecord>> {
        Ok(self.posts.read().await.get(id).cloned())
    }

    async fn scan_before(
        &self,
        boundary: Option<&str>,
        limit: u64,
    ) -> AppResult<Vec<PostRecord>> {
        let take = usize::try_from(limit).unwrap_or(usize::MAX);
        let posts = self.posts.read().await;

        let page = match boundary {
            Some(until) => posts
                .range::<str, _>((Bound::Unbounded, Bound::Excluded(until)))
                .rev()
                .take(take)
                .map(|(_, p)| p.clone())
                .collect(),
            None => posts.values().rev().take(take).cloned().collect(),
        };
        Ok(page)
    }

    async fn toggle_like(&self, post_id: &str, user_id: &str) -> AppResult<LikeOutcome> {
        self.mutate_likes(post_id, |likes| {
            if likes.remove(user_id) {
                false
            } else {
                likes.insert(user_id.to_string());
                true
            }
        })
        .await
    }

    async fn set_like(
        &self,
        post_id: &str,
        user_id: &str,
        liked: bool,
    ) -> AppResult<LikeOutcome> {
        self.mutate_likes(post_id, |likes| {
            if liked {
                likes.insert(user_id.to_string());
            } else {
                likes.remove(user_id);
            }
            liked
        })
        .await
    }
}

/// User store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, user::Model>>,
    id_gen: IdGenerator,
}

impl MemoryUserStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<user::Model>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<user::Model>> {
        let users = self.users.read().await;
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<user::Model>> {
        let email = email.to_lowercase();
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> AppResult<Option<user::Model>> {
        let email = email.to_lowercase();
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.username == username || u.email == email)
            .cloned())
    }

    async fn create(&self, new_user: NewUser) -> AppResult<user::Model> {
        let email = new_user.email.to_lowercase();
        let mut users = self.users.write().await;

        if users
            .values()
            .any(|u| u.username == new_user.username || u.email == email)
        {
            return Err(AppError::Conflict(DUPLICATE_USER_MESSAGE.to_string()));
        }

        let model = user::Model {
            id: self.id_gen.generate()?,
            username: new_user.username,
            email,
            password_hash: new_user.password_hash,
            created_at: Utc::now().into(),
        };
        users.insert(model.id.clone(), model.clone());
        Ok(model)
    }
}
