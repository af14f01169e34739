//! Feed service: post creation, cursor-paginated listing and likes.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, FixedOffset};
use plaza_common::{AppError, AppResult, config::FeedConfig, normalize_id};
use plaza_db::repositories::{NewPost, PostRecord, PostStoreRef, UserStoreRef};
use serde::Deserialize;
use tracing::debug;
use validator::ValidateLength;

use super::{cursor::CursorCodec, lenient};

/// Body of a create-post request.
#[derive(Debug, Default, Deserialize)]
pub struct CreatePostInput {
    #[serde(default, deserialize_with = "lenient::optional_string")]
    pub content: Option<String>,
}

/// Query of a list-posts request. Both fields arrive as raw strings and are
/// coerced by the service.
#[derive(Debug, Default, Deserialize)]
pub struct ListPostsInput {
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// A user as shown next to a post. `username` is `None` when the account
/// could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub id: String,
    pub username: Option<String>,
}

/// A post ready for display.
#[derive(Debug, Clone)]
pub struct FeedPost {
    pub id: String,
    pub content: String,
    pub author: UserSummary,
    pub likes: Vec<UserSummary>,
    pub likes_count: usize,
    pub created_at: DateTime<FixedOffset>,
}

/// One page of the feed.
#[derive(Debug, Clone)]
pub struct FeedPage {
    pub posts: Vec<FeedPost>,
    pub next_cursor: Option<String>,
    pub limit: u64,
    pub returned: usize,
}

/// Result of a like mutation.
#[derive(Debug, Clone)]
pub struct LikeResult {
    pub post: FeedPost,
    pub liked: bool,
}

/// Orchestrates the post store, the user store and the cursor codec.
#[derive(Clone)]
pub struct FeedService {
    posts: PostStoreRef,
    users: UserStoreRef,
    config: FeedConfig,
}

impl FeedService {
    #[must_use]
    pub fn new(posts: PostStoreRef, users: UserStoreRef, config: FeedConfig) -> Self {
        Self {
            posts,
            users,
            config,
        }
    }

    /// Create a post authored by `author_id`.
    pub async fn create_post(&self, author_id: &str, input: CreatePostInput) -> AppResult<FeedPost> {
        let content = input.content.as_deref().map(str::trim).unwrap_or_default();
        if content.is_empty() {
            return Err(AppError::Validation("Content is required".to_string()));
        }
        let max = self.config.max_content_length as u64;
        if !content.validate_length(None, Some(max), None) {
            return Err(AppError::Validation(format!(
                "Content must be at most {max} characters"
            )));
        }

        if self.users.find_by_id(author_id).await?.is_none() {
            return Err(AppError::Validation("Author does not exist".to_string()));
        }

        let record = self
            .posts
            .insert(NewPost {
                author_id: author_id.to_string(),
                content: content.to_string(),
            })
            .await?;

        debug!(post_id = %record.id, author_id = %record.author_id, "Created post");

        let mut posts = self.present(vec![record]).await?;
        posts
            .pop()
            .ok_or_else(|| AppError::Internal("Created post missing".to_string()))
    }

    /// List posts newest first, starting after the post the cursor names.
    pub async fn list_posts(&self, input: ListPostsInput) -> AppResult<FeedPage> {
        let limit = self.clamp_limit(input.limit.as_deref());
        let boundary = CursorCodec::decode_optional(input.cursor.as_deref())?;

        let mut records = self
            .posts
            .scan_before(boundary.as_deref(), limit + 1)
            .await?;

        let has_more = records.len() as u64 > limit;
        records.truncate(limit as usize);

        let next_cursor = if has_more {
            records.last().map(|last| CursorCodec::encode(&last.id))
        } else {
            None
        };

        let posts = self.present(records).await?;
        Ok(FeedPage {
            returned: posts.len(),
            posts,
            next_cursor,
            limit,
        })
    }

    /// Flip whether `user_id` likes the post.
    pub async fn toggle_like(&self, post_id: &str, user_id: &str) -> AppResult<LikeResult> {
        let post_id = parse_post_id(post_id)?;
        self.require_user(user_id).await?;
        let outcome = self.posts.toggle_like(&post_id, user_id).await?;

        debug!(post_id = %post_id, user_id = %user_id, liked = outcome.liked, "Toggled like");

        self.like_result(outcome.post, outcome.liked).await
    }

    /// Make whether `user_id` likes the post equal to `liked`.
    pub async fn set_like(&self, post_id: &str, user_id: &str, liked: bool) -> AppResult<LikeResult> {
        let post_id = parse_post_id(post_id)?;
        self.require_user(user_id).await?;
        let outcome = self.posts.set_like(&post_id, user_id, liked).await?;

        debug!(post_id = %post_id, user_id = %user_id, liked, "Set like");

        self.like_result(outcome.post, outcome.liked).await
    }

    /// A token whose subject names no account cannot like anything.
    async fn require_user(&self, user_id: &str) -> AppResult<()> {
        match self.users.find_by_id(user_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::Unauthorized),
        }
    }

    /// Parse a requested page size, falling back to the default for anything
    /// that is not a positive integer.
    fn clamp_limit(&self, raw: Option<&str>) -> u64 {
        let max = self.config.max_limit.max(1);
        let default = self.config.default_limit.clamp(1, max);

        raw.and_then(|value| value.trim().parse::<i64>().ok())
            .filter(|&value| value > 0)
            .map_or(default, |value| (value as u64).min(max))
    }

    async fn like_result(&self, record: PostRecord, liked: bool) -> AppResult<LikeResult> {
        let mut posts = self.present(vec![record]).await?;
        let post = posts
            .pop()
            .ok_or_else(|| AppError::Internal("Liked post missing".to_string()))?;
        Ok(LikeResult { post, liked })
    }

    /// Resolve authors and likers for display with a single user lookup.
    async fn present(&self, records: Vec<PostRecord>) -> AppResult<Vec<FeedPost>> {
        let user_ids: BTreeSet<&String> = records
            .iter()
            .flat_map(|r| std::iter::once(&r.author_id).chain(r.likes.iter()))
            .collect();
        let user_ids: Vec<String> = user_ids.into_iter().cloned().collect();

        let usernames: HashMap<String, String> = self
            .users
            .find_by_ids(&user_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect();

        let summary = |id: &String| UserSummary {
            id: id.clone(),
            username: usernames.get(id).cloned(),
        };

        Ok(records
            .into_iter()
            .map(|record| FeedPost {
                author: summary(&record.author_id),
                likes: record.likes.iter().map(summary).collect(),
                likes_count: record.likes_count(),
                id: record.id,
                content: record.content,
                created_at: record.created_at,
            })
            .collect())
    }
}

fn parse_post_id(post_id: &str) -> AppResult<String> {
    normalize_id(post_id.trim()).ok_or_else(|| AppError::BadRequest("Invalid post id".to_string()))
}
