//! Post feed endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::post,
};
use plaza_common::AppResult;
use plaza_core::{CreatePostInput, FeedPage, FeedPost, LikeResult, ListPostsInput, UserSummary};
use serde::Serialize;

use crate::{
    extractors::{AppJson, AuthUser},
    middleware::AppState,
    response::Created,
};

/// A user shown next to a post.
#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserSummaryResponse {
    pub id: String,
    pub username: Option<String>,
}

impl From<UserSummary> for UserSummaryResponse {
    fn from(user: UserSummary) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

/// Post response.
#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: String,
    pub content: String,
    pub author: UserSummaryResponse,
    pub likes: Vec<UserSummaryResponse>,
    pub likes_count: usize,
    pub created_at: String,
}

impl From<FeedPost> for PostResponse {
    fn from(post: FeedPost) -> Self {
        Self {
            id: post.id,
            content: post.content,
            author: post.author.into(),
            likes: post.likes.into_iter().map(Into::into).collect(),
            likes_count: post.likes_count,
            created_at: post.created_at.to_rfc3339(),
        }
    }
}

/// One page of the feed.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListResponse {
    pub posts: Vec<PostResponse>,
    pub next_cursor: Option<String>,
    pub limit: u64,
    pub returned: usize,
}

impl From<FeedPage> for PostListResponse {
    fn from(page: FeedPage) -> Self {
        Self {
            posts: page.posts.into_iter().map(Into::into).collect(),
            next_cursor: page.next_cursor,
            limit: page.limit,
            returned: page.returned,
        }
    }
}

/// Like mutation response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub post: PostResponse,
    pub liked: bool,
}

impl From<LikeResult> for LikeResponse {
    fn from(result: LikeResult) -> Self {
        Self {
            post: result.post.into(),
            liked: result.liked,
        }
    }
}

/// Create a post.
async fn create(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    AppJson(req): AppJson<CreatePostInput>,
) -> AppResult<Created<PostResponse>> {
    let post = state.feed_service.create_post(&user.user_id, req).await?;
    Ok(Created(post.into()))
}

/// List posts, newest first.
async fn list(
    AuthUser(_user): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListPostsInput>,
) -> AppResult<Json<PostListResponse>> {
    let page = state.feed_service.list_posts(query).await?;
    Ok(Json(page.into()))
}

/// Toggle the caller's like.
async fn toggle_like(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<Json<LikeResponse>> {
    let result = state
        .feed_service
        .toggle_like(&post_id, &user.user_id)
        .await?;
    Ok(Json(result.into()))
}

/// Like the post; repeating the call changes nothing.
async fn like(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<Json<LikeResponse>> {
    let result = state
        .feed_service
        .set_like(&post_id, &user.user_id, true)
        .await?;
    Ok(Json(result.into()))
}

/// Remove the caller's like; repeating the call changes nothing.
async fn unlike(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<Json<LikeResponse>> {
    let result = state
        .feed_service
        .set_like(&post_id, &user.user_id, false)
        .await?;
    Ok(Json(result.into()))
}

/// Routes under `/posts`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create).get(list))
        .route(
            "/{post_id}/like",
            post(toggle_like).put(like).delete(unlike),
        )
}
