//! Post endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use founder_common::AppResult;
use founder_db::entities::{post, post_vote::VoteType};
use founder_db::repositories::{PostOrder, VoteOutcome};
use serde::{Deserialize, Serialize};

use crate::endpoints::comments::{CommentResponse, CommentThreadResponse};
use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

const fn default_limit() -> u64 {
    25
}

/// Post response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: String,
    pub community_id: String,
    pub user_id: String,
    pub title: String,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub upvotes: i32,
    pub downvotes: i32,
    pub comments_count: i32,
    pub created_at: String,
}

impl From<post::Model> for PostResponse {
    fn from(p: post::Model) -> Self {
        Self {
            id: p.id,
            community_id: p.community_id,
            user_id: p.user_id,
            title: p.title,
            content: p.content,
            image_url: p.image_url,
            upvotes: p.upvotes,
            downvotes: p.downvotes,
            comments_count: p.comments_count,
            created_at: p.created_at.to_rfc3339(),
        }
    }
}

/// Feed query parameters.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    #[serde(default)]
    pub sort: PostOrder,
    pub q: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

/// Global feed.
async fn feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> AppResult<ApiResponse<Vec<PostResponse>>> {
    let limit = query.limit.min(100);
    let posts = state
        .post_service
        .feed(query.sort, query.q.as_deref(), limit, query.offset)
        .await?;

    Ok(ApiResponse::ok(posts.into_iter().map(Into::into).collect()))
}

/// Get a single post.
async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<PostResponse>> {
    let post = state.post_service.get(&id).await?;
    Ok(ApiResponse::ok(post.into()))
}

/// Delete response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePostResponse {
    pub ok: bool,
}

/// Delete a post (author only).
async fn delete_post(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<DeletePostResponse>> {
    state.post_service.delete(&user.id, &id).await?;
    Ok(ApiResponse::ok(DeletePostResponse { ok: true }))
}

/// Vote request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub vote_type: VoteType,
}

/// Vote response carrying the fresh tallies.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub outcome: String,
    pub upvotes: i32,
    pub downvotes: i32,
}

pub(crate) const fn outcome_label(outcome: VoteOutcome) -> &'static str {
    match outcome {
        VoteOutcome::Created => "created",
        VoteOutcome::Toggled => "removed",
        VoteOutcome::Flipped => "changed",
    }
}

/// Vote on a post. Same vote twice toggles it off; the opposite vote flips.
async fn vote(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<VoteRequest>,
) -> AppResult<ApiResponse<VoteResponse>> {
    let result = state
        .vote_service
        .vote_on_post(&user.id, &id, req.vote_type)
        .await?;

    Ok(ApiResponse::ok(VoteResponse {
        outcome: outcome_label(result.outcome).to_string(),
        upvotes: result.tally.upvotes,
        downvotes: result.tally.downvotes,
    }))
}

/// Pagination for comment listings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentsQuery {
    #[serde(default = "default_comments_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

const fn default_comments_limit() -> u64 {
    50
}

/// List comments on a post with one-level replies.
async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CommentsQuery>,
) -> AppResult<ApiResponse<Vec<CommentThreadResponse>>> {
    let limit = query.limit.min(100);
    let threads = state
        .comment_service
        .list_for_post(&id, limit, query.offset)
        .await?;

    Ok(ApiResponse::ok(
        threads
            .into_iter()
            .map(|t| CommentThreadResponse {
                comment: t.comment.into(),
                replies: t.replies.into_iter().map(Into::into).collect(),
            })
            .collect(),
    ))
}

/// Create a comment on a post (moderated inline).
async fn create_comment(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<founder_core::CreateCommentInput>,
) -> AppResult<ApiResponse<CommentResponse>> {
    let comment = state.comment_service.create(&user.id, &id, req).await?;
    Ok(ApiResponse::ok(comment.into()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(feed))
        .route("/{id}", get(get_post).delete(delete_post))
        .route("/{id}/vote", post(vote))
        .route("/{id}/comments", get(list_comments).post(create_comment))
}
