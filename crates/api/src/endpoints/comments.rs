//! Comment endpoints: voting, AI follow-up, enhancement, process flows.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use founder_common::AppResult;
use founder_db::entities::{comment, post_vote::VoteType};
use founder_core::ProcessFlow;
use serde::{Deserialize, Serialize};

use crate::endpoints::posts::{VoteRequest, VoteResponse, outcome_label};
use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Comment response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub status: comment::CommentStatus,
    pub ai_prompt: Option<String>,
    pub upvotes: i32,
    pub downvotes: i32,
    pub created_at: String,
}

impl From<comment::Model> for CommentResponse {
    fn from(c: comment::Model) -> Self {
        Self {
            id: c.id,
            post_id: c.post_id,
            user_id: c.user_id,
            parent_id: c.parent_id,
            content: c.content,
            status: c.status,
            ai_prompt: c.ai_prompt,
            upvotes: c.upvotes,
            downvotes: c.downvotes,
            created_at: c.created_at.to_rfc3339(),
        }
    }
}

/// A top-level comment with its one-level replies.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThreadResponse {
    #[serde(flatten)]
    pub comment: CommentResponse,
    pub replies: Vec<CommentResponse>,
}

/// Vote on a comment.
async fn vote(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<VoteRequest>,
) -> AppResult<ApiResponse<VoteResponse>> {
    let result = state
        .vote_service
        .vote_on_comment(&user.id, &id, req.vote_type)
        .await?;

    Ok(ApiResponse::ok(VoteResponse {
        outcome: outcome_label(result.outcome).to_string(),
        upvotes: result.tally.upvotes,
        downvotes: result.tally.downvotes,
    }))
}

/// Respond-to-AI request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondToAiRequest {
    pub response: String,
}

/// Answer the moderation follow-up question; the model merges the answer
/// into the comment.
async fn respond_to_ai(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RespondToAiRequest>,
) -> AppResult<ApiResponse<CommentResponse>> {
    let comment = state
        .comment_service
        .respond_to_ai(&user.id, &id, &req.response)
        .await?;

    Ok(ApiResponse::ok(comment.into()))
}

/// Enhance request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceRequest {
    pub comment_id: String,
}

/// Rewrite a comment for clarity (premium-gated, quota-metered).
async fn enhance(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<EnhanceRequest>,
) -> AppResult<ApiResponse<CommentResponse>> {
    let comment = state
        .comment_service
        .enhance(&user, &req.comment_id)
        .await?;

    Ok(ApiResponse::ok(comment.into()))
}

/// Process-flow response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFlowsResponse {
    pub flows: Vec<ProcessFlow>,
}

/// Generate process-flow suggestions from a comment (premium-gated,
/// quota-metered). Flips the comment status to `ai_processed`.
async fn process_flows(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<ProcessFlowsResponse>> {
    let flows = state
        .comment_service
        .generate_process_flows(&user, &id)
        .await?;

    Ok(ApiResponse::ok(ProcessFlowsResponse { flows }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/vote", post(vote))
        .route("/{id}/respond-to-ai", post(respond_to_ai))
        .route("/ai-enhance", post(enhance))
        .route("/{id}/process-flows", post(process_flows))
}
