//! Community endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use founder_common::AppResult;
use founder_db::entities::{community, community_member};
use founder_db::repositories::PostOrder;
use serde::{Deserialize, Serialize};

use crate::endpoints::posts::PostResponse;
use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

const fn default_limit() -> u64 {
    25
}

/// Community response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityResponse {
    pub id: String,
    pub name: String,
    pub title: String,
    pub description: Option<String>,
    pub visibility: community::Visibility,
    pub members_count: i32,
    pub creator_id: String,
    pub created_at: String,
}

impl From<community::Model> for CommunityResponse {
    fn from(c: community::Model) -> Self {
        Self {
            id: c.id,
            name: c.name,
            title: c.title,
            description: c.description,
            visibility: c.visibility,
            members_count: c.members_count,
            creator_id: c.creator_id,
            created_at: c.created_at.to_rfc3339(),
        }
    }
}

/// Membership response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipResponse {
    pub community_id: String,
    pub user_id: String,
    pub role: community_member::MemberRole,
}

impl From<community_member::Model> for MembershipResponse {
    fn from(m: community_member::Model) -> Self {
        Self {
            community_id: m.community_id,
            user_id: m.user_id,
            role: m.role,
        }
    }
}

/// List query parameters.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub q: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

/// List communities.
async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<ApiResponse<Vec<CommunityResponse>>> {
    let limit = query.limit.min(100);
    let communities = state
        .community_service
        .list(query.q.as_deref(), limit, query.offset)
        .await?;

    Ok(ApiResponse::ok(
        communities.into_iter().map(Into::into).collect(),
    ))
}

/// Create a community.
async fn create(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<founder_core::CreateCommunityInput>,
) -> AppResult<ApiResponse<CommunityResponse>> {
    let community = state.community_service.create(&user.id, req).await?;
    Ok(ApiResponse::ok(community.into()))
}

/// Get a community by name.
async fn get_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<ApiResponse<CommunityResponse>> {
    let community = state.community_service.get_by_name(&name).await?;
    Ok(ApiResponse::ok(community.into()))
}

/// Update a community (admin only). The name is immutable.
async fn update(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<founder_core::UpdateCommunityInput>,
) -> AppResult<ApiResponse<CommunityResponse>> {
    let community = state.community_service.get_by_name(&name).await?;
    let updated = state
        .community_service
        .update(&user.id, &community.id, req)
        .await?;
    Ok(ApiResponse::ok(updated.into()))
}

/// List members of a community.
async fn members(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ListQuery>,
) -> AppResult<ApiResponse<Vec<MembershipResponse>>> {
    let limit = query.limit.min(100);
    let members = state
        .community_service
        .list_members(&id, limit, query.offset)
        .await?;

    Ok(ApiResponse::ok(members.into_iter().map(Into::into).collect()))
}

/// Role-change request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    pub role: community_member::MemberRole,
}

/// Change a member's role (admin only).
async fn update_role(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path((id, member_user_id)): Path<(String, String)>,
    Json(req): Json<UpdateRoleRequest>,
) -> AppResult<ApiResponse<MembershipResponse>> {
    let member = state
        .community_service
        .update_member_role(&user.id, &id, &member_user_id, req.role)
        .await?;

    Ok(ApiResponse::ok(member.into()))
}

/// Join a community.
async fn join(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<MembershipResponse>> {
    let member = state.community_service.join(&user.id, &id).await?;
    Ok(ApiResponse::ok(member.into()))
}

/// Leave response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveResponse {
    pub ok: bool,
}

/// Leave a community. Rejected for the sole admin.
async fn leave(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<LeaveResponse>> {
    state.community_service.leave(&user.id, &id).await?;
    Ok(ApiResponse::ok(LeaveResponse { ok: true }))
}

/// Feed query parameters.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    #[serde(default)]
    pub sort: PostOrder,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

/// List posts in a community.
async fn community_posts(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<FeedQuery>,
) -> AppResult<ApiResponse<Vec<PostResponse>>> {
    let limit = query.limit.min(100);
    let posts = state
        .post_service
        .community_feed(&id, query.sort, limit, query.offset)
        .await?;

    Ok(ApiResponse::ok(posts.into_iter().map(Into::into).collect()))
}

/// Create a post in a community.
async fn create_post(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<founder_core::CreatePostInput>,
) -> AppResult<ApiResponse<PostResponse>> {
    let post = state.post_service.create(&user.id, &id, req).await?;
    Ok(ApiResponse::ok(post.into()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{name}", get(get_by_name).patch(update))
        .route("/{id}/join", post(join))
        .route("/{id}/leave", post(leave))
        .route("/{id}/members", get(members))
        .route("/{id}/members/{user_id}/role", post(update_role))
        .route("/{id}/posts", get(community_posts).post(create_post))
}
