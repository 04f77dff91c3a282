//! API middleware.

#![allow(missing_docs)]

use std::sync::Arc;

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use founder_common::StorageBackend;
use founder_core::{
    BillingService, CommentService, CommunityService, PostService, SsoService, UserService,
    VoteService,
};

use crate::sse::SseBroadcaster;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub user_service: UserService,
    pub community_service: CommunityService,
    pub post_service: PostService,
    pub comment_service: CommentService,
    pub vote_service: VoteService,
    pub billing_service: BillingService,
    pub sso_service: SsoService,
    pub storage: Arc<dyn StorageBackend>,
    pub sse_broadcaster: SseBroadcaster,
}

/// Authentication middleware.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    // Try to extract token from header
    if let Some(auth_header) = req.headers().get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        // Authenticate user by token
        if let Ok(user) = state.user_service.authenticate_by_token(token).await {
            req.extensions_mut().insert(user);
        }
    }

    next.run(req).await
}
