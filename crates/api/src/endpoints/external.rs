//! External SSO endpoints for the project-management integration.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use founder_common::AppResult;
use founder_core::{ExternalClaims, RegisterWebhookInput};
use serde::{Deserialize, Serialize};

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Token response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: i64,
}

/// Issue a short-lived JWT for the external app.
async fn token(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<TokenResponse>> {
    let (token, expires_at) = state.sso_service.issue_token(&user)?;

    Ok(ApiResponse::ok(TokenResponse { token, expires_at }))
}

/// Verify request (posted by the external app).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub token: String,
}

/// Verify response echoing the claims.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub valid: bool,
    pub user_id: String,
    pub username: String,
    pub email: Option<String>,
    pub plan: String,
}

/// Verify a token presented by the external app.
///
/// First-seen identities are provisioned as SSO accounts (no password).
async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> AppResult<ApiResponse<VerifyResponse>> {
    let claims: ExternalClaims = state.sso_service.verify_token(&req.token)?;

    let user = state
        .user_service
        .upsert_sso_user(&claims.username, claims.email.as_deref())
        .await?;

    Ok(ApiResponse::ok(VerifyResponse {
        valid: true,
        user_id: user.id,
        username: claims.username,
        email: claims.email,
        plan: claims.plan,
    }))
}

/// Access-link response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLinkResponse {
    pub url: String,
}

/// Build a link into the external app carrying a fresh token.
async fn access_link(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<AccessLinkResponse>> {
    let url = state.sso_service.access_link(&user)?;

    Ok(ApiResponse::ok(AccessLinkResponse { url }))
}

/// Register a webhook endpoint for subscription-change events.
async fn register_webhook(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<RegisterWebhookInput>,
) -> AppResult<ApiResponse<founder_core::WebhookWithSecretResponse>> {
    let webhook = state.sso_service.register_webhook(&user.id, req).await?;

    Ok(ApiResponse::ok(webhook))
}

/// List registered webhook endpoints.
async fn list_webhooks(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<founder_core::WebhookResponse>>> {
    let webhooks = state.sso_service.list_webhooks(&user.id).await?;

    Ok(ApiResponse::ok(webhooks))
}

/// Delete response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub ok: bool,
}

/// Delete a registered webhook endpoint.
async fn delete_webhook(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<DeleteResponse>> {
    state.sso_service.delete_webhook(&user.id, &id).await?;

    Ok(ApiResponse::ok(DeleteResponse { ok: true }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/token", post(token))
        .route("/verify", post(verify))
        .route("/access-link", get(access_link))
        .route("/webhooks", post(register_webhook).get(list_webhooks))
        .route("/webhooks/{id}", axum::routing::delete(delete_webhook))
}
