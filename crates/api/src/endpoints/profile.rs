//! Profile, account and upload endpoints.

use axum::{
    Json, Router,
    extract::{Multipart, State},
    routing::{delete, get, post},
};
use founder_common::{AppError, AppResult, generate_storage_key};
use founder_db::entities::user;
use serde::Serialize;

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Maximum avatar size in bytes.
const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

/// Profile response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub plan: user::Plan,
    pub remaining_prompts: i32,
    pub is_premium: bool,
    pub created_at: String,
}

impl From<user::Model> for ProfileResponse {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            display_name: u.display_name,
            bio: u.bio,
            avatar_url: u.avatar_url,
            plan: u.plan,
            remaining_prompts: u.remaining_prompts,
            is_premium: u.is_premium,
            created_at: u.created_at.to_rfc3339(),
        }
    }
}

/// Get the caller's profile.
async fn get_profile(AuthUser(user): AuthUser) -> AppResult<ApiResponse<ProfileResponse>> {
    Ok(ApiResponse::ok(user.into()))
}

/// Update the caller's profile.
async fn update_profile(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<founder_core::UpdateProfileInput>,
) -> AppResult<ApiResponse<ProfileResponse>> {
    let updated = state.user_service.update_profile(&user.id, req).await?;
    Ok(ApiResponse::ok(updated.into()))
}

/// Delete-account response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAccountResponse {
    pub ok: bool,
}

/// Delete the caller's account. Owned content cascades.
async fn delete_account(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<DeleteAccountResponse>> {
    state.user_service.delete_account(&user.id).await?;
    Ok(ApiResponse::ok(DeleteAccountResponse { ok: true }))
}

/// Avatar upload response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarResponse {
    pub avatar_url: String,
}

/// Upload an avatar via multipart form.
async fn upload_avatar(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<ApiResponse<AvatarResponse>> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();

        if name == "file" || name == "avatar" {
            file_name = field.file_name().map(ToString::to_string);
            content_type = field.content_type().map(ToString::to_string);
            file_data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?
                    .to_vec(),
            );
        }
    }

    let data = file_data.ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;

    if data.len() > MAX_AVATAR_BYTES {
        return Err(AppError::Validation("Avatar exceeds 2 MiB".to_string()));
    }

    let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());
    if !content_type.starts_with("image/") {
        return Err(AppError::Validation("Avatar must be an image".to_string()));
    }

    let key = generate_storage_key(&user.id, file_name.as_deref().unwrap_or("avatar.png"));
    let uploaded = state.storage.upload(&key, &data, &content_type).await?;

    state
        .user_service
        .set_avatar_url(&user.id, &uploaded.url)
        .await?;

    Ok(ApiResponse::ok(AvatarResponse {
        avatar_url: uploaded.url,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile).patch(update_profile))
        .route("/account", delete(delete_account))
        .route("/uploads/avatar", post(upload_avatar))
}
