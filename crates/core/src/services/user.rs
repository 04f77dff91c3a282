//! User service.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use founder_common::{AppError, AppResult, IdGenerator};
use founder_db::{
    entities::{password_reset_token, user, user::Plan},
    repositories::{PasswordResetTokenRepository, UserRepository},
};
use sea_orm::Set;
use serde::Deserialize;
use validator::Validate;

use crate::services::email::EmailService;

/// Password reset token lifetime.
const RESET_TOKEN_TTL_HOURS: i64 = 1;

/// User service for business logic.
#[derive(Clone)]
pub struct UserService {
    user_repo: UserRepository,
    reset_repo: PasswordResetTokenRepository,
    email: Option<EmailService>,
    id_gen: IdGenerator,
}

/// Input for creating a new user.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserInput {
    #[validate(length(min = 1, max = 100))]
    pub username: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8, max = 128))]
    pub password: String,

    #[validate(length(max = 100))]
    pub display_name: Option<String>,
}

/// Input for updating a profile.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileInput {
    #[validate(length(max = 100))]
    pub display_name: Option<String>,

    #[validate(length(max = 2048))]
    pub bio: Option<String>,

    #[validate(email)]
    pub email: Option<String>,
}

impl UserService {
    /// Create a new user service.
    #[must_use]
    pub const fn new(user_repo: UserRepository, reset_repo: PasswordResetTokenRepository) -> Self {
        Self {
            user_repo,
            reset_repo,
            email: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the email service for account notifications.
    pub fn set_email(&mut self, email: EmailService) {
        self.email = Some(email);
    }

    /// Create a new user account.
    pub async fn create(&self, input: CreateUserInput) -> AppResult<user::Model> {
        input.validate()?;

        if self
            .user_repo
            .find_by_username(&input.username)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("Username already taken".to_string()));
        }

        if self.user_repo.find_by_email(&input.email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let password_hash = hash_password(&input.password)?;
        let user_id = self.id_gen.generate();
        let token = self.id_gen.generate_token();

        let model = user::ActiveModel {
            id: Set(user_id),
            username: Set(input.username),
            email: Set(Some(input.email.clone())),
            password_hash: Set(Some(password_hash)),
            token: Set(Some(token)),
            display_name: Set(input.display_name),
            plan: Set(Plan::Free),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        };

        let user = self.user_repo.create(model).await?;

        if let Some(ref email) = self.email {
            if let Err(e) = email.send_welcome(&input.email, &user.username).await {
                tracing::warn!(error = %e, user_id = %user.id, "Failed to send welcome email");
            }
        }

        Ok(user)
    }

    /// Find a user if missing, or return the existing one, for SSO sign-in.
    ///
    /// SSO accounts carry no password hash; they authenticate only through
    /// verified external tokens.
    pub async fn upsert_sso_user(&self, username: &str, email: Option<&str>) -> AppResult<user::Model> {
        if let Some(email) = email {
            if let Some(user) = self.user_repo.find_by_email(email).await? {
                return Ok(user);
            }
        }

        if let Some(user) = self.user_repo.find_by_username(username).await? {
            return Ok(user);
        }

        let model = user::ActiveModel {
            id: Set(self.id_gen.generate()),
            username: Set(username.to_string()),
            email: Set(email.map(ToString::to_string)),
            password_hash: Set(None),
            token: Set(Some(self.id_gen.generate_token())),
            plan: Set(Plan::Free),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        };

        self.user_repo.create(model).await
    }

    /// Authenticate a user by token.
    pub async fn authenticate_by_token(&self, token: &str) -> AppResult<user::Model> {
        self.user_repo
            .find_by_token(token)
            .await?
            .ok_or(AppError::Unauthorized)
    }

    /// Authenticate a user by username and password.
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<user::Model> {
        let user = self
            .user_repo
            .find_by_username(username)
            .await?
            .ok_or(AppError::Unauthorized)?;

        let password_hash = user.password_hash.clone().ok_or(AppError::Unauthorized)?;
        if !verify_password(password, &password_hash)? {
            return Err(AppError::Unauthorized);
        }

        Ok(user)
    }

    /// Regenerate a user's authentication token.
    pub async fn regenerate_token(&self, user_id: &str) -> AppResult<String> {
        let user = self.user_repo.get_by_id(user_id).await?;
        let new_token = self.id_gen.generate_token();

        let mut active: user::ActiveModel = user.into();
        active.token = Set(Some(new_token.clone()));
        active.updated_at = Set(Some(Utc::now().into()));

        self.user_repo.update(active).await?;

        Ok(new_token)
    }

    /// Update profile fields.
    pub async fn update_profile(
        &self,
        user_id: &str,
        input: UpdateProfileInput,
    ) -> AppResult<user::Model> {
        input.validate()?;

        let user = self.user_repo.get_by_id(user_id).await?;
        let mut active: user::ActiveModel = user.into();

        if let Some(display_name) = input.display_name {
            active.display_name = Set(Some(display_name));
        }
        if let Some(bio) = input.bio {
            active.bio = Set(Some(bio));
        }
        if let Some(email) = input.email {
            if let Some(existing) = self.user_repo.find_by_email(&email).await? {
                if existing.id != user_id {
                    return Err(AppError::Conflict("Email already registered".to_string()));
                }
            }
            active.email = Set(Some(email));
        }
        active.updated_at = Set(Some(Utc::now().into()));

        self.user_repo.update(active).await
    }

    /// Set the avatar URL after an upload.
    pub async fn set_avatar_url(&self, user_id: &str, url: &str) -> AppResult<user::Model> {
        let user = self.user_repo.get_by_id(user_id).await?;
        let mut active: user::ActiveModel = user.into();
        active.avatar_url = Set(Some(url.to_string()));
        active.updated_at = Set(Some(Utc::now().into()));
        self.user_repo.update(active).await
    }

    /// Start a password reset.
    ///
    /// Always succeeds from the caller's perspective so the endpoint does not
    /// leak which addresses exist; a token is only issued (and mailed) when
    /// the address is known.
    pub async fn request_password_reset(&self, email: &str) -> AppResult<()> {
        let Some(user) = self.user_repo.find_by_email(email).await? else {
            return Ok(());
        };

        self.reset_repo.invalidate_for_user(&user.id).await?;

        let token = self.id_gen.generate_token();
        let model = password_reset_token::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(user.id.clone()),
            token: Set(token.clone()),
            expires_at: Set((Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS)).into()),
            used: Set(false),
            created_at: Set(Utc::now().into()),
        };
        self.reset_repo.create(model).await?;

        if let Some(ref email_service) = self.email {
            if let Err(e) = email_service
                .send_password_reset(email, &user.username, &token)
                .await
            {
                tracing::warn!(error = %e, user_id = %user.id, "Failed to send password reset email");
            }
        }

        Ok(())
    }

    /// Complete a password reset with a previously issued token.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AppResult<()> {
        if new_password.len() < 8 || new_password.len() > 128 {
            return Err(AppError::Validation(
                "Password must be between 8 and 128 characters".to_string(),
            ));
        }

        let reset = self
            .reset_repo
            .find_valid(token)
            .await?
            .ok_or_else(|| AppError::BadRequest("Invalid or expired reset token".to_string()))?;

        let user = self.user_repo.get_by_id(&reset.user_id).await?;
        let password_hash = hash_password(new_password)?;

        let mut active: user::ActiveModel = user.into();
        active.password_hash = Set(Some(password_hash));
        // Rotate the bearer token so stolen sessions die with the old password
        active.token = Set(Some(self.id_gen.generate_token()));
        active.updated_at = Set(Some(Utc::now().into()));
        self.user_repo.update(active).await?;

        self.reset_repo.mark_used(&reset.id).await?;

        Ok(())
    }

    /// Delete an account. Posts, comments, votes and memberships cascade.
    pub async fn delete_account(&self, user_id: &str) -> AppResult<()> {
        self.user_repo.delete(user_id).await
    }

    /// Charge one AI prompt against the user's plan.
    ///
    /// Free-plan users are rejected outright; founder-plan users are never
    /// metered; standard-plan users consume quota through a conditional
    /// decrement, so concurrent calls cannot overdraw.
    pub async fn charge_prompt(&self, user: &user::Model) -> AppResult<()> {
        match user.plan {
            Plan::Free => Err(AppError::Forbidden(
                "AI features require a paid plan".to_string(),
            )),
            Plan::Founder => Ok(()),
            Plan::Standard => {
                if self.user_repo.consume_prompt(&user.id).await? {
                    Ok(())
                } else {
                    Err(AppError::QuotaExceeded)
                }
            }
        }
    }
}

/// Hash a password using Argon2.
fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| AppError::Internal(format!("Invalid hash: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::Arc;

    fn create_test_user(id: &str, plan: Plan, remaining_prompts: i32) -> user::Model {
        user::Model {
            id: id.to_string(),
            username: "alice".to_string(),
            email: Some("alice@example.com".to_string()),
            password_hash: None,
            token: Some("token".to_string()),
            display_name: None,
            bio: None,
            avatar_url: None,
            plan,
            remaining_prompts,
            is_premium: false,
            is_active: true,
            payment_status: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            paypal_subscription_id: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn service_with(db: sea_orm::DatabaseConnection) -> UserService {
        let db = Arc::new(db);
        UserService::new(
            UserRepository::new(Arc::clone(&db)),
            PasswordResetTokenRepository::new(db),
        )
    }

    #[test]
    fn test_hash_password() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(hash.starts_with("$argon2"));
    }

    #[test]
    fn test_verify_password_correct() {
        let hash = hash_password("hunter2hunter2").unwrap();
        assert!(verify_password("hunter2hunter2", &hash).unwrap());
    }

    #[test]
    fn test_verify_password_wrong() {
        let hash = hash_password("hunter2hunter2").unwrap();
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[tokio::test]
    async fn test_charge_prompt_free_plan_rejected() {
        let service = service_with(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        );
        let user = create_test_user("u1", Plan::Free, 0);

        let result = service.charge_prompt(&user).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_charge_prompt_founder_plan_unmetered() {
        // No exec results queued: founder plan must not touch the database
        let service = service_with(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        );
        let user = create_test_user("u1", Plan::Founder, 0);

        service.charge_prompt(&user).await.unwrap();
    }

    #[tokio::test]
    async fn test_charge_prompt_standard_consumes_quota() {
        let service = service_with(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );
        let user = create_test_user("u1", Plan::Standard, 5);

        service.charge_prompt(&user).await.unwrap();
    }

    #[tokio::test]
    async fn test_charge_prompt_standard_exhausted() {
        let service = service_with(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );
        let user = create_test_user("u1", Plan::Standard, 0);

        let result = service.charge_prompt(&user).await;
        assert!(matches!(result, Err(AppError::QuotaExceeded)));
    }

    #[tokio::test]
    async fn test_authenticate_unknown_user() {
        let service = service_with(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<user::Model>::new()])
                .into_connection(),
        );

        let result = service.authenticate("ghost", "password123").await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_authenticate_sso_account_has_no_password() {
        // password_hash is NULL for SSO accounts; password login must fail
        let user = create_test_user("u1", Plan::Free, 0);
        let service = service_with(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[user]])
                .into_connection(),
        );

        let result = service.authenticate("alice", "password123").await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_request_password_reset_unknown_email_is_silent() {
        let service = service_with(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<user::Model>::new()])
                .into_connection(),
        );

        service
            .request_password_reset("unknown@example.com")
            .await
            .unwrap();
    }
}
