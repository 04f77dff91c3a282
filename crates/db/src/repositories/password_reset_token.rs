//! Password reset token repository.

use std::sync::Arc;

use crate::entities::{PasswordResetToken, password_reset_token};
use founder_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    sea_query::Expr,
};

/// Password reset token repository for database operations.
#[derive(Clone)]
pub struct PasswordResetTokenRepository {
    db: Arc<DatabaseConnection>,
}

impl PasswordResetTokenRepository {
    /// Create a new password reset token repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Create a new reset token.
    pub async fn create(
        &self,
        model: password_reset_token::ActiveModel,
    ) -> AppResult<password_reset_token::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find an unused, unexpired token.
    pub async fn find_valid(&self, token: &str) -> AppResult<Option<password_reset_token::Model>> {
        PasswordResetToken::find()
            .filter(password_reset_token::Column::Token.eq(token))
            .filter(password_reset_token::Column::Used.eq(false))
            .filter(password_reset_token::Column::ExpiresAt.gt(chrono::Utc::now()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Mark a token as consumed.
    pub async fn mark_used(&self, id: &str) -> AppResult<()> {
        let token = PasswordResetToken::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::NotFound(format!("Reset token: {id}")))?;

        let mut active: password_reset_token::ActiveModel = token.into();
        active.used = Set(true);
        active
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Invalidate all outstanding tokens for a user.
    pub async fn invalidate_for_user(&self, user_id: &str) -> AppResult<()> {
        PasswordResetToken::update_many()
            .col_expr(password_reset_token::Column::Used, Expr::value(true))
            .filter(password_reset_token::Column::UserId.eq(user_id))
            .filter(password_reset_token::Column::Used.eq(false))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
