//! External webhook repository.

use std::sync::Arc;

use crate::entities::{ExternalWebhook, external_webhook};
use founder_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

/// Maximum number of external webhooks per user.
pub const MAX_WEBHOOKS_PER_USER: u64 = 10;

/// External webhook repository for database operations.
#[derive(Clone)]
pub struct ExternalWebhookRepository {
    db: Arc<DatabaseConnection>,
}

impl ExternalWebhookRepository {
    /// Create a new external webhook repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a webhook by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<external_webhook::Model>> {
        ExternalWebhook::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a webhook by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<external_webhook::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Webhook: {id}")))
    }

    /// Find all webhooks registered by a user.
    pub async fn find_by_user_id(&self, user_id: &str) -> AppResult<Vec<external_webhook::Model>> {
        ExternalWebhook::find()
            .filter(external_webhook::Column::UserId.eq(user_id))
            .order_by_desc(external_webhook::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find all active webhooks for a user subscribed to an event.
    pub async fn find_active_by_user_and_event(
        &self,
        user_id: &str,
        event: &str,
    ) -> AppResult<Vec<external_webhook::Model>> {
        // JSON array membership is filtered in code
        let webhooks = ExternalWebhook::find()
            .filter(external_webhook::Column::UserId.eq(user_id))
            .filter(external_webhook::Column::IsActive.eq(true))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(webhooks
            .into_iter()
            .filter(|w| {
                let events: Vec<String> =
                    serde_json::from_value(w.events.clone()).unwrap_or_default();
                events.contains(&event.to_string())
            })
            .collect())
    }

    /// Count webhooks registered by a user.
    pub async fn count_by_user_id(&self, user_id: &str) -> AppResult<u64> {
        ExternalWebhook::find()
            .filter(external_webhook::Column::UserId.eq(user_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new webhook.
    pub async fn create(
        &self,
        model: external_webhook::ActiveModel,
    ) -> AppResult<external_webhook::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a webhook.
    pub async fn update(
        &self,
        model: external_webhook::ActiveModel,
    ) -> AppResult<external_webhook::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a webhook owned by a user.
    pub async fn delete(&self, id: &str, user_id: &str) -> AppResult<()> {
        let webhook = self.get_by_id(id).await?;

        if webhook.user_id != user_id {
            return Err(AppError::Forbidden(
                "You can only delete your own webhooks".to_string(),
            ));
        }

        ExternalWebhook::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Record a successful delivery.
    pub async fn record_success(&self, id: &str) -> AppResult<()> {
        let webhook = self.get_by_id(id).await?;
        let mut active: external_webhook::ActiveModel = webhook.into();

        active.last_triggered_at = Set(Some(chrono::Utc::now().into()));
        active.failure_count = Set(0);
        active.last_error = Set(None);

        active
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Record a failed delivery.
    pub async fn record_failure(&self, id: &str, error: &str) -> AppResult<()> {
        let webhook = self.get_by_id(id).await?;
        let failure_count = webhook.failure_count + 1;
        let mut active: external_webhook::ActiveModel = webhook.into();

        active.failure_count = Set(failure_count);
        active.last_error = Set(Some(error.to_string()));

        active
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Disable a webhook.
    pub async fn disable(&self, id: &str) -> AppResult<()> {
        let webhook = self.get_by_id(id).await?;
        let mut active: external_webhook::ActiveModel = webhook.into();

        active.is_active = Set(false);

        active
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
