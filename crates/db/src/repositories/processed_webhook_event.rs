//! Processed webhook event repository.

use std::sync::Arc;

use crate::entities::{ProcessedWebhookEvent, processed_webhook_event};
use founder_common::{AppError, AppResult};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

/// Processed webhook event repository for database operations.
#[derive(Clone)]
pub struct ProcessedWebhookEventRepository {
    db: Arc<DatabaseConnection>,
}

impl ProcessedWebhookEventRepository {
    /// Create a new processed webhook event repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Check if an event has already been processed.
    pub async fn is_processed(&self, event_id: &str) -> AppResult<bool> {
        Ok(ProcessedWebhookEvent::find_by_id(event_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .is_some())
    }

    /// Record an event as processed.
    pub async fn record(&self, event_id: &str, provider: &str) -> AppResult<()> {
        let model = processed_webhook_event::ActiveModel {
            id: Set(event_id.to_string()),
            provider: Set(provider.to_string()),
            processed_at: Set(chrono::Utc::now().into()),
        };

        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_is_processed_true() {
        let event = processed_webhook_event::Model {
            id: "evt_1".to_string(),
            provider: "stripe".to_string(),
            processed_at: Utc::now().into(),
        };

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[event]])
                .into_connection(),
        );

        let repo = ProcessedWebhookEventRepository::new(db);
        assert!(repo.is_processed("evt_1").await.unwrap());
    }

    #[tokio::test]
    async fn test_is_processed_false() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<processed_webhook_event::Model>::new()])
                .into_connection(),
        );

        let repo = ProcessedWebhookEventRepository::new(db);
        assert!(!repo.is_processed("evt_unknown").await.unwrap());
    }
}
