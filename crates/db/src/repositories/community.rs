//! Community repository.

use std::sync::Arc;

use crate::entities::{Community, community};
use founder_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, sea_query::Expr,
};

/// Community repository for database operations.
#[derive(Clone)]
pub struct CommunityRepository {
    db: Arc<DatabaseConnection>,
}

impl CommunityRepository {
    /// Create a new community repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a community by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<community::Model>> {
        Community::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a community by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<community::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::CommunityNotFound(id.to_string()))
    }

    /// Find a community by its unique name.
    pub async fn find_by_name(&self, name: &str) -> AppResult<Option<community::Model>> {
        Community::find()
            .filter(community::Column::Name.eq(name))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List communities, largest first.
    pub async fn list(&self, limit: u64, offset: u64) -> AppResult<Vec<community::Model>> {
        Community::find()
            .order_by_desc(community::Column::MembersCount)
            .limit(limit)
            .offset(offset)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Search communities by name or title.
    pub async fn search(
        &self,
        query: &str,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<community::Model>> {
        use sea_orm::Condition;

        let pattern = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));

        Community::find()
            .filter(
                Condition::any()
                    .add(community::Column::Name.like(&pattern))
                    .add(community::Column::Title.like(&pattern)),
            )
            .order_by_desc(community::Column::MembersCount)
            .limit(limit)
            .offset(offset)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new community.
    pub async fn create(&self, model: community::ActiveModel) -> AppResult<community::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a community.
    pub async fn update(&self, model: community::ActiveModel) -> AppResult<community::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count communities created by a user.
    pub async fn count_by_creator(&self, user_id: &str) -> AppResult<u64> {
        Community::find()
            .filter(community::Column::CreatorId.eq(user_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Increment member count atomically (single UPDATE query, no fetch).
    pub async fn increment_members_count(&self, community_id: &str) -> AppResult<()> {
        Community::update_many()
            .col_expr(
                community::Column::MembersCount,
                Expr::col(community::Column::MembersCount).add(1),
            )
            .filter(community::Column::Id.eq(community_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Decrement member count atomically (single UPDATE query, no fetch).
    pub async fn decrement_members_count(&self, community_id: &str) -> AppResult<()> {
        Community::update_many()
            .col_expr(
                community::Column::MembersCount,
                Expr::cust("GREATEST(members_count - 1, 0)"),
            )
            .filter(community::Column::Id.eq(community_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::community::Visibility;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_community(id: &str, name: &str) -> community::Model {
        community::Model {
            id: id.to_string(),
            name: name.to_string(),
            title: name.to_string(),
            description: None,
            visibility: Visibility::Public,
            members_count: 1,
            creator_id: "u1".to_string(),
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_find_by_name_found() {
        let community = create_test_community("c1", "rustaceans");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[community.clone()]])
                .into_connection(),
        );

        let repo = CommunityRepository::new(db);
        let result = repo.find_by_name("rustaceans").await.unwrap();

        assert!(result.is_some());
        assert_eq!(result.unwrap().id, "c1");
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<community::Model>::new()])
                .into_connection(),
        );

        let repo = CommunityRepository::new(db);
        let result = repo.get_by_id("missing").await;

        match result {
            Err(AppError::CommunityNotFound(id)) => assert_eq!(id, "missing"),
            _ => panic!("Expected CommunityNotFound error"),
        }
    }

    #[tokio::test]
    async fn test_list() {
        let c1 = create_test_community("c1", "one");
        let c2 = create_test_community("c2", "two");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[c1, c2]])
                .into_connection(),
        );

        let repo = CommunityRepository::new(db);
        let result = repo.list(10, 0).await.unwrap();

        assert_eq!(result.len(), 2);
    }
}
