//! Community membership repository.

use std::sync::Arc;

use crate::entities::{CommunityMember, community_member, community_member::MemberRole};
use founder_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};

/// Community membership repository for database operations.
#[derive(Clone)]
pub struct CommunityMemberRepository {
    db: Arc<DatabaseConnection>,
}

impl CommunityMemberRepository {
    /// Create a new community membership repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a membership by user and community.
    pub async fn find_by_user_and_community(
        &self,
        user_id: &str,
        community_id: &str,
    ) -> AppResult<Option<community_member::Model>> {
        CommunityMember::find()
            .filter(community_member::Column::UserId.eq(user_id))
            .filter(community_member::Column::CommunityId.eq(community_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Check if a user is a member of a community.
    pub async fn is_member(&self, user_id: &str, community_id: &str) -> AppResult<bool> {
        Ok(self
            .find_by_user_and_community(user_id, community_id)
            .await?
            .is_some())
    }

    /// Create a new membership.
    pub async fn create(
        &self,
        model: community_member::ActiveModel,
    ) -> AppResult<community_member::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a membership (role changes).
    pub async fn update(
        &self,
        model: community_member::ActiveModel,
    ) -> AppResult<community_member::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a membership.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let member = CommunityMember::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        if let Some(m) = member {
            m.delete(self.db.as_ref())
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }
        Ok(())
    }

    /// List members of a community (paginated).
    pub async fn find_by_community(
        &self,
        community_id: &str,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<community_member::Model>> {
        CommunityMember::find()
            .filter(community_member::Column::CommunityId.eq(community_id))
            .order_by_asc(community_member::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count members of a community holding a given role.
    pub async fn count_by_role(&self, community_id: &str, role: MemberRole) -> AppResult<u64> {
        CommunityMember::find()
            .filter(community_member::Column::CommunityId.eq(community_id))
            .filter(community_member::Column::Role.eq(role))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
