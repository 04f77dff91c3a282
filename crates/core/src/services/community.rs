//! Community service.

use chrono::Utc;
use founder_common::{AppError, AppResult, IdGenerator};
use founder_db::{
    entities::{community, community::Visibility, community_member, community_member::MemberRole},
    repositories::{CommunityMemberRepository, CommunityRepository},
};
use sea_orm::Set;
use serde::Deserialize;
use validator::Validate;

/// Maximum number of communities a single user may create.
const MAX_COMMUNITIES_PER_CREATOR: u64 = 10;

/// Input for creating a community.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommunityInput {
    /// URL name; unique and immutable after creation.
    #[validate(length(min = 3, max = 100))]
    pub name: String,

    #[validate(length(min = 1, max = 128))]
    pub title: String,

    #[validate(length(max = 2048))]
    pub description: Option<String>,

    #[serde(default = "default_visibility")]
    pub visibility: Visibility,
}

const fn default_visibility() -> Visibility {
    Visibility::Public
}

/// Community names are lowercase alphanumerics and underscores.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Input for updating a community. The name is immutable.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCommunityInput {
    #[validate(length(min = 1, max = 128))]
    pub title: Option<String>,

    #[validate(length(max = 2048))]
    pub description: Option<Option<String>>,

    pub visibility: Option<Visibility>,
}

/// Service for managing communities and memberships.
#[derive(Clone)]
pub struct CommunityService {
    community_repo: CommunityRepository,
    member_repo: CommunityMemberRepository,
    id_gen: IdGenerator,
}

impl CommunityService {
    /// Create a new community service.
    #[must_use]
    pub const fn new(
        community_repo: CommunityRepository,
        member_repo: CommunityMemberRepository,
    ) -> Self {
        Self {
            community_repo,
            member_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Get a community by its unique name.
    pub async fn get_by_name(&self, name: &str) -> AppResult<community::Model> {
        self.community_repo
            .find_by_name(name)
            .await?
            .ok_or_else(|| AppError::CommunityNotFound(name.to_string()))
    }

    /// List communities, optionally filtered by a search query.
    pub async fn list(
        &self,
        query: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<community::Model>> {
        match query {
            Some(q) if !q.trim().is_empty() => self.community_repo.search(q, limit, offset).await,
            _ => self.community_repo.list(limit, offset).await,
        }
    }

    /// Create a community. The creator automatically joins as admin.
    pub async fn create(
        &self,
        creator_id: &str,
        input: CreateCommunityInput,
    ) -> AppResult<community::Model> {
        input.validate()?;

        if !is_valid_name(&input.name) {
            return Err(AppError::Validation(
                "Community names may only contain lowercase letters, digits and underscores"
                    .to_string(),
            ));
        }

        if self.community_repo.find_by_name(&input.name).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Community name already taken: {}",
                input.name
            )));
        }

        let count = self.community_repo.count_by_creator(creator_id).await?;
        if count >= MAX_COMMUNITIES_PER_CREATOR {
            return Err(AppError::Validation(format!(
                "Maximum of {MAX_COMMUNITIES_PER_CREATOR} communities allowed per user"
            )));
        }

        let now = Utc::now();
        let model = community::ActiveModel {
            id: Set(self.id_gen.generate()),
            name: Set(input.name),
            title: Set(input.title),
            description: Set(input.description),
            visibility: Set(input.visibility),
            members_count: Set(1),
            creator_id: Set(creator_id.to_string()),
            created_at: Set(now.into()),
            updated_at: Set(None),
        };

        let community = self.community_repo.create(model).await?;

        let member = community_member::ActiveModel {
            id: Set(self.id_gen.generate()),
            community_id: Set(community.id.clone()),
            user_id: Set(creator_id.to_string()),
            role: Set(MemberRole::Admin),
            created_at: Set(now.into()),
        };
        self.member_repo.create(member).await?;

        Ok(community)
    }

    /// Update a community. Only admins may update.
    pub async fn update(
        &self,
        user_id: &str,
        community_id: &str,
        input: UpdateCommunityInput,
    ) -> AppResult<community::Model> {
        input.validate()?;

        let community = self.community_repo.get_by_id(community_id).await?;
        self.require_role(user_id, community_id, MemberRole::Admin)
            .await?;

        let mut active: community::ActiveModel = community.into();
        if let Some(title) = input.title {
            active.title = Set(title);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(visibility) = input.visibility {
            active.visibility = Set(visibility);
        }
        active.updated_at = Set(Some(Utc::now().into()));

        self.community_repo.update(active).await
    }

    /// Join a community.
    pub async fn join(&self, user_id: &str, community_id: &str) -> AppResult<community_member::Model> {
        let community = self.community_repo.get_by_id(community_id).await?;

        if community.visibility == Visibility::Private {
            return Err(AppError::Forbidden(
                "This community is private".to_string(),
            ));
        }

        if self.member_repo.is_member(user_id, community_id).await? {
            return Err(AppError::Conflict(
                "Already a member of this community".to_string(),
            ));
        }

        let model = community_member::ActiveModel {
            id: Set(self.id_gen.generate()),
            community_id: Set(community_id.to_string()),
            user_id: Set(user_id.to_string()),
            role: Set(MemberRole::Member),
            created_at: Set(Utc::now().into()),
        };

        let member = self.member_repo.create(model).await?;
        self.community_repo
            .increment_members_count(community_id)
            .await?;

        Ok(member)
    }

    /// Leave a community.
    ///
    /// A community must always retain at least one admin; the sole admin
    /// cannot leave.
    pub async fn leave(&self, user_id: &str, community_id: &str) -> AppResult<()> {
        self.community_repo.get_by_id(community_id).await?;

        let member = self
            .member_repo
            .find_by_user_and_community(user_id, community_id)
            .await?
            .ok_or_else(|| AppError::BadRequest("Not a member of this community".to_string()))?;

        if member.role == MemberRole::Admin {
            let admins = self
                .member_repo
                .count_by_role(community_id, MemberRole::Admin)
                .await?;
            if admins <= 1 {
                return Err(AppError::BadRequest(
                    "Cannot leave as the only admin. Promote another member first.".to_string(),
                ));
            }
        }

        self.member_repo.delete(&member.id).await?;
        self.community_repo
            .decrement_members_count(community_id)
            .await?;

        Ok(())
    }

    /// List members of a community.
    pub async fn list_members(
        &self,
        community_id: &str,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<community_member::Model>> {
        self.community_repo.get_by_id(community_id).await?;
        self.member_repo
            .find_by_community(community_id, limit, offset)
            .await
    }

    /// Change a member's role (admin only).
    ///
    /// Demoting the sole admin is rejected for the same reason the sole
    /// admin cannot leave.
    pub async fn update_member_role(
        &self,
        acting_user_id: &str,
        community_id: &str,
        member_user_id: &str,
        role: MemberRole,
    ) -> AppResult<community_member::Model> {
        self.require_role(acting_user_id, community_id, MemberRole::Admin)
            .await?;

        let member = self
            .member_repo
            .find_by_user_and_community(member_user_id, community_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;

        if member.role == MemberRole::Admin && role != MemberRole::Admin {
            let admins = self
                .member_repo
                .count_by_role(community_id, MemberRole::Admin)
                .await?;
            if admins <= 1 {
                return Err(AppError::BadRequest(
                    "Cannot demote the only admin".to_string(),
                ));
            }
        }

        let mut active: community_member::ActiveModel = member.into();
        active.role = Set(role);
        self.member_repo.update(active).await
    }

    /// Require that a user holds at least the given role.
    pub async fn require_role(
        &self,
        user_id: &str,
        community_id: &str,
        role: MemberRole,
    ) -> AppResult<community_member::Model> {
        let member = self
            .member_repo
            .find_by_user_and_community(user_id, community_id)
            .await?
            .ok_or_else(|| AppError::Forbidden("Not a member of this community".to_string()))?;

        let sufficient = match role {
            MemberRole::Member => true,
            MemberRole::Moderator => {
                matches!(member.role, MemberRole::Moderator | MemberRole::Admin)
            }
            MemberRole::Admin => member.role == MemberRole::Admin,
        };

        if sufficient {
            Ok(member)
        } else {
            Err(AppError::Forbidden(
                "Insufficient role in this community".to_string(),
            ))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;

    fn create_test_community(id: &str, name: &str, visibility: Visibility) -> community::Model {
        community::Model {
            id: id.to_string(),
            name: name.to_string(),
            title: name.to_string(),
            description: None,
            visibility,
            members_count: 1,
            creator_id: "u1".to_string(),
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn create_test_member(id: &str, user_id: &str, community_id: &str, role: MemberRole) -> community_member::Model {
        community_member::Model {
            id: id.to_string(),
            community_id: community_id.to_string(),
            user_id: user_id.to_string(),
            role,
            created_at: Utc::now().into(),
        }
    }

    fn service_with(
        community_db: sea_orm::DatabaseConnection,
        member_db: sea_orm::DatabaseConnection,
    ) -> CommunityService {
        CommunityService::new(
            CommunityRepository::new(Arc::new(community_db)),
            CommunityMemberRepository::new(Arc::new(member_db)),
        )
    }

    #[test]
    fn test_is_valid_name() {
        assert!(is_valid_name("rustaceans"));
        assert!(is_valid_name("founder_talk_2"));
        assert!(!is_valid_name("CamelCase"));
        assert!(!is_valid_name("has space"));
        assert!(!is_valid_name(""));
    }

    #[tokio::test]
    async fn test_join_private_community_rejected() {
        let community = create_test_community("c1", "secret", Visibility::Private);

        let service = service_with(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[community]])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        );

        let result = service.join("u2", "c1").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_join_twice_rejected() {
        let community = create_test_community("c1", "rust", Visibility::Public);
        let existing = create_test_member("m1", "u2", "c1", MemberRole::Member);

        let service = service_with(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[community]])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[existing]])
                .into_connection(),
        );

        let result = service.join("u2", "c1").await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_sole_admin_cannot_leave() {
        let community = create_test_community("c1", "rust", Visibility::Public);
        let admin = create_test_member("m1", "u1", "c1", MemberRole::Admin);

        let service = service_with(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[community]])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[admin]])
                // one admin in the community
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(1))
                }]])
                .into_connection(),
        );

        let result = service.leave("u1", "c1").await;
        match result {
            Err(AppError::BadRequest(msg)) => assert!(msg.contains("only admin")),
            other => panic!("Expected BadRequest, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_leave_not_a_member() {
        let community = create_test_community("c1", "rust", Visibility::Public);

        let service = service_with(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[community]])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<community_member::Model>::new()])
                .into_connection(),
        );

        let result = service.leave("u2", "c1").await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_demoting_sole_admin_rejected() {
        let acting_admin = create_test_member("m1", "u1", "c1", MemberRole::Admin);
        let target = create_test_member("m1", "u1", "c1", MemberRole::Admin);

        let service = service_with(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres)
                // role check for the acting user
                .append_query_results([[acting_admin]])
                // the member being demoted
                .append_query_results([[target]])
                // one admin in the community
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(1))
                }]])
                .into_connection(),
        );

        let result = service
            .update_member_role("u1", "c1", "u1", MemberRole::Member)
            .await;

        match result {
            Err(AppError::BadRequest(msg)) => assert!(msg.contains("only admin")),
            other => panic!("Expected BadRequest, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_require_role_admin_rejects_member() {
        let member = create_test_member("m1", "u2", "c1", MemberRole::Member);

        let service = service_with(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[member]])
                .into_connection(),
        );

        let result = service.require_role("u2", "c1", MemberRole::Admin).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
