//! Post service.

use chrono::Utc;
use founder_common::{AppError, AppResult, IdGenerator};
use founder_db::{
    entities::{community::Visibility, post},
    repositories::{CommunityMemberRepository, CommunityRepository, PostOrder, PostRepository},
};
use sea_orm::Set;
use serde::Deserialize;
use validator::Validate;

/// Input for creating a post.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostInput {
    #[validate(length(min = 1, max = 300))]
    pub title: String,

    #[validate(length(max = 40_000))]
    pub content: Option<String>,

    #[validate(length(max = 512))]
    pub image_url: Option<String>,
}

/// Service for posts and feeds.
#[derive(Clone)]
pub struct PostService {
    post_repo: PostRepository,
    community_repo: CommunityRepository,
    member_repo: CommunityMemberRepository,
    id_gen: IdGenerator,
}

impl PostService {
    /// Create a new post service.
    #[must_use]
    pub const fn new(
        post_repo: PostRepository,
        community_repo: CommunityRepository,
        member_repo: CommunityMemberRepository,
    ) -> Self {
        Self {
            post_repo,
            community_repo,
            member_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Get a post by ID.
    pub async fn get(&self, id: &str) -> AppResult<post::Model> {
        self.post_repo.get_by_id(id).await
    }

    /// Create a post in a community.
    ///
    /// Restricted and private communities accept posts from members only.
    pub async fn create(
        &self,
        user_id: &str,
        community_id: &str,
        input: CreatePostInput,
    ) -> AppResult<post::Model> {
        input.validate()?;

        let community = self.community_repo.get_by_id(community_id).await?;

        if community.visibility != Visibility::Public
            && !self.member_repo.is_member(user_id, community_id).await?
        {
            return Err(AppError::Forbidden(
                "Only members can post in this community".to_string(),
            ));
        }

        let model = post::ActiveModel {
            id: Set(self.id_gen.generate()),
            community_id: Set(community_id.to_string()),
            user_id: Set(user_id.to_string()),
            title: Set(input.title),
            content: Set(input.content),
            image_url: Set(input.image_url),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        };

        self.post_repo.create(model).await
    }

    /// Global feed in the given order, optionally filtered by a search query.
    pub async fn feed(
        &self,
        order: PostOrder,
        query: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<post::Model>> {
        match query {
            Some(q) if !q.trim().is_empty() => self.post_repo.search(q, limit, offset).await,
            _ => self.post_repo.find_feed(order, limit, offset).await,
        }
    }

    /// Per-community feed in the given order.
    pub async fn community_feed(
        &self,
        community_id: &str,
        order: PostOrder,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<post::Model>> {
        self.community_repo.get_by_id(community_id).await?;
        self.post_repo
            .find_by_community(community_id, order, limit, offset)
            .await
    }

    /// Delete a post (author only).
    pub async fn delete(&self, user_id: &str, post_id: &str) -> AppResult<()> {
        let post = self.post_repo.get_by_id(post_id).await?;

        if post.user_id != user_id {
            return Err(AppError::Forbidden(
                "Only the author can delete this post".to_string(),
            ));
        }

        self.post_repo.delete(post_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use founder_db::entities::{community, community_member};
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;

    fn create_test_community(id: &str, visibility: Visibility) -> community::Model {
        community::Model {
            id: id.to_string(),
            name: "rust".to_string(),
            title: "Rust".to_string(),
            description: None,
            visibility,
            members_count: 1,
            creator_id: "u1".to_string(),
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn service(
        post_db: sea_orm::DatabaseConnection,
        community_db: sea_orm::DatabaseConnection,
        member_db: sea_orm::DatabaseConnection,
    ) -> PostService {
        PostService::new(
            PostRepository::new(Arc::new(post_db)),
            CommunityRepository::new(Arc::new(community_db)),
            CommunityMemberRepository::new(Arc::new(member_db)),
        )
    }

    #[tokio::test]
    async fn test_create_in_missing_community_fails() {
        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<community::Model>::new()])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        );

        let result = service
            .create(
                "u1",
                "missing",
                CreatePostInput {
                    title: "Title".to_string(),
                    content: None,
                    image_url: None,
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::CommunityNotFound(_))));
    }

    #[tokio::test]
    async fn test_create_in_restricted_community_requires_membership() {
        let community = create_test_community("c1", Visibility::Restricted);

        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[community]])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<community_member::Model>::new()])
                .into_connection(),
        );

        let result = service
            .create(
                "outsider",
                "c1",
                CreatePostInput {
                    title: "Title".to_string(),
                    content: None,
                    image_url: None,
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_delete_requires_author() {
        let post = post::Model {
            id: "p1".to_string(),
            community_id: "c1".to_string(),
            user_id: "author".to_string(),
            title: "Title".to_string(),
            content: None,
            image_url: None,
            upvotes: 0,
            downvotes: 0,
            comments_count: 0,
            created_at: Utc::now().into(),
            updated_at: None,
        };

        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[post]])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        );

        let result = service.delete("intruder", "p1").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
