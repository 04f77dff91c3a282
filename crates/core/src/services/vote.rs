//! Vote service.
//!
//! Applies the toggle/flip/insert contract to posts and comments and
//! publishes the fresh tallies as real-time events.

use founder_common::AppResult;
use founder_db::{
    entities::post_vote::VoteType,
    repositories::{
        CommentRepository, CommentVoteRepository, PostRepository, PostVoteRepository, VoteOutcome,
        VoteTally,
    },
};

use crate::services::event_publisher::EventPublisherService;

/// Result of a vote mutation, returned to the API layer.
#[derive(Debug, Clone, Copy)]
pub struct VoteResult {
    /// What the mutation did.
    pub outcome: VoteOutcome,
    /// Fresh tallies after the recount.
    pub tally: VoteTally,
}

/// Service for post and comment votes.
#[derive(Clone)]
pub struct VoteService {
    post_repo: PostRepository,
    comment_repo: CommentRepository,
    post_vote_repo: PostVoteRepository,
    comment_vote_repo: CommentVoteRepository,
    event_publisher: Option<EventPublisherService>,
}

impl VoteService {
    /// Create a new vote service.
    #[must_use]
    pub const fn new(
        post_repo: PostRepository,
        comment_repo: CommentRepository,
        post_vote_repo: PostVoteRepository,
        comment_vote_repo: CommentVoteRepository,
    ) -> Self {
        Self {
            post_repo,
            comment_repo,
            post_vote_repo,
            comment_vote_repo,
            event_publisher: None,
        }
    }

    /// Set the event publisher.
    pub fn set_event_publisher(&mut self, event_publisher: EventPublisherService) {
        self.event_publisher = Some(event_publisher);
    }

    /// Record a vote on a post.
    ///
    /// Same vote twice toggles it off; an opposite vote flips; otherwise a
    /// new vote is inserted. The post tallies are recomputed from the vote
    /// rows in the same transaction.
    pub async fn vote_on_post(
        &self,
        user_id: &str,
        post_id: &str,
        vote_type: VoteType,
    ) -> AppResult<VoteResult> {
        // 404 before any mutation
        self.post_repo.get_by_id(post_id).await?;

        let (outcome, tally) = self.post_vote_repo.record(user_id, post_id, vote_type).await?;

        if let Some(ref event_publisher) = self.event_publisher {
            if let Err(e) = event_publisher
                .publish_post_vote(post_id, user_id, tally.upvotes, tally.downvotes)
                .await
            {
                tracing::warn!(error = %e, "Failed to publish post vote event");
            }
        }

        Ok(VoteResult { outcome, tally })
    }

    /// Record a vote on a comment.
    pub async fn vote_on_comment(
        &self,
        user_id: &str,
        comment_id: &str,
        vote_type: VoteType,
    ) -> AppResult<VoteResult> {
        let comment = self.comment_repo.get_by_id(comment_id).await?;

        let (outcome, tally) = self
            .comment_vote_repo
            .record(user_id, comment_id, vote_type)
            .await?;

        if let Some(ref event_publisher) = self.event_publisher {
            if let Err(e) = event_publisher
                .publish_comment_vote(
                    comment_id,
                    &comment.post_id,
                    user_id,
                    tally.upvotes,
                    tally.downvotes,
                )
                .await
            {
                tracing::warn!(error = %e, "Failed to publish comment vote event");
            }
        }

        Ok(VoteResult { outcome, tally })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use founder_db::entities::{comment, comment::CommentStatus, post, post_vote};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::Arc;

    fn create_test_post(id: &str) -> post::Model {
        post::Model {
            id: id.to_string(),
            community_id: "c1".to_string(),
            user_id: "author".to_string(),
            title: "Post".to_string(),
            content: None,
            image_url: None,
            upvotes: 0,
            downvotes: 0,
            comments_count: 0,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn count_result(n: i64) -> std::collections::BTreeMap<&'static str, sea_orm::Value> {
        maplit::btreemap! {
            "num_items" => sea_orm::Value::BigInt(Some(n))
        }
    }

    fn service(
        post_db: sea_orm::DatabaseConnection,
        comment_db: sea_orm::DatabaseConnection,
        post_vote_db: sea_orm::DatabaseConnection,
        comment_vote_db: sea_orm::DatabaseConnection,
    ) -> VoteService {
        VoteService::new(
            PostRepository::new(Arc::new(post_db)),
            CommentRepository::new(Arc::new(comment_db)),
            PostVoteRepository::new(Arc::new(post_vote_db)),
            CommentVoteRepository::new(Arc::new(comment_vote_db)),
        )
    }

    #[tokio::test]
    async fn test_vote_on_missing_post_is_not_found() {
        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<post::Model>::new()])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        );

        let result = service.vote_on_post("u1", "missing", VoteType::Upvote).await;
        assert!(matches!(
            result,
            Err(founder_common::AppError::PostNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_vote_on_missing_comment_is_not_found() {
        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<comment::Model>::new()])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        );

        let result = service
            .vote_on_comment("u1", "missing", VoteType::Downvote)
            .await;
        assert!(matches!(
            result,
            Err(founder_common::AppError::CommentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_vote_on_post_returns_recounted_tally() {
        let post = create_test_post("p1");
        let inserted = post_vote::Model {
            id: "v1".to_string(),
            user_id: "u1".to_string(),
            post_id: "p1".to_string(),
            vote_type: VoteType::Upvote,
            created_at: Utc::now().into(),
        };

        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[post]])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres)
                // no prior vote
                .append_query_results([Vec::<post_vote::Model>::new()])
                // insert
                .append_query_results([[inserted]])
                // recount: 1 up, 1 down (another user's downvote exists)
                .append_query_results([[count_result(1)]])
                .append_query_results([[count_result(1)]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        );

        let result = service.vote_on_post("u1", "p1", VoteType::Upvote).await.unwrap();

        assert_eq!(result.outcome, VoteOutcome::Created);
        assert_eq!(result.tally.upvotes, 1);
        assert_eq!(result.tally.downvotes, 1);
    }

    #[tokio::test]
    async fn test_vote_on_comment_publishes_post_id() {
        let comment = comment::Model {
            id: "cm1".to_string(),
            post_id: "p1".to_string(),
            user_id: "author".to_string(),
            parent_id: None,
            content: "text".to_string(),
            status: CommentStatus::Approved,
            ai_prompt: None,
            ai_response: None,
            upvotes: 0,
            downvotes: 0,
            created_at: Utc::now().into(),
            updated_at: None,
        };
        let existing = founder_db::entities::comment_vote::Model {
            id: "v1".to_string(),
            user_id: "u1".to_string(),
            comment_id: "cm1".to_string(),
            vote_type: VoteType::Upvote,
            created_at: Utc::now().into(),
        };

        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[comment]])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres)
                // identical vote exists: toggle off
                .append_query_results([[existing]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .append_query_results([[count_result(0)]])
                .append_query_results([[count_result(0)]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let result = service
            .vote_on_comment("u1", "cm1", VoteType::Upvote)
            .await
            .unwrap();

        assert_eq!(result.outcome, VoteOutcome::Toggled);
        assert_eq!(result.tally.upvotes, 0);
    }
}
