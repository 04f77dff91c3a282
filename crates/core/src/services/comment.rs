//! Comment service.
//!
//! Comment creation runs the moderation call inline before persistence; the
//! submission is always stored, with status decided by the verdict (or the
//! fail-open fallback).

use chrono::Utc;
use founder_common::{AppError, AppResult, IdGenerator};
use founder_db::{
    entities::{comment, comment::CommentStatus, user},
    repositories::{CommentRepository, PostRepository},
};
use sea_orm::Set;
use serde::Deserialize;
use validator::Validate;

use crate::services::event_publisher::EventPublisherService;
use crate::services::moderation::{ModerationService, ProcessFlow};
use crate::services::user::UserService;

/// Input for creating a comment.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentInput {
    #[validate(length(min = 1, max = 10_000))]
    pub content: String,

    /// Parent comment for a one-level reply.
    pub parent_id: Option<String>,
}

/// A comment with its one-level replies.
#[derive(Debug)]
pub struct CommentWithReplies {
    /// The top-level comment.
    pub comment: comment::Model,
    /// Direct replies, oldest first.
    pub replies: Vec<comment::Model>,
}

/// Service for comments and their AI-assisted lifecycle.
#[derive(Clone)]
pub struct CommentService {
    comment_repo: CommentRepository,
    post_repo: PostRepository,
    moderation: ModerationService,
    users: UserService,
    event_publisher: Option<EventPublisherService>,
    id_gen: IdGenerator,
}

impl CommentService {
    /// Create a new comment service.
    #[must_use]
    pub const fn new(
        comment_repo: CommentRepository,
        post_repo: PostRepository,
        moderation: ModerationService,
        users: UserService,
    ) -> Self {
        Self {
            comment_repo,
            post_repo,
            moderation,
            users,
            event_publisher: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the event publisher.
    pub fn set_event_publisher(&mut self, event_publisher: EventPublisherService) {
        self.event_publisher = Some(event_publisher);
    }

    /// Get a comment by ID.
    pub async fn get(&self, id: &str) -> AppResult<comment::Model> {
        self.comment_repo.get_by_id(id).await
    }

    /// Create a comment on a post, moderated inline.
    ///
    /// The comment text and the post title go to the moderation model; the
    /// verdict decides `approved` vs `pending` and supplies a follow-up
    /// question. Provider failures fail open: the comment is persisted as
    /// approved with a fallback prompt.
    pub async fn create(
        &self,
        user_id: &str,
        post_id: &str,
        input: CreateCommentInput,
    ) -> AppResult<comment::Model> {
        input.validate()?;

        let post = self.post_repo.get_by_id(post_id).await?;

        // Replies attach one level deep only: replying to a reply flattens
        // onto the original parent.
        let parent_id = match input.parent_id {
            Some(ref pid) => {
                let parent = self.comment_repo.get_by_id(pid).await?;
                if parent.post_id != post_id {
                    return Err(AppError::BadRequest(
                        "Parent comment belongs to a different post".to_string(),
                    ));
                }
                Some(parent.parent_id.unwrap_or(parent.id))
            }
            None => None,
        };

        let verdict = self
            .moderation
            .review_comment(&input.content, &post.title)
            .await;

        let status = if verdict.is_approved {
            CommentStatus::Approved
        } else {
            CommentStatus::Pending
        };

        let model = comment::ActiveModel {
            id: Set(self.id_gen.generate()),
            post_id: Set(post_id.to_string()),
            user_id: Set(user_id.to_string()),
            parent_id: Set(parent_id.clone()),
            content: Set(input.content),
            status: Set(status),
            ai_prompt: Set(verdict.prompt_text()),
            ai_response: Set(None),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        };

        let created = self.comment_repo.create(model).await?;

        self.post_repo.recount_comments(post_id).await?;

        if let Some(ref event_publisher) = self.event_publisher {
            if let Err(e) = event_publisher
                .publish_new_comment(&created.id, post_id, user_id, parent_id.as_deref())
                .await
            {
                tracing::warn!(error = %e, "Failed to publish new comment event");
            }
        }

        Ok(created)
    }

    /// List top-level comments on a post with their one-level replies.
    pub async fn list_for_post(
        &self,
        post_id: &str,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<CommentWithReplies>> {
        self.post_repo.get_by_id(post_id).await?;

        let top_level = self
            .comment_repo
            .find_top_level_by_post(post_id, limit, offset)
            .await?;

        let mut result = Vec::with_capacity(top_level.len());
        for comment in top_level {
            let replies = self.comment_repo.find_replies(&comment.id, 100).await?;
            result.push(CommentWithReplies { comment, replies });
        }

        Ok(result)
    }

    /// Apply the author's answer to the moderation follow-up question.
    ///
    /// The original content plus the response are re-submitted to the model,
    /// which returns the merged final text and an approval flag; the row is
    /// updated in place.
    pub async fn respond_to_ai(
        &self,
        user_id: &str,
        comment_id: &str,
        response: &str,
    ) -> AppResult<comment::Model> {
        if response.trim().is_empty() {
            return Err(AppError::Validation("Response must not be empty".to_string()));
        }

        let comment = self.comment_repo.get_by_id(comment_id).await?;

        if comment.user_id != user_id {
            return Err(AppError::Forbidden(
                "Only the author can respond to the follow-up".to_string(),
            ));
        }

        let follow_up = comment.ai_prompt.clone().ok_or_else(|| {
            AppError::BadRequest("This comment has no pending follow-up question".to_string())
        })?;

        let merged = self
            .moderation
            .merge_response(&comment.content, &follow_up, response)
            .await;

        let status = if merged.is_approved {
            CommentStatus::Approved
        } else {
            CommentStatus::Pending
        };

        let mut active: comment::ActiveModel = comment.into();
        active.content = Set(merged.content);
        active.ai_response = Set(Some(response.to_string()));
        active.status = Set(status);
        active.updated_at = Set(Some(Utc::now().into()));

        self.comment_repo.update(active).await
    }

    /// Rewrite a comment for clarity (premium-gated).
    ///
    /// Moderation status is unchanged. Standard-plan users pay one prompt
    /// unit; founder-plan users are unmetered.
    pub async fn enhance(
        &self,
        user: &user::Model,
        comment_id: &str,
    ) -> AppResult<comment::Model> {
        let comment = self.comment_repo.get_by_id(comment_id).await?;

        if comment.user_id != user.id {
            return Err(AppError::Forbidden(
                "Only the author can enhance their comment".to_string(),
            ));
        }

        self.users.charge_prompt(user).await?;

        let enhanced = self.moderation.enhance_comment(&comment.content).await;

        let mut active: comment::ActiveModel = comment.into();
        active.content = Set(enhanced);
        active.updated_at = Set(Some(Utc::now().into()));

        self.comment_repo.update(active).await
    }

    /// Generate process-flow suggestions from a comment (premium-gated) and
    /// flip its status to `ai_processed`.
    pub async fn generate_process_flows(
        &self,
        user: &user::Model,
        comment_id: &str,
    ) -> AppResult<Vec<ProcessFlow>> {
        let comment = self.comment_repo.get_by_id(comment_id).await?;

        if comment.user_id != user.id {
            return Err(AppError::Forbidden(
                "Only the author can generate process flows".to_string(),
            ));
        }

        self.users.charge_prompt(user).await?;

        let flows = self
            .moderation
            .generate_process_flows(&comment.content)
            .await?;

        let mut active: comment::ActiveModel = comment.into();
        active.status = Set(CommentStatus::AiProcessed);
        active.updated_at = Set(Some(Utc::now().into()));
        self.comment_repo.update(active).await?;

        Ok(flows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::user::UserService;
    use founder_common::config::ModerationConfig;
    use founder_db::entities::{post, user::Plan};
    use founder_db::repositories::{PasswordResetTokenRepository, UserRepository};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::Arc;

    fn create_test_post(id: &str) -> post::Model {
        post::Model {
            id: id.to_string(),
            community_id: "c1".to_string(),
            user_id: "u1".to_string(),
            title: "Launch plan".to_string(),
            content: None,
            image_url: None,
            upvotes: 0,
            downvotes: 0,
            comments_count: 0,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn create_test_comment(id: &str, user_id: &str, status: CommentStatus) -> comment::Model {
        comment::Model {
            id: id.to_string(),
            post_id: "p1".to_string(),
            user_id: user_id.to_string(),
            parent_id: None,
            content: "A comment".to_string(),
            status,
            ai_prompt: Some("Why?".to_string()),
            ai_response: None,
            upvotes: 0,
            downvotes: 0,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn create_test_user(id: &str, plan: Plan) -> user::Model {
        user::Model {
            id: id.to_string(),
            username: "alice".to_string(),
            email: None,
            password_hash: None,
            token: None,
            display_name: None,
            bio: None,
            avatar_url: None,
            plan,
            remaining_prompts: 0,
            is_premium: true,
            is_active: true,
            payment_status: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            paypal_subscription_id: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn service(
        comment_db: sea_orm::DatabaseConnection,
        post_db: sea_orm::DatabaseConnection,
        user_db: sea_orm::DatabaseConnection,
    ) -> CommentService {
        let user_db = Arc::new(user_db);
        CommentService::new(
            CommentRepository::new(Arc::new(comment_db)),
            PostRepository::new(Arc::new(post_db)),
            ModerationService::new(ModerationConfig::default()),
            UserService::new(
                UserRepository::new(Arc::clone(&user_db)),
                PasswordResetTokenRepository::new(user_db),
            ),
        )
    }

    #[tokio::test]
    async fn test_create_on_missing_post_fails() {
        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<post::Model>::new()])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        );

        let result = service
            .create(
                "u1",
                "missing",
                CreateCommentInput {
                    content: "Hello".to_string(),
                    parent_id: None,
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::PostNotFound(_))));
    }

    #[tokio::test]
    async fn test_create_persists_despite_moderation_failure() {
        // The unconfigured moderation provider always fails; the comment must
        // still be persisted as approved with the fallback prompt.
        let post = create_test_post("p1");
        let stored = comment::Model {
            status: CommentStatus::Approved,
            ai_prompt: Some(ModerationService::fallback_prompt().to_string()),
            ..create_test_comment("cm1", "u1", CommentStatus::Approved)
        };

        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres)
                // insert returns the stored comment
                .append_query_results([[stored]])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[post]])
                // comment recount
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(1))
                }]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        );

        let created = service
            .create(
                "u1",
                "p1",
                CreateCommentInput {
                    content: "Hello".to_string(),
                    parent_id: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(created.status, CommentStatus::Approved);
        assert_eq!(
            created.ai_prompt.as_deref(),
            Some(ModerationService::fallback_prompt())
        );
    }

    #[tokio::test]
    async fn test_respond_to_ai_requires_author() {
        let comment = create_test_comment("cm1", "u1", CommentStatus::Approved);

        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[comment]])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        );

        let result = service.respond_to_ai("intruder", "cm1", "An answer").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_respond_to_ai_requires_follow_up() {
        let comment = comment::Model {
            ai_prompt: None,
            ..create_test_comment("cm1", "u1", CommentStatus::Approved)
        };

        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[comment]])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        );

        let result = service.respond_to_ai("u1", "cm1", "An answer").await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_enhance_requires_author() {
        let comment = create_test_comment("cm1", "u1", CommentStatus::Approved);
        let user = create_test_user("intruder", Plan::Founder);

        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[comment]])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        );

        let result = service.enhance(&user, "cm1").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_enhance_blocked_for_free_plan() {
        let comment = create_test_comment("cm1", "u1", CommentStatus::Approved);
        let user = create_test_user("u1", Plan::Free);

        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[comment]])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        );

        let result = service.enhance(&user, "cm1").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_process_flows_blocked_when_quota_exhausted() {
        let comment = create_test_comment("cm1", "u1", CommentStatus::Approved);
        let user = create_test_user("u1", Plan::Standard);

        let service = service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[comment]])
                .into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockDatabase::new(DatabaseBackend::Postgres)
                // conditional decrement matches no rows
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );

        let result = service.generate_process_flows(&user, "cm1").await;
        assert!(matches!(result, Err(AppError::QuotaExceeded)));
    }
}
