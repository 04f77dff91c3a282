//! Comment vote repository.
//!
//! Same toggle/flip/insert contract as post votes, with the recount applied
//! to the comment row.

use std::sync::Arc;

use crate::entities::{Comment, CommentVote, comment, comment_vote, comment_vote::VoteType};
use crate::repositories::post_vote::{VoteOutcome, VoteTally};
use founder_common::{AppError, AppResult, IdGenerator};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait, sea_query::Expr,
};

/// Comment vote repository for database operations.
#[derive(Clone)]
pub struct CommentVoteRepository {
    db: Arc<DatabaseConnection>,
    id_gen: IdGenerator,
}

impl CommentVoteRepository {
    /// Create a new comment vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            id_gen: IdGenerator::new(),
        }
    }

    /// Record a vote and recompute the comment tallies.
    ///
    /// Mutation and recount run in a single transaction.
    pub async fn record(
        &self,
        user_id: &str,
        comment_id: &str,
        vote_type: VoteType,
    ) -> AppResult<(VoteOutcome, VoteTally)> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let existing = CommentVote::find()
            .filter(comment_vote::Column::UserId.eq(user_id))
            .filter(comment_vote::Column::CommentId.eq(comment_id))
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let outcome = match existing {
            Some(vote) if vote.vote_type == vote_type => {
                vote.delete(&txn)
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                VoteOutcome::Toggled
            }
            Some(vote) => {
                let mut active: comment_vote::ActiveModel = vote.into();
                active.vote_type = Set(vote_type);
                active
                    .update(&txn)
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                VoteOutcome::Flipped
            }
            None => {
                let model = comment_vote::ActiveModel {
                    id: Set(self.id_gen.generate()),
                    user_id: Set(user_id.to_string()),
                    comment_id: Set(comment_id.to_string()),
                    vote_type: Set(vote_type),
                    created_at: Set(chrono::Utc::now().into()),
                };
                model
                    .insert(&txn)
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                VoteOutcome::Created
            }
        };

        let tally = Self::recount(&txn, comment_id).await?;

        Comment::update_many()
            .col_expr(comment::Column::Upvotes, Expr::value(tally.upvotes))
            .col_expr(comment::Column::Downvotes, Expr::value(tally.downvotes))
            .filter(comment::Column::Id.eq(comment_id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((outcome, tally))
    }

    async fn recount<C: ConnectionTrait>(conn: &C, comment_id: &str) -> AppResult<VoteTally> {
        let upvotes = CommentVote::find()
            .filter(comment_vote::Column::CommentId.eq(comment_id))
            .filter(comment_vote::Column::VoteType.eq(VoteType::Upvote))
            .count(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let downvotes = CommentVote::find()
            .filter(comment_vote::Column::CommentId.eq(comment_id))
            .filter(comment_vote::Column::VoteType.eq(VoteType::Downvote))
            .count(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(VoteTally {
            upvotes: upvotes as i32,
            downvotes: downvotes as i32,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_vote(
        id: &str,
        user_id: &str,
        comment_id: &str,
        vote_type: VoteType,
    ) -> comment_vote::Model {
        comment_vote::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            comment_id: comment_id.to_string(),
            vote_type,
            created_at: Utc::now().into(),
        }
    }

    fn count_result(n: i64) -> std::collections::BTreeMap<&'static str, sea_orm::Value> {
        maplit::btreemap! {
            "num_items" => sea_orm::Value::BigInt(Some(n))
        }
    }

    #[tokio::test]
    async fn test_record_toggles_off_identical_vote() {
        let existing = create_test_vote("v1", "u1", "cm1", VoteType::Downvote);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
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

        let repo = CommentVoteRepository::new(db);
        let (outcome, tally) = repo.record("u1", "cm1", VoteType::Downvote).await.unwrap();

        assert_eq!(outcome, VoteOutcome::Toggled);
        assert_eq!(tally, VoteTally { upvotes: 0, downvotes: 0 });
    }

    #[tokio::test]
    async fn test_record_inserts_when_no_prior_vote() {
        let inserted = create_test_vote("v1", "u1", "cm1", VoteType::Upvote);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<comment_vote::Model>::new()])
                .append_query_results([[inserted]])
                .append_query_results([[count_result(1)]])
                .append_query_results([[count_result(0)]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = CommentVoteRepository::new(db);
        let (outcome, tally) = repo.record("u1", "cm1", VoteType::Upvote).await.unwrap();

        assert_eq!(outcome, VoteOutcome::Created);
        assert_eq!(tally, VoteTally { upvotes: 1, downvotes: 0 });
    }
}
