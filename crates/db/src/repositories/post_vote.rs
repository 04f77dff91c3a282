//! Post vote repository.
//!
//! Implements the toggle/flip/insert vote contract. Tallies on the post row
//! are not incremented; they are recomputed from the vote table inside the
//! same transaction as the mutation, so they always equal the underlying
//! vote rows.

use std::sync::Arc;

use crate::entities::{Post, PostVote, post, post_vote, post_vote::VoteType};
use founder_common::{AppError, AppResult, IdGenerator};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait, sea_query::Expr,
};

/// What a vote mutation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// No prior vote existed; a new one was inserted.
    Created,
    /// An identical vote existed and was removed.
    Toggled,
    /// An opposite vote existed and its type was flipped.
    Flipped,
}

/// Fresh tallies after a vote mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTally {
    /// Upvote count.
    pub upvotes: i32,
    /// Downvote count.
    pub downvotes: i32,
}

/// Post vote repository for database operations.
#[derive(Clone)]
pub struct PostVoteRepository {
    db: Arc<DatabaseConnection>,
    id_gen: IdGenerator,
}

impl PostVoteRepository {
    /// Create a new post vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            id_gen: IdGenerator::new(),
        }
    }

    /// Record a vote and recompute the post tallies.
    ///
    /// - identical existing vote: removed (toggle off)
    /// - opposite existing vote: flipped in place
    /// - no existing vote: inserted
    ///
    /// Mutation and recount run in a single transaction.
    pub async fn record(
        &self,
        user_id: &str,
        post_id: &str,
        vote_type: VoteType,
    ) -> AppResult<(VoteOutcome, VoteTally)> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let existing = PostVote::find()
            .filter(post_vote::Column::UserId.eq(user_id))
            .filter(post_vote::Column::PostId.eq(post_id))
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
                let mut active: post_vote::ActiveModel = vote.into();
                active.vote_type = Set(vote_type);
                active
                    .update(&txn)
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                VoteOutcome::Flipped
            }
            None => {
                let model = post_vote::ActiveModel {
                    id: Set(self.id_gen.generate()),
                    user_id: Set(user_id.to_string()),
                    post_id: Set(post_id.to_string()),
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

        let tally = Self::recount(&txn, post_id).await?;

        Post::update_many()
            .col_expr(post::Column::Upvotes, Expr::value(tally.upvotes))
            .col_expr(post::Column::Downvotes, Expr::value(tally.downvotes))
            .filter(post::Column::Id.eq(post_id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((outcome, tally))
    }

    async fn recount<C: ConnectionTrait>(conn: &C, post_id: &str) -> AppResult<VoteTally> {
        let upvotes = PostVote::find()
            .filter(post_vote::Column::PostId.eq(post_id))
            .filter(post_vote::Column::VoteType.eq(VoteType::Upvote))
            .count(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let downvotes = PostVote::find()
            .filter(post_vote::Column::PostId.eq(post_id))
            .filter(post_vote::Column::VoteType.eq(VoteType::Downvote))
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

    fn create_test_vote(id: &str, user_id: &str, post_id: &str, vote_type: VoteType) -> post_vote::Model {
        post_vote::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            post_id: post_id.to_string(),
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
    async fn test_record_inserts_when_no_prior_vote() {
        let inserted = create_test_vote("v1", "u1", "p1", VoteType::Upvote);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                // no existing vote
                .append_query_results([Vec::<post_vote::Model>::new()])
                // insert returns the new row
                .append_query_results([[inserted]])
                // recount: 1 upvote, 0 downvotes
                .append_query_results([[count_result(1)]])
                .append_query_results([[count_result(0)]])
                // tally write
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = PostVoteRepository::new(db);
        let (outcome, tally) = repo.record("u1", "p1", VoteType::Upvote).await.unwrap();

        assert_eq!(outcome, VoteOutcome::Created);
        assert_eq!(tally, VoteTally { upvotes: 1, downvotes: 0 });
    }

    #[tokio::test]
    async fn test_vote_scenario_toggle_then_mixed_votes() {
        // A upvotes (1,0) -> A upvotes again, toggling off (0,0) ->
        // B downvotes (0,1) -> A upvotes (1,1)
        let a_up_1 = create_test_vote("v1", "a", "p1", VoteType::Upvote);
        let b_down = create_test_vote("v2", "b", "p1", VoteType::Downvote);
        let a_up_2 = create_test_vote("v3", "a", "p1", VoteType::Upvote);

        let ok_exec = MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        };

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                // step 1: A upvotes
                .append_query_results([Vec::<post_vote::Model>::new()])
                .append_query_results([[a_up_1.clone()]])
                .append_query_results([[count_result(1)]])
                .append_query_results([[count_result(0)]])
                // step 2: A upvotes again (toggle off)
                .append_query_results([[a_up_1]])
                .append_query_results([[count_result(0)]])
                .append_query_results([[count_result(0)]])
                // step 3: B downvotes
                .append_query_results([Vec::<post_vote::Model>::new()])
                .append_query_results([[b_down]])
                .append_query_results([[count_result(0)]])
                .append_query_results([[count_result(1)]])
                // step 4: A upvotes
                .append_query_results([Vec::<post_vote::Model>::new()])
                .append_query_results([[a_up_2]])
                .append_query_results([[count_result(1)]])
                .append_query_results([[count_result(1)]])
                // tally writes for steps 1-4 plus the step-2 delete
                .append_exec_results([ok_exec.clone(), ok_exec.clone(), ok_exec.clone(), ok_exec.clone(), ok_exec])
                .into_connection(),
        );

        let repo = PostVoteRepository::new(db);

        let (outcome, tally) = repo.record("a", "p1", VoteType::Upvote).await.unwrap();
        assert_eq!(outcome, VoteOutcome::Created);
        assert_eq!(tally, VoteTally { upvotes: 1, downvotes: 0 });

        let (outcome, tally) = repo.record("a", "p1", VoteType::Upvote).await.unwrap();
        assert_eq!(outcome, VoteOutcome::Toggled);
        assert_eq!(tally, VoteTally { upvotes: 0, downvotes: 0 });

        let (outcome, tally) = repo.record("b", "p1", VoteType::Downvote).await.unwrap();
        assert_eq!(outcome, VoteOutcome::Created);
        assert_eq!(tally, VoteTally { upvotes: 0, downvotes: 1 });

        let (outcome, tally) = repo.record("a", "p1", VoteType::Upvote).await.unwrap();
        assert_eq!(outcome, VoteOutcome::Created);
        assert_eq!(tally, VoteTally { upvotes: 1, downvotes: 1 });
    }

    #[tokio::test]
    async fn test_record_toggles_off_identical_vote() {
        let existing = create_test_vote("v1", "u1", "p1", VoteType::Upvote);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[existing]])
                // delete
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                // recount: no votes remain
                .append_query_results([[count_result(0)]])
                .append_query_results([[count_result(0)]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = PostVoteRepository::new(db);
        let (outcome, tally) = repo.record("u1", "p1", VoteType::Upvote).await.unwrap();

        assert_eq!(outcome, VoteOutcome::Toggled);
        assert_eq!(tally, VoteTally { upvotes: 0, downvotes: 0 });
    }

    #[tokio::test]
    async fn test_record_flips_opposite_vote() {
        let existing = create_test_vote("v1", "u1", "p1", VoteType::Downvote);
        let flipped = create_test_vote("v1", "u1", "p1", VoteType::Upvote);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[existing]])
                // update returns the flipped row
                .append_query_results([[flipped]])
                // recount: 1 upvote, 0 downvotes
                .append_query_results([[count_result(1)]])
                .append_query_results([[count_result(0)]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = PostVoteRepository::new(db);
        let (outcome, tally) = repo.record("u1", "p1", VoteType::Upvote).await.unwrap();

        assert_eq!(outcome, VoteOutcome::Flipped);
        assert_eq!(tally, VoteTally { upvotes: 1, downvotes: 0 });
    }
}
