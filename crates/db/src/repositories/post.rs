//! Post repository.

use std::sync::Arc;

use crate::entities::{Comment, Post, comment, post};
use founder_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, sea_query::Expr,
};

/// Feed sort orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostOrder {
    /// Newest first.
    #[default]
    New,
    /// Highest net votes first.
    Top,
    /// Net votes blended with a linear time decay: newer content with equal
    /// votes ranks above older content by a fixed per-second increment.
    Hot,
}

/// Hot score divisor: one net vote is worth 45000 seconds of age.
const HOT_EPOCH_DIVISOR: f64 = 45_000.0;

fn apply_order(query: Select<Post>, order: PostOrder) -> Select<Post> {
    match order {
        PostOrder::New => query.order_by_desc(post::Column::CreatedAt),
        PostOrder::Top => query
            .order_by_desc(Expr::cust("upvotes - downvotes"))
            .order_by_desc(post::Column::CreatedAt),
        PostOrder::Hot => query.order_by_desc(Expr::cust(
            "(upvotes - downvotes) + extract(epoch from created_at) / 45000.0",
        )),
    }
}

/// Post repository for database operations.
#[derive(Clone)]
pub struct PostRepository {
    db: Arc<DatabaseConnection>,
}

impl PostRepository {
    /// Create a new post repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a post by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<post::Model>> {
        Post::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a post by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<post::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::PostNotFound(id.to_string()))
    }

    /// Create a new post.
    pub async fn create(&self, model: post::ActiveModel) -> AppResult<post::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a post.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let post = self.get_by_id(id).await?;
        post.delete(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// List posts across all communities in the given order.
    ///
    /// The hot score is computed in the ORDER BY clause at query time, so the
    /// ranking always reflects the current vote and time state.
    pub async fn find_feed(
        &self,
        order: PostOrder,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<post::Model>> {
        apply_order(Post::find(), order)
            .limit(limit)
            .offset(offset)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List posts in a community in the given order.
    pub async fn find_by_community(
        &self,
        community_id: &str,
        order: PostOrder,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<post::Model>> {
        apply_order(
            Post::find().filter(post::Column::CommunityId.eq(community_id)),
            order,
        )
        .limit(limit)
        .offset(offset)
        .all(self.db.as_ref())
        .await
        .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Search posts by title or content, newest first.
    pub async fn search(
        &self,
        query: &str,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<post::Model>> {
        use sea_orm::Condition;

        let pattern = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));

        Post::find()
            .filter(
                Condition::any()
                    .add(post::Column::Title.like(&pattern))
                    .add(post::Column::Content.like(&pattern)),
            )
            .order_by_desc(post::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Recompute the comment counter from the comment table.
    pub async fn recount_comments(&self, post_id: &str) -> AppResult<i32> {
        let count = Comment::find()
            .filter(comment::Column::PostId.eq(post_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let count = count as i32;
        Post::update_many()
            .col_expr(post::Column::CommentsCount, Expr::value(count))
            .filter(post::Column::Id.eq(post_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(count)
    }

    /// Hot score of a post as computed by the `hot` sort order.
    ///
    /// Exposed for ranking tests; the feed queries evaluate the same formula
    /// in SQL.
    #[must_use]
    pub fn hot_score(upvotes: i32, downvotes: i32, created_at: chrono::DateTime<chrono::Utc>) -> f64 {
        f64::from(upvotes - downvotes) + created_at.timestamp() as f64 / HOT_EPOCH_DIVISOR
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_post(id: &str, community_id: &str) -> post::Model {
        post::Model {
            id: id.to_string(),
            community_id: community_id.to_string(),
            user_id: "u1".to_string(),
            title: "Test post".to_string(),
            content: Some("Body".to_string()),
            image_url: None,
            upvotes: 0,
            downvotes: 0,
            comments_count: 0,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_find_by_id_found() {
        let post = create_test_post("p1", "c1");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[post.clone()]])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let result = repo.find_by_id("p1").await.unwrap();

        assert!(result.is_some());
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<post::Model>::new()])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let result = repo.get_by_id("missing").await;

        match result {
            Err(AppError::PostNotFound(id)) => assert_eq!(id, "missing"),
            _ => panic!("Expected PostNotFound error"),
        }
    }

    #[tokio::test]
    async fn test_find_feed() {
        let p1 = create_test_post("p1", "c1");
        let p2 = create_test_post("p2", "c1");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[p1, p2]])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let result = repo.find_feed(PostOrder::Hot, 25, 0).await.unwrap();

        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_hot_score_equal_votes_ranks_newer_first() {
        let older = Utc::now() - Duration::hours(3);
        let newer = Utc::now();

        let older_score = PostRepository::hot_score(5, 2, older);
        let newer_score = PostRepository::hot_score(5, 2, newer);

        assert!(newer_score > older_score);
    }

    #[test]
    fn test_hot_score_votes_outweigh_small_age_gap() {
        let now = Utc::now();
        // One net vote equals 45000 seconds of age; a 1-hour gap is worth
        // less than a single vote.
        let slightly_older = now - Duration::hours(1);

        let more_votes = PostRepository::hot_score(10, 0, slightly_older);
        let fewer_votes = PostRepository::hot_score(8, 0, now);

        assert!(more_votes > fewer_votes);
    }

    #[test]
    fn test_hot_score_is_monotonic_in_net_votes() {
        let at = Utc::now();

        let low = PostRepository::hot_score(1, 0, at);
        let high = PostRepository::hot_score(2, 0, at);

        assert!(high > low);
    }
}
