//! Event publisher service.
//!
//! Provides an abstraction for publishing real-time events. The actual
//! implementation lives in the API crate (broadcast-backed SSE).

use async_trait::async_trait;
use founder_common::AppResult;
use std::sync::Arc;

/// Trait for publishing real-time events.
///
/// This allows the core services to publish events without directly
/// depending on the streaming implementation.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a new-comment event.
    async fn publish_new_comment(
        &self,
        comment_id: &str,
        post_id: &str,
        user_id: &str,
        parent_id: Option<&str>,
    ) -> AppResult<()>;

    /// Publish a post-vote event with fresh tallies.
    async fn publish_post_vote(
        &self,
        post_id: &str,
        user_id: &str,
        upvotes: i32,
        downvotes: i32,
    ) -> AppResult<()>;

    /// Publish a comment-vote event with fresh tallies.
    async fn publish_comment_vote(
        &self,
        comment_id: &str,
        post_id: &str,
        user_id: &str,
        upvotes: i32,
        downvotes: i32,
    ) -> AppResult<()>;
}

/// A no-op implementation of EventPublisher for testing or when real-time
/// events are disabled.
#[derive(Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish_new_comment(
        &self,
        _comment_id: &str,
        _post_id: &str,
        _user_id: &str,
        _parent_id: Option<&str>,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn publish_post_vote(
        &self,
        _post_id: &str,
        _user_id: &str,
        _upvotes: i32,
        _downvotes: i32,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn publish_comment_vote(
        &self,
        _comment_id: &str,
        _post_id: &str,
        _user_id: &str,
        _upvotes: i32,
        _downvotes: i32,
    ) -> AppResult<()> {
        Ok(())
    }
}

/// Wrapper for boxed EventPublisher trait object.
pub type EventPublisherService = Arc<dyn EventPublisher>;
