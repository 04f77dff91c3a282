//! Server-Sent Events (SSE) for real-time updates.
//!
//! The client patches its local cache from `new-comment`, `post-vote` and
//! `comment-vote` events instead of refetching.

#![allow(missing_docs)]

use std::convert::Infallible;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use founder_common::AppResult;
use founder_core::EventPublisher;
use futures::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::middleware::AppState;

/// SSE event types.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SseEvent {
    /// A comment was created.
    NewComment {
        id: String,
        post_id: String,
        user_id: String,
        parent_id: Option<String>,
    },
    /// Post tallies changed.
    PostVote {
        post_id: String,
        user_id: String,
        upvotes: i32,
        downvotes: i32,
    },
    /// Comment tallies changed.
    CommentVote {
        comment_id: String,
        post_id: String,
        user_id: String,
        upvotes: i32,
        downvotes: i32,
    },
    /// Connection established.
    Connected,
}

/// SSE broadcast channel.
#[derive(Clone)]
pub struct SseBroadcaster {
    /// Feed events (comments and votes).
    pub feed: broadcast::Sender<SseEvent>,
}

impl SseBroadcaster {
    /// Create a new SSE broadcaster.
    #[must_use]
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(1000);
        Self { feed }
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: SseEvent) {
        let _ = self.feed.send(event);
    }
}

impl Default for SseBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// EventPublisher implementation over the broadcast channel.
#[derive(Clone)]
pub struct BroadcastEventPublisher {
    broadcaster: SseBroadcaster,
}

impl BroadcastEventPublisher {
    /// Create a new broadcast-backed event publisher.
    #[must_use]
    pub const fn new(broadcaster: SseBroadcaster) -> Self {
        Self { broadcaster }
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventPublisher {
    async fn publish_new_comment(
        &self,
        comment_id: &str,
        post_id: &str,
        user_id: &str,
        parent_id: Option<&str>,
    ) -> AppResult<()> {
        self.broadcaster.broadcast(SseEvent::NewComment {
            id: comment_id.to_string(),
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
            parent_id: parent_id.map(ToString::to_string),
        });
        Ok(())
    }

    async fn publish_post_vote(
        &self,
        post_id: &str,
        user_id: &str,
        upvotes: i32,
        downvotes: i32,
    ) -> AppResult<()> {
        self.broadcaster.broadcast(SseEvent::PostVote {
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
            upvotes,
            downvotes,
        });
        Ok(())
    }

    async fn publish_comment_vote(
        &self,
        comment_id: &str,
        post_id: &str,
        user_id: &str,
        upvotes: i32,
        downvotes: i32,
    ) -> AppResult<()> {
        self.broadcaster.broadcast(SseEvent::CommentVote {
            comment_id: comment_id.to_string(),
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
            upvotes,
            downvotes,
        });
        Ok(())
    }
}

/// Feed SSE stream.
async fn feed_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.sse_broadcaster.feed.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| {
        result.ok().map(|event| {
            Ok(Event::default()
                .json_data(&event)
                .unwrap_or_else(|_| Event::default().data("error")))
        })
    });

    // Add initial connected event
    let initial = stream::once(async {
        Ok(Event::default()
            .json_data(&SseEvent::Connected)
            .unwrap_or_else(|_| Event::default().data("connected")))
    });

    Sse::new(initial.chain(stream)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

/// Create SSE router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(feed_stream))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_broadcaster_new() {
        let broadcaster = SseBroadcaster::new();
        assert_eq!(broadcaster.feed.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscriber() {
        let broadcaster = SseBroadcaster::new();
        let mut rx = broadcaster.feed.subscribe();

        broadcaster.broadcast(SseEvent::Connected);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, SseEvent::Connected));
    }

    #[tokio::test]
    async fn test_publisher_emits_vote_event() {
        let broadcaster = SseBroadcaster::new();
        let mut rx = broadcaster.feed.subscribe();
        let publisher = BroadcastEventPublisher::new(broadcaster);

        publisher
            .publish_post_vote("p1", "u1", 3, 1)
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            SseEvent::PostVote {
                post_id, upvotes, ..
            } => {
                assert_eq!(post_id, "p1");
                assert_eq!(upvotes, 3);
            }
            other => panic!("Unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_sse_event_serialization() {
        let event = SseEvent::NewComment {
            id: "cm1".to_string(),
            post_id: "p1".to_string(),
            user_id: "u1".to_string(),
            parent_id: None,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"new-comment\""));
        assert!(json.contains("\"postId\":\"p1\""));
    }
}
