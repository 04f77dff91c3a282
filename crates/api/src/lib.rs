//! HTTP API layer for foundersocials.
//!
//! This crate provides the REST API and real-time streaming:
//!
//! - **Endpoints**: communities, posts, comments, votes, payments, SSO
//! - **Extractors**: bearer-token authentication
//! - **Middleware**: auth, shared application state
//! - **Streaming**: Server-Sent Events for comment/vote cache patching
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod sse;

pub use endpoints::router;
pub use sse::{BroadcastEventPublisher, SseBroadcaster, SseEvent};
