//! API endpoints.

mod auth;
mod comments;
mod communities;
mod external;
mod payments;
mod posts;
mod profile;

use axum::Router;

use crate::middleware::AppState;
use crate::sse;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(profile::router())
        .nest("/communities", communities::router())
        .nest("/posts", posts::router())
        .nest("/comments", comments::router())
        .nest("/payments", payments::router())
        .nest("/external", external::router())
        .nest("/streaming/sse", sse::router())
}
