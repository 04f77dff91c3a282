//! FounderSocials server entry point.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{Router, middleware};
use founder_api::{BroadcastEventPublisher, SseBroadcaster, middleware::AppState, router as api_router};
use founder_common::{Config, LocalStorage, StorageBackend};
use founder_core::{
    BillingService, CommentService, CommunityService, EmailConfig, EmailService,
    EventPublisherService, ModerationService, PostService, SsoService, UserService, VoteService,
};
use founder_db::repositories::{
    CommentRepository, CommentVoteRepository, CommunityMemberRepository, CommunityRepository,
    ExternalWebhookRepository, PasswordResetTokenRepository, PostRepository, PostVoteRepository,
    ProcessedWebhookEventRepository, UserRepository,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "founder=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting foundersocials server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = founder_db::init(&config).await?;
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    founder_db::migrate(&db).await?;
    info!("Migrations completed");

    // Initialize repositories
    let db = Arc::new(db);
    let user_repo = UserRepository::new(Arc::clone(&db));
    let reset_repo = PasswordResetTokenRepository::new(Arc::clone(&db));
    let community_repo = CommunityRepository::new(Arc::clone(&db));
    let member_repo = CommunityMemberRepository::new(Arc::clone(&db));
    let post_repo = PostRepository::new(Arc::clone(&db));
    let comment_repo = CommentRepository::new(Arc::clone(&db));
    let post_vote_repo = PostVoteRepository::new(Arc::clone(&db));
    let comment_vote_repo = CommentVoteRepository::new(Arc::clone(&db));
    let webhook_event_repo = ProcessedWebhookEventRepository::new(Arc::clone(&db));
    let external_webhook_repo = ExternalWebhookRepository::new(Arc::clone(&db));

    // Initialize real-time streaming
    let sse_broadcaster = SseBroadcaster::new();
    let event_publisher: EventPublisherService =
        Arc::new(BroadcastEventPublisher::new(sse_broadcaster.clone()));

    // Initialize email (optional, based on config)
    let email_service = EmailService::new(EmailConfig::from_settings(&config.email));
    if email_service.is_enabled() {
        info!("Email notifications enabled");
    } else {
        info!("Email notifications disabled (no provider configured)");
    }

    // Initialize services
    let mut user_service = UserService::new(user_repo.clone(), reset_repo);
    user_service.set_email(email_service.clone());

    let community_service = CommunityService::new(community_repo.clone(), member_repo.clone());

    let post_service = PostService::new(post_repo.clone(), community_repo, member_repo);

    let moderation_service = ModerationService::new(config.moderation.clone());

    let mut comment_service = CommentService::new(
        comment_repo.clone(),
        post_repo.clone(),
        moderation_service,
        user_service.clone(),
    );
    comment_service.set_event_publisher(event_publisher.clone());

    let mut vote_service = VoteService::new(
        post_repo,
        comment_repo,
        post_vote_repo,
        comment_vote_repo,
    );
    vote_service.set_event_publisher(event_publisher);

    let sso_service = SsoService::new(config.sso.clone(), external_webhook_repo);

    let mut billing_service = BillingService::new(
        config.billing.clone(),
        user_repo,
        webhook_event_repo,
    );
    billing_service.set_email(email_service);
    billing_service.set_sso(sso_service.clone());

    // Initialize upload storage
    let storage: Arc<dyn StorageBackend> = Arc::new(LocalStorage::new(
        PathBuf::from(&config.storage.path),
        config.storage.base_url.clone(),
    ));

    // Create app state
    let state = AppState {
        user_service,
        community_service,
        post_service,
        comment_service,
        vote_service,
        billing_service,
        sso_service,
        storage,
        sse_broadcaster,
    };

    // Build router
    let app = Router::new()
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            founder_api::middleware::auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
