//! Business logic services.

#![allow(missing_docs)]

pub mod billing;
pub mod comment;
pub mod community;
pub mod email;
pub mod event_publisher;
pub mod moderation;
pub mod post;
pub mod sso;
pub mod user;
pub mod vote;

pub use billing::{
    BillingService, BillingStatus, PayPalClient, PayPalSubscriptionResponse, PayPalWebhookHeaders,
    StripeClient, StripeSubscriptionResponse,
};
pub use comment::{CommentService, CommentWithReplies, CreateCommentInput};
pub use community::{CommunityService, CreateCommunityInput, UpdateCommunityInput};
pub use email::{EmailConfig, EmailDeliveryResult, EmailMessage, EmailProvider, EmailService};
pub use event_publisher::{EventPublisher, EventPublisherService, NoOpEventPublisher};
pub use moderation::{MergedComment, ModerationService, ModerationVerdict, ProcessFlow};
pub use post::{CreatePostInput, PostService};
pub use sso::{
    ExternalClaims, RegisterWebhookInput, SsoService, WebhookResponse, WebhookWithSecretResponse,
};
pub use user::{CreateUserInput, UpdateProfileInput, UserService};
pub use vote::{VoteResult, VoteService};
