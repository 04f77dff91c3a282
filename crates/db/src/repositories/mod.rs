//! Database repositories.

#![allow(missing_docs)]

pub mod comment;
pub mod comment_vote;
pub mod community;
pub mod community_member;
pub mod external_webhook;
pub mod password_reset_token;
pub mod post;
pub mod post_vote;
pub mod processed_webhook_event;
pub mod user;

pub use comment::CommentRepository;
pub use comment_vote::CommentVoteRepository;
pub use community::CommunityRepository;
pub use community_member::CommunityMemberRepository;
pub use external_webhook::ExternalWebhookRepository;
pub use password_reset_token::PasswordResetTokenRepository;
pub use post::{PostOrder, PostRepository};
pub use post_vote::{PostVoteRepository, VoteOutcome, VoteTally};
pub use processed_webhook_event::ProcessedWebhookEventRepository;
pub use user::UserRepository;
