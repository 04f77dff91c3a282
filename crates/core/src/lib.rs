//! Business logic for foundersocials.
//!
//! Services over the repository layer:
//!
//! - **Users**: registration, authentication, profiles, password reset,
//!   prompt-quota accounting
//! - **Communities**: creation, membership, roles
//! - **Posts**: feeds (`new`/`top`/`hot`), search
//! - **Comments**: AI-moderated creation, follow-up merging, enhancement,
//!   process flows
//! - **Votes**: toggle/flip/insert with transactional recounts
//! - **Billing**: Stripe and PayPal subscription lifecycle and webhooks
//! - **SSO**: external JWT surface and signed outbound webhooks
//! - **Email**: SMTP and SendGrid notification delivery

pub mod crypto;
pub mod services;

pub use services::*;
