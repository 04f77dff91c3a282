//! User entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Subscription plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[sea_orm(string_value = "free")]
    Free,
    #[sea_orm(string_value = "standard")]
    Standard,
    #[sea_orm(string_value = "founder")]
    Founder,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique)]
    pub username: String,

    /// Email address (NULL for SSO-provisioned accounts without one)
    #[sea_orm(unique, nullable)]
    pub email: Option<String>,

    /// Argon2 password hash (NULL for SSO-only accounts)
    #[sea_orm(nullable)]
    pub password_hash: Option<String>,

    /// Access token
    #[sea_orm(unique, nullable)]
    pub token: Option<String>,

    /// Display name
    #[sea_orm(nullable)]
    pub display_name: Option<String>,

    /// Profile bio
    #[sea_orm(column_type = "Text", nullable)]
    pub bio: Option<String>,

    /// Avatar URL
    #[sea_orm(nullable)]
    pub avatar_url: Option<String>,

    /// Subscription plan
    pub plan: Plan,

    /// Remaining AI prompt quota (metered plans only)
    #[sea_orm(default_value = 0)]
    pub remaining_prompts: i32,

    /// Premium flag (set by billing webhooks)
    #[sea_orm(default_value = false)]
    pub is_premium: bool,

    /// Active flag (cleared on payment failure)
    #[sea_orm(default_value = true)]
    pub is_active: bool,

    /// Last payment status reported by the billing provider
    #[sea_orm(nullable)]
    pub payment_status: Option<String>,

    /// Stripe customer reference
    #[sea_orm(nullable)]
    pub stripe_customer_id: Option<String>,

    /// Stripe subscription reference
    #[sea_orm(nullable)]
    pub stripe_subscription_id: Option<String>,

    /// PayPal subscription reference
    #[sea_orm(nullable)]
    pub paypal_subscription_id: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::post::Entity")]
    Posts,

    #[sea_orm(has_many = "super::comment::Entity")]
    Comments,

    #[sea_orm(has_many = "super::community_member::Entity")]
    Memberships,
}

impl Related<super::post::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Posts.def()
    }
}

impl Related<super::comment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Comments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
