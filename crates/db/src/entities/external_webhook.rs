//! External webhook entity.
//!
//! Endpoints registered by the external project-management integration.
//! Subscription-change events are delivered to these as HMAC-signed JSON.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "external_webhook")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// User who registered this endpoint
    #[sea_orm(indexed)]
    pub user_id: String,

    /// Target URL to send events to
    #[sea_orm(column_type = "Text")]
    pub url: String,

    /// Secret for signing payloads
    pub secret: String,

    /// Events this endpoint is subscribed to (JSON array)
    #[sea_orm(column_type = "JsonBinary")]
    pub events: Json,

    /// Is this endpoint active?
    #[sea_orm(default_value = true)]
    pub is_active: bool,

    /// Last time this endpoint was triggered
    #[sea_orm(nullable)]
    pub last_triggered_at: Option<DateTimeWithTimeZone>,

    /// Count of consecutive failed deliveries
    #[sea_orm(default_value = 0)]
    pub failure_count: i32,

    /// Last delivery error (if any)
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
