//! Processed webhook event ledger.
//!
//! Billing providers redeliver webhooks; the ledger records every event id
//! that has already been applied so replays become no-ops.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "processed_webhook_event")]
pub struct Model {
    /// Provider event id (e.g. Stripe `evt_...`)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Originating provider ("stripe" or "paypal")
    pub provider: String,

    pub processed_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
