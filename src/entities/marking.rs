use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a soft hold. `Active` is the only non-terminal state; an active
/// marking whose `expires_at` has passed is treated as expired on read and is
/// flipped to `Expired` by the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkingStatus {
    Active,
    Expired,
    Converted,
    Cancelled,
}

impl MarkingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkingStatus::Active => "active",
            MarkingStatus::Expired => "expired",
            MarkingStatus::Converted => "converted",
            MarkingStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(MarkingStatus::Active),
            "expired" => Some(MarkingStatus::Expired),
            "converted" => Some(MarkingStatus::Converted),
            "cancelled" => Some(MarkingStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, MarkingStatus::Active)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "markings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub owner_id: Uuid,
    /// Registered place the hold is against, if any.
    pub prasarana_id: Option<Uuid>,
    /// Free-text location for holds outside the registered inventory.
    pub location_text: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub participants: i32,
    pub expires_at: DateTime<Utc>,
    pub planned_submit_by: Option<DateTime<Utc>>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            active_model.created_at = Set(now);
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
        }

        active_model.updated_at = Set(Some(now));

        Ok(active_model)
    }
}

impl Model {
    /// Projects the status a reader should see at `now`, flipping an active
    /// marking past its expiry to expired without touching the row. The sweep
    /// and every read path apply this same projection.
    pub fn effective_status(&self, now: DateTime<Utc>) -> MarkingStatus {
        match MarkingStatus::from_str(&self.status) {
            Some(MarkingStatus::Active) if self.expires_at <= now => MarkingStatus::Expired,
            Some(status) => status,
            None => MarkingStatus::Expired,
        }
    }

    /// A marking holds its slot only while active and unexpired.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == MarkingStatus::Active
    }
}
