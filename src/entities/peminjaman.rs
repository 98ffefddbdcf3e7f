use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a confirmed request.
///
/// Transitions are driven only by the approval engine and the custody tracker;
/// the valid edges live in `services::peminjaman::is_valid_transition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeminjamanStatus {
    Pending,
    Approved,
    Rejected,
    PickedUp,
    Returned,
    Cancelled,
}

impl PeminjamanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeminjamanStatus::Pending => "pending",
            PeminjamanStatus::Approved => "approved",
            PeminjamanStatus::Rejected => "rejected",
            PeminjamanStatus::PickedUp => "picked_up",
            PeminjamanStatus::Returned => "returned",
            PeminjamanStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PeminjamanStatus::Pending),
            "approved" => Some(PeminjamanStatus::Approved),
            "rejected" => Some(PeminjamanStatus::Rejected),
            "picked_up" => Some(PeminjamanStatus::PickedUp),
            "returned" => Some(PeminjamanStatus::Returned),
            "cancelled" => Some(PeminjamanStatus::Cancelled),
            _ => None,
        }
    }

    /// Live statuses hold their time slot and count against the owner's quota.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            PeminjamanStatus::Pending | PeminjamanStatus::Approved | PeminjamanStatus::PickedUp
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PeminjamanStatus::Rejected | PeminjamanStatus::Returned | PeminjamanStatus::Cancelled
        )
    }

    pub fn live_strs() -> [&'static str; 3] {
        ["pending", "approved", "picked_up"]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "peminjaman")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub owner_id: Uuid,
    pub prasarana_id: Option<Uuid>,
    pub location_text: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub participants: i32,
    pub status: String,
    /// Shared marker linking requests whose intervals overlap on the same
    /// resource. Conflicts are flagged for manual resolution, never blocked.
    pub conflict_group: Option<String>,
    pub document_ref: Option<String>,
    pub rejection_reason: Option<String>,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub pickup_photo_ref: Option<String>,
    pub picked_up_by: Option<Uuid>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub return_photo_ref: Option<String>,
    pub returned_by: Option<Uuid>,
    pub returned_at: Option<DateTime<Utc>>,
    /// Marking this request was converted from, if any.
    pub marking_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::peminjaman_item::Entity")]
    Items,
    #[sea_orm(has_many = "super::approval_step::Entity")]
    Steps,
}

impl Related<super::peminjaman_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::approval_step::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Steps.def()
    }
}

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for s in [
            "pending",
            "approved",
            "rejected",
            "picked_up",
            "returned",
            "cancelled",
        ] {
            assert_eq!(PeminjamanStatus::from_str(s).unwrap().as_str(), s);
        }
        assert_eq!(PeminjamanStatus::from_str("shipped"), None);
    }

    #[test]
    fn live_statuses() {
        assert!(PeminjamanStatus::Pending.is_live());
        assert!(PeminjamanStatus::Approved.is_live());
        assert!(PeminjamanStatus::PickedUp.is_live());
        assert!(!PeminjamanStatus::Returned.is_live());
        assert!(!PeminjamanStatus::Rejected.is_live());
        assert!(!PeminjamanStatus::Cancelled.is_live());
    }
}
