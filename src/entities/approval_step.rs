use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which roster a step was generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalType {
    Global,
    Resource,
}

impl ApprovalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalType::Global => "global",
            ApprovalType::Resource => "resource",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "global" => Some(ApprovalType::Global),
            "resource" => Some(ApprovalType::Resource),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalDecision {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalDecision::Pending => "pending",
            ApprovalDecision::Approved => "approved",
            ApprovalDecision::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ApprovalDecision::Pending),
            "approved" => Some(ApprovalDecision::Approved),
            "rejected" => Some(ApprovalDecision::Rejected),
            _ => None,
        }
    }
}

/// One required approval gate for a peminjaman. Steps are created in bulk from
/// the active approver roster at submission and are never deleted; a decided
/// step is history and cannot be re-decided.
///
/// Uniqueness: `(peminjaman_id, approval_type, resource_type, resource_id, level)`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "approval_steps")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub peminjaman_id: Uuid,
    pub approval_type: String,
    pub level: i32,
    /// "prasarana" or "sarana" for resource-specific steps, null for global.
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub approver_id: Uuid,
    pub decision: String,
    pub reason: Option<String>,
    pub overridden_by: Option<Uuid>,
    /// Set when the decision arrived while a lower level of the same gate
    /// chain was still pending. Accepted, but flagged for the audit trail.
    pub out_of_order: bool,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::peminjaman::Entity",
        from = "Column::PeminjamanId",
        to = "super::peminjaman::Column::Id"
    )]
    Peminjaman,
}

impl Related<super::peminjaman::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Peminjaman.def()
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
    fn decision_round_trip() {
        assert_eq!(
            ApprovalDecision::from_str("pending"),
            Some(ApprovalDecision::Pending)
        );
        assert_eq!(ApprovalDecision::Rejected.as_str(), "rejected");
        assert_eq!(ApprovalDecision::from_str("maybe"), None);
    }

    #[test]
    fn type_round_trip() {
        assert_eq!(ApprovalType::from_str("global"), Some(ApprovalType::Global));
        assert_eq!(ApprovalType::Resource.as_str(), "resource");
    }
}
