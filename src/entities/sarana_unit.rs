use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Condition of an individually tracked unit. Only `Available` units may be
/// assigned to a request; assignment itself does not change this status, the
/// open `unit_assignment` row is what keeps a unit off-limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitStatus {
    Available,
    Damaged,
    Maintenance,
    Lost,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Available => "available",
            UnitStatus::Damaged => "damaged",
            UnitStatus::Maintenance => "maintenance",
            UnitStatus::Lost => "lost",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "available" => Some(UnitStatus::Available),
            "damaged" => Some(UnitStatus::Damaged),
            "maintenance" => Some(UnitStatus::Maintenance),
            "lost" => Some(UnitStatus::Lost),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sarana_units")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub sarana_id: Uuid,
    #[sea_orm(unique)]
    pub unit_code: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sarana::Entity",
        from = "Column::SaranaId",
        to = "super::sarana::Column::Id"
    )]
    Sarana,
}

impl Related<super::sarana::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sarana.def()
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
