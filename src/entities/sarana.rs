use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How stock of a sarana is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingType {
    /// Quantity-tracked: the counters on this row are authoritative.
    Pooled,
    /// Individually tracked: stock is derived from `sarana_unit` rows and the
    /// counters on this row are not used.
    Serialized,
}

impl TrackingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingType::Pooled => "pooled",
            TrackingType::Serialized => "serialized",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pooled" => Some(TrackingType::Pooled),
            "serialized" => Some(TrackingType::Serialized),
            _ => None,
        }
    }
}

/// Bookable equipment. Pooled counter invariant:
/// `available_units <= total_units - damaged_units - maintenance_units - lost_units`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sarana")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub name: String,
    pub tracking: String,
    pub total_units: i32,
    pub available_units: i32,
    pub damaged_units: i32,
    pub maintenance_units: i32,
    pub lost_units: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sarana_unit::Entity")]
    Units,
}

impl Related<super::sarana_unit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Units.def()
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

impl Model {
    pub fn tracking_type(&self) -> Option<TrackingType> {
        TrackingType::from_str(&self.tracking)
    }

    /// Pooled counter invariant check; always true for serialized rows.
    pub fn counters_consistent(&self) -> bool {
        match self.tracking_type() {
            Some(TrackingType::Pooled) => {
                self.available_units
                    <= self.total_units
                        - self.damaged_units
                        - self.maintenance_units
                        - self.lost_units
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pooled(total: i32, available: i32, damaged: i32) -> Model {
        Model {
            id: Uuid::new_v4(),
            code: "PRJ-01".into(),
            name: "Projector".into(),
            tracking: "pooled".into(),
            total_units: total,
            available_units: available,
            damaged_units: damaged,
            maintenance_units: 0,
            lost_units: 0,
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn pooled_counter_invariant() {
        assert!(pooled(10, 8, 2).counters_consistent());
        assert!(!pooled(10, 9, 2).counters_consistent());
    }

    #[test]
    fn tracking_round_trip() {
        assert_eq!(TrackingType::from_str("pooled"), Some(TrackingType::Pooled));
        assert_eq!(TrackingType::Serialized.as_str(), "serialized");
        assert_eq!(TrackingType::from_str("bulk"), None);
    }
}
