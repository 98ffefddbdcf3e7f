use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Binds a request item to concrete custody: one row per serialized unit
/// (`unit_id` set, `quantity` 1) or one row per pooled grant (`unit_id` null,
/// `quantity` = reserved amount). `released` flips on return or cancellation;
/// a unit with an unreleased row is off-limits to every other live request.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "unit_assignments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub peminjaman_id: Uuid,
    pub item_id: Uuid,
    pub sarana_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub quantity: i32,
    pub released: bool,
    /// "good", "damaged" or "lost", recorded at return validation.
    pub condition_on_return: Option<String>,
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
    #[sea_orm(
        belongs_to = "super::peminjaman_item::Entity",
        from = "Column::ItemId",
        to = "super::peminjaman_item::Column::Id"
    )]
    Item,
    #[sea_orm(
        belongs_to = "super::sarana_unit::Entity",
        from = "Column::UnitId",
        to = "super::sarana_unit::Column::Id"
    )]
    Unit,
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
