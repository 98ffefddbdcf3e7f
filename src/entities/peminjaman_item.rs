use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One requested equipment line on a peminjaman: which sarana and how many.
/// Concrete units (or the reserved pooled quantity) are bound later via
/// `unit_assignment` rows once the request is approved.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "peminjaman_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub peminjaman_id: Uuid,
    pub sarana_id: Uuid,
    pub quantity: i32,
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
        belongs_to = "super::sarana::Entity",
        from = "Column::SaranaId",
        to = "super::sarana::Column::Id"
    )]
    Sarana,
}

impl Related<super::peminjaman::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Peminjaman.def()
    }
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
