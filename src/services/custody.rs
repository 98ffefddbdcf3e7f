//! Custody tracking: binding approved requests to concrete units or pooled
//! quantity, then walking them through pickup and return.
//!
//! All grants for one request commit or roll back together. A serialized unit
//! with an open (unreleased) assignment row is off-limits to every other
//! request; pooled stock is guarded by a conditional decrement that refuses to
//! go negative.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{
    peminjaman::{self, Entity as PeminjamanEntity, PeminjamanStatus},
    peminjaman_item::{self, Entity as PeminjamanItemEntity},
    sarana::{self, Entity as SaranaEntity, TrackingType},
    sarana_unit::{self, Entity as SaranaUnitEntity, UnitStatus},
    unit_assignment::{self, Entity as UnitAssignmentEntity},
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::peminjaman::transition_with;

/// Unit picks for one serialized request item. Pooled items need no spec;
/// their reserved quantity comes from the item itself.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignmentSpec {
    pub item_id: Uuid,
    pub unit_ids: Vec<Uuid>,
}

/// Condition reported for returned stock. Anything not reported comes back
/// in good condition.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReturnCondition {
    /// Serialized unit being reported.
    pub unit_id: Option<Uuid>,
    /// Pooled sarana being reported, with `quantity`.
    pub sarana_id: Option<Uuid>,
    #[serde(default = "default_condition_quantity")]
    pub quantity: i32,
    /// "damaged" or "lost"
    pub condition: String,
}

fn default_condition_quantity() -> i32 {
    1
}

#[derive(Clone)]
pub struct CustodyService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CustodyService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Binds concrete custody to an approved request: specific available
    /// units for serialized items, a guarded pool decrement for pooled items.
    /// All-or-nothing across every item.
    #[instrument(skip(self, specs))]
    pub async fn assign_units(
        &self,
        peminjaman_id: Uuid,
        specs: Vec<AssignmentSpec>,
    ) -> Result<Vec<unit_assignment::Model>, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let request = PeminjamanEntity::find_by_id(peminjaman_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Peminjaman {} not found", peminjaman_id))
            })?;
        if PeminjamanStatus::from_str(&request.status) != Some(PeminjamanStatus::Approved) {
            return Err(ServiceError::StateError(format!(
                "units can only be assigned to an approved request, peminjaman {} is {}",
                peminjaman_id, request.status
            )));
        }

        let existing = UnitAssignmentEntity::find()
            .filter(unit_assignment::Column::PeminjamanId.eq(peminjaman_id))
            .filter(unit_assignment::Column::Released.eq(false))
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if !existing.is_empty() {
            return Err(ServiceError::StateError(format!(
                "peminjaman {} already has assigned units",
                peminjaman_id
            )));
        }

        let items = PeminjamanItemEntity::find()
            .filter(peminjaman_item::Column::PeminjamanId.eq(peminjaman_id))
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if items.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "peminjaman {} has no equipment items to assign",
                peminjaman_id
            )));
        }

        let mut assignments = Vec::new();
        for item in &items {
            let equipment = SaranaEntity::find_by_id(item.sarana_id)
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Sarana {} not found", item.sarana_id))
                })?;

            match equipment.tracking_type() {
                Some(TrackingType::Serialized) => {
                    let spec = specs
                        .iter()
                        .find(|s| s.item_id == item.id)
                        .ok_or_else(|| {
                            ServiceError::ValidationError(format!(
                                "unit selection required for serialized sarana {}",
                                equipment.code
                            ))
                        })?;
                    if spec.unit_ids.len() as i32 != item.quantity {
                        return Err(ServiceError::ValidationError(format!(
                            "sarana {}: {} units selected, {} requested",
                            equipment.code,
                            spec.unit_ids.len(),
                            item.quantity
                        )));
                    }
                    for unit_id in &spec.unit_ids {
                        let assignment =
                            assign_serialized_unit(&txn, &request, item, &equipment, *unit_id)
                                .await?;
                        assignments.push(assignment);
                    }
                }
                Some(TrackingType::Pooled) => {
                    // Conditional decrement; racing requests cannot drive the
                    // pool negative.
                    let result = SaranaEntity::update_many()
                        .col_expr(
                            sarana::Column::AvailableUnits,
                            Expr::col(sarana::Column::AvailableUnits).sub(item.quantity),
                        )
                        .col_expr(sarana::Column::UpdatedAt, Expr::value(Utc::now()))
                        .filter(sarana::Column::Id.eq(equipment.id))
                        .filter(sarana::Column::AvailableUnits.gte(item.quantity))
                        .exec(&txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    if result.rows_affected == 0 {
                        return Err(ServiceError::InsufficientStock(format!(
                            "sarana {}: {} available, {} requested",
                            equipment.code, equipment.available_units, item.quantity
                        )));
                    }

                    let assignment = unit_assignment::ActiveModel {
                        peminjaman_id: Set(peminjaman_id),
                        item_id: Set(item.id),
                        sarana_id: Set(equipment.id),
                        unit_id: Set(None),
                        quantity: Set(item.quantity),
                        released: Set(false),
                        ..Default::default()
                    }
                    .insert(&txn)
                    .await
                    .map_err(ServiceError::db_error)?;
                    assignments.push(assignment);
                }
                None => {
                    return Err(ServiceError::InternalError(format!(
                        "corrupt tracking type on sarana {}",
                        equipment.id
                    )));
                }
            }
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            peminjaman_id = %peminjaman_id,
            assignments = assignments.len(),
            "Units assigned"
        );
        self.event_sender
            .send(Event::UnitsAssigned {
                peminjaman_id,
                assignments: assignments.len() as u64,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(assignments)
    }

    /// Records the physical handover and moves the request into custody.
    #[instrument(skip(self, photo_ref))]
    pub async fn validate_pickup(
        &self,
        peminjaman_id: Uuid,
        actor_id: Uuid,
        photo_ref: String,
    ) -> Result<peminjaman::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let request = PeminjamanEntity::find_by_id(peminjaman_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Peminjaman {} not found", peminjaman_id))
            })?;
        if PeminjamanStatus::from_str(&request.status) != Some(PeminjamanStatus::Approved) {
            return Err(ServiceError::StateError(format!(
                "pickup requires an approved request, peminjaman {} is {}",
                peminjaman_id, request.status
            )));
        }

        let item_count = sea_orm::PaginatorTrait::count(
            PeminjamanItemEntity::find()
                .filter(peminjaman_item::Column::PeminjamanId.eq(peminjaman_id)),
            &txn,
        )
        .await
        .map_err(ServiceError::db_error)?;
        if item_count > 0 {
            let assigned = sea_orm::PaginatorTrait::count(
                UnitAssignmentEntity::find()
                    .filter(unit_assignment::Column::PeminjamanId.eq(peminjaman_id))
                    .filter(unit_assignment::Column::Released.eq(false)),
                &txn,
            )
            .await
            .map_err(ServiceError::db_error)?;
            if assigned == 0 {
                return Err(ServiceError::StateError(format!(
                    "peminjaman {} has no assigned units yet",
                    peminjaman_id
                )));
            }
        }

        let now = Utc::now();
        let photo = photo_ref.clone();
        transition_with(
            &txn,
            peminjaman_id,
            PeminjamanStatus::Approved,
            PeminjamanStatus::PickedUp,
            move |q| {
                q.col_expr(peminjaman::Column::PickupPhotoRef, Expr::value(photo))
                    .col_expr(peminjaman::Column::PickedUpBy, Expr::value(actor_id))
                    .col_expr(peminjaman::Column::PickedUpAt, Expr::value(now))
            },
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(peminjaman_id = %peminjaman_id, actor = %actor_id, "Pickup validated");
        self.event_sender
            .send(Event::PickupValidated {
                peminjaman_id,
                actor_id,
            })
            .await
            .map_err(ServiceError::EventError)?;

        self.fetch(peminjaman_id).await
    }

    /// Finalizes the lifecycle: releases custody back to the pool, keeping
    /// damaged or lost stock out of it, and closes the request.
    #[instrument(skip(self, photo_ref, conditions))]
    pub async fn validate_return(
        &self,
        peminjaman_id: Uuid,
        actor_id: Uuid,
        photo_ref: String,
        conditions: Vec<ReturnCondition>,
    ) -> Result<peminjaman::Model, ServiceError> {
        for report in &conditions {
            if !matches!(report.condition.as_str(), "damaged" | "lost") {
                return Err(ServiceError::ValidationError(format!(
                    "unknown return condition: {}",
                    report.condition
                )));
            }
            if report.unit_id.is_none() && report.sarana_id.is_none() {
                return Err(ServiceError::ValidationError(
                    "a return condition must name a unit or a pooled sarana".to_string(),
                ));
            }
            if report.quantity < 1 {
                return Err(ServiceError::ValidationError(
                    "return condition quantity must be at least 1".to_string(),
                ));
            }
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let request = PeminjamanEntity::find_by_id(peminjaman_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Peminjaman {} not found", peminjaman_id))
            })?;
        if PeminjamanStatus::from_str(&request.status) != Some(PeminjamanStatus::PickedUp) {
            return Err(ServiceError::StateError(format!(
                "return requires a picked-up request, peminjaman {} is {}",
                peminjaman_id, request.status
            )));
        }

        let open_assignments = UnitAssignmentEntity::find()
            .filter(unit_assignment::Column::PeminjamanId.eq(peminjaman_id))
            .filter(unit_assignment::Column::Released.eq(false))
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let mut damaged_or_lost = 0u64;
        for assignment in &open_assignments {
            match assignment.unit_id {
                Some(unit_id) => {
                    let reported = conditions
                        .iter()
                        .find(|c| c.unit_id == Some(unit_id))
                        .map(|c| c.condition.as_str());
                    let condition = reported.unwrap_or("good");
                    if let Some(status) = match condition {
                        "damaged" => Some(UnitStatus::Damaged),
                        "lost" => Some(UnitStatus::Lost),
                        _ => None,
                    } {
                        // The unit leaves the bookable set instead of
                        // returning to it.
                        let mut unit: sarana_unit::ActiveModel = SaranaUnitEntity::find_by_id(
                            unit_id,
                        )
                        .one(&txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::InternalError(format!(
                                "assigned unit {} vanished",
                                unit_id
                            ))
                        })?
                        .into();
                        unit.status = Set(status.as_str().to_string());
                        unit.update(&txn).await.map_err(ServiceError::db_error)?;
                        damaged_or_lost += 1;
                    }
                    release_assignment(&txn, assignment, condition).await?;
                }
                None => {
                    let damaged: i32 = conditions
                        .iter()
                        .filter(|c| {
                            c.sarana_id == Some(assignment.sarana_id) && c.condition == "damaged"
                        })
                        .map(|c| c.quantity)
                        .sum();
                    let lost: i32 = conditions
                        .iter()
                        .filter(|c| {
                            c.sarana_id == Some(assignment.sarana_id) && c.condition == "lost"
                        })
                        .map(|c| c.quantity)
                        .sum();
                    if damaged + lost > assignment.quantity {
                        return Err(ServiceError::ValidationError(format!(
                            "reported {} damaged/lost but only {} were assigned",
                            damaged + lost,
                            assignment.quantity
                        )));
                    }

                    let restored = assignment.quantity - damaged - lost;
                    SaranaEntity::update_many()
                        .col_expr(
                            sarana::Column::AvailableUnits,
                            Expr::col(sarana::Column::AvailableUnits).add(restored),
                        )
                        .col_expr(
                            sarana::Column::DamagedUnits,
                            Expr::col(sarana::Column::DamagedUnits).add(damaged),
                        )
                        .col_expr(
                            sarana::Column::LostUnits,
                            Expr::col(sarana::Column::LostUnits).add(lost),
                        )
                        .col_expr(sarana::Column::UpdatedAt, Expr::value(Utc::now()))
                        .filter(sarana::Column::Id.eq(assignment.sarana_id))
                        .exec(&txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    damaged_or_lost += (damaged + lost) as u64;

                    let condition = if damaged + lost > 0 { "damaged" } else { "good" };
                    release_assignment(&txn, assignment, condition).await?;
                }
            }
        }

        let now = Utc::now();
        let photo = photo_ref.clone();
        transition_with(
            &txn,
            peminjaman_id,
            PeminjamanStatus::PickedUp,
            PeminjamanStatus::Returned,
            move |q| {
                q.col_expr(peminjaman::Column::ReturnPhotoRef, Expr::value(photo))
                    .col_expr(peminjaman::Column::ReturnedBy, Expr::value(actor_id))
                    .col_expr(peminjaman::Column::ReturnedAt, Expr::value(now))
            },
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            peminjaman_id = %peminjaman_id,
            actor = %actor_id,
            damaged_or_lost,
            "Return validated"
        );
        self.event_sender
            .send(Event::ReturnValidated {
                peminjaman_id,
                actor_id,
                damaged_or_lost,
            })
            .await
            .map_err(ServiceError::EventError)?;

        self.fetch(peminjaman_id).await
    }

    /// Admin correction outside of a return: reclassifies a unit's condition.
    #[instrument(skip(self))]
    pub async fn set_unit_status(
        &self,
        unit_id: Uuid,
        status: UnitStatus,
    ) -> Result<sarana_unit::Model, ServiceError> {
        let unit = SaranaUnitEntity::find_by_id(unit_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Unit {} not found", unit_id)))?;

        let open = UnitAssignmentEntity::find()
            .filter(unit_assignment::Column::UnitId.eq(unit_id))
            .filter(unit_assignment::Column::Released.eq(false))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if open.is_some() {
            return Err(ServiceError::StateError(format!(
                "unit {} is currently assigned; validate its return first",
                unit.unit_code
            )));
        }

        let mut active: sarana_unit::ActiveModel = unit.into();
        active.status = Set(status.as_str().to_string());
        active.update(&*self.db).await.map_err(ServiceError::db_error)
    }

    /// Open assignments of a request.
    #[instrument(skip(self))]
    pub async fn assignments_for(
        &self,
        peminjaman_id: Uuid,
    ) -> Result<Vec<unit_assignment::Model>, ServiceError> {
        UnitAssignmentEntity::find()
            .filter(unit_assignment::Column::PeminjamanId.eq(peminjaman_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn fetch(&self, id: Uuid) -> Result<peminjaman::Model, ServiceError> {
        PeminjamanEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::InternalError(format!("peminjaman {} vanished", id)))
    }
}

async fn assign_serialized_unit<C: ConnectionTrait>(
    txn: &C,
    request: &peminjaman::Model,
    item: &peminjaman_item::Model,
    equipment: &sarana::Model,
    unit_id: Uuid,
) -> Result<unit_assignment::Model, ServiceError> {
    let unit = SaranaUnitEntity::find_by_id(unit_id)
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Unit {} not found", unit_id)))?;

    if unit.sarana_id != equipment.id {
        return Err(ServiceError::ValidationError(format!(
            "unit {} does not belong to sarana {}",
            unit.unit_code, equipment.code
        )));
    }
    if UnitStatus::from_str(&unit.status) != Some(UnitStatus::Available) {
        return Err(ServiceError::ConflictError(format!(
            "unit {} is {}, not available",
            unit.unit_code, unit.status
        )));
    }

    let already_out = UnitAssignmentEntity::find()
        .filter(unit_assignment::Column::UnitId.eq(unit_id))
        .filter(unit_assignment::Column::Released.eq(false))
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?;
    if let Some(holder) = already_out {
        return Err(ServiceError::ConflictError(format!(
            "unit {} is already assigned to peminjaman {}",
            unit.unit_code, holder.peminjaman_id
        )));
    }

    unit_assignment::ActiveModel {
        peminjaman_id: Set(request.id),
        item_id: Set(item.id),
        sarana_id: Set(equipment.id),
        unit_id: Set(Some(unit_id)),
        quantity: Set(1),
        released: Set(false),
        ..Default::default()
    }
    .insert(txn)
    .await
    .map_err(ServiceError::db_error)
}

async fn release_assignment<C: ConnectionTrait>(
    txn: &C,
    assignment: &unit_assignment::Model,
    condition: &str,
) -> Result<(), ServiceError> {
    let mut active: unit_assignment::ActiveModel = assignment.clone().into();
    active.released = Set(true);
    active.condition_on_return = Set(Some(condition.to_string()));
    active.update(txn).await.map_err(ServiceError::db_error)?;
    Ok(())
}

/// Releases every open assignment of a request back to the pool. Serialized
/// units simply drop their open row (their status never changed); pooled
/// grants restore `available_units`. Used by cancellation.
pub(crate) async fn release_assignments_in_txn<C: ConnectionTrait>(
    txn: &C,
    peminjaman_id: Uuid,
) -> Result<u64, ServiceError> {
    let open = UnitAssignmentEntity::find()
        .filter(unit_assignment::Column::PeminjamanId.eq(peminjaman_id))
        .filter(unit_assignment::Column::Released.eq(false))
        .all(txn)
        .await
        .map_err(ServiceError::db_error)?;

    let mut released = 0u64;
    for assignment in &open {
        if assignment.unit_id.is_none() {
            SaranaEntity::update_many()
                .col_expr(
                    sarana::Column::AvailableUnits,
                    Expr::col(sarana::Column::AvailableUnits).add(assignment.quantity),
                )
                .col_expr(sarana::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(sarana::Column::Id.eq(assignment.sarana_id))
                .exec(txn)
                .await
                .map_err(ServiceError::db_error)?;
        }

        let mut active: unit_assignment::ActiveModel = assignment.clone().into();
        active.released = Set(true);
        active.update(txn).await.map_err(ServiceError::db_error)?;
        released += 1;
    }

    Ok(released)
}
