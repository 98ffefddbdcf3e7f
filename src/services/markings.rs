//! Soft holds ("markings"): lightweight reservations a user places on a
//! time slot before the paperwork exists. A marking expires on its own, can
//! be extended while still live, and can be converted into a confirmed
//! request in a single transaction.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::ReservationPolicy;
use crate::db::{begin_serializable, is_serialization_failure, SERIALIZATION_RETRIES};
use crate::entities::{
    marking::{self, Entity as MarkingEntity, MarkingStatus},
    prasarana::Entity as PrasaranaEntity,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::peminjaman::{self, NewItem, SubmittedPeminjaman};
use crate::services::{conflicts, quota};

/// Input for a new soft hold.
#[derive(Debug, Clone)]
pub struct NewMarking {
    pub owner_id: Uuid,
    pub prasarana_id: Option<Uuid>,
    pub location_text: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub participants: i32,
    /// Requested hold length; defaults to the policy's `default_hold_days`
    /// and is clamped to the maximum extension window.
    pub duration_days: Option<i64>,
    pub planned_submit_by: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// A freshly placed hold plus the conflict flag, if any live record already
/// overlaps its slot.
#[derive(Debug, Clone)]
pub struct CreatedMarking {
    pub marking: marking::Model,
    pub conflict: Option<conflicts::ConflictNote>,
}

/// Extra data a conversion adds on top of the marking's own slot.
#[derive(Debug, Clone)]
pub struct ConversionInput {
    pub document_ref: Option<String>,
    pub items: Vec<NewItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MarkingStats {
    pub total: u64,
    pub live: u64,
    pub converted: u64,
    pub expired: u64,
    pub stats_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct MarkingService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    policy: ReservationPolicy,
}

impl MarkingService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        policy: ReservationPolicy,
    ) -> Self {
        Self {
            db,
            event_sender,
            policy,
        }
    }

    /// Places a soft hold on a slot. The hold expires `duration_days` after
    /// creation (policy default, clamped to the extension window); overlap
    /// with live records is flagged, never blocked.
    #[instrument(skip(self, new), fields(owner_id = %new.owner_id))]
    pub async fn create(&self, new: NewMarking) -> Result<CreatedMarking, ServiceError> {
        let now = Utc::now();

        if new.end_at <= new.start_at {
            return Err(ServiceError::ValidationError(
                "end must be after start".to_string(),
            ));
        }
        if new.start_at <= now {
            return Err(ServiceError::ValidationError(
                "a hold must be placed on a future slot".to_string(),
            ));
        }
        if new.participants < 0 {
            return Err(ServiceError::ValidationError(
                "participants cannot be negative".to_string(),
            ));
        }
        let has_location = new
            .location_text
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        if new.prasarana_id.is_none() && !has_location {
            return Err(ServiceError::ValidationError(
                "a registered place or a custom location is required".to_string(),
            ));
        }
        let duration_days = new
            .duration_days
            .unwrap_or(self.policy.default_hold_days)
            .clamp(1, self.policy.max_extension_days);

        let mut attempt = 0;
        let (model, conflict_note) = loop {
            match self.create_in_txn(&new, duration_days, now).await {
                Err(err) if is_serialization_failure(&err) && attempt < SERIALIZATION_RETRIES => {
                    attempt += 1;
                    warn!(attempt, "hold creation lost a serialization race, retrying");
                }
                result => break result?,
            }
        };

        info!(
            marking_id = %model.id,
            conflict = conflict_note.is_some(),
            "Marking created"
        );
        self.event_sender
            .send(Event::MarkingCreated(model.id))
            .await
            .map_err(ServiceError::EventError)?;

        Ok(CreatedMarking {
            marking: model,
            conflict: conflict_note,
        })
    }

    /// Quota check, conflict lookup and insert as one serializable unit, so
    /// two concurrent creations for the same user cannot both pass the
    /// ceiling.
    async fn create_in_txn(
        &self,
        new: &NewMarking,
        duration_days: i64,
        now: DateTime<Utc>,
    ) -> Result<(marking::Model, Option<conflicts::ConflictNote>), ServiceError> {
        let txn = begin_serializable(&self.db)
            .await
            .map_err(ServiceError::db_error)?;

        if let Some(prasarana_id) = new.prasarana_id {
            let place = PrasaranaEntity::find_by_id(prasarana_id)
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!("prasarana {} not found", prasarana_id))
                })?;
            if !place.is_active {
                return Err(ServiceError::ValidationError(format!(
                    "prasarana {} is not available for booking",
                    place.code
                )));
            }
        }

        quota::check_quota(&txn, new.owner_id, self.policy.max_active_per_user, now).await?;

        let scope = match new.prasarana_id {
            Some(id) => conflicts::ReservationScope::Prasarana(id),
            None => conflicts::ReservationScope::Location(
                new.location_text.clone().unwrap_or_default(),
            ),
        };
        let hit =
            conflicts::find_place_conflict(&txn, &scope, new.start_at, new.end_at, None, None, now)
                .await?;
        let conflict_note = hit.as_ref().map(|h| h.note());

        let model = marking::ActiveModel {
            owner_id: Set(new.owner_id),
            prasarana_id: Set(new.prasarana_id),
            location_text: Set(new.location_text.clone()),
            start_at: Set(new.start_at),
            end_at: Set(new.end_at),
            participants: Set(new.participants),
            expires_at: Set(now + Duration::days(duration_days)),
            planned_submit_by: Set(new.planned_submit_by),
            status: Set(MarkingStatus::Active.as_str().to_string()),
            notes: Set(new.notes.clone()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok((model, conflict_note))
    }

    /// Returns the marking with its effective status projected, so an active
    /// row past expiry reads as expired even before the sweep touches it.
    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Option<marking::Model>, ServiceError> {
        let Some(mut model) = MarkingEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
        else {
            return Ok(None);
        };
        model.status = model.effective_status(Utc::now()).as_str().to_string();
        Ok(Some(model))
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        limit: u64,
        status_filter: Option<&str>,
        owner_filter: Option<Uuid>,
    ) -> Result<(Vec<marking::Model>, u64), ServiceError> {
        if page == 0 {
            return Err(ServiceError::ValidationError(
                "Page number must be greater than 0".to_string(),
            ));
        }
        if limit == 0 || limit > 1000 {
            return Err(ServiceError::ValidationError(
                "Limit must be between 1 and 1000".to_string(),
            ));
        }

        let mut query = MarkingEntity::find();
        if let Some(status) = status_filter {
            if MarkingStatus::from_str(status).is_none() {
                return Err(ServiceError::ValidationError(format!(
                    "unknown status filter: {}",
                    status
                )));
            }
            query = query.filter(marking::Column::Status.eq(status));
        }
        if let Some(owner) = owner_filter {
            query = query.filter(marking::Column::OwnerId.eq(owner));
        }
        query = query.order_by_desc(marking::Column::CreatedAt);

        let paginator = query.paginate(&*self.db, limit);
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let mut models = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        let now = Utc::now();
        for model in &mut models {
            model.status = model.effective_status(now).as_str().to_string();
        }
        Ok((models, total))
    }

    /// Pushes `expires_at` forward by `extra_days`. Extension is monotonic,
    /// capped per call, and applies only while the hold is still live; the
    /// guarded update makes a race with the sweep a clean loss.
    #[instrument(skip(self))]
    pub async fn extend(
        &self,
        id: Uuid,
        actor_id: Uuid,
        extra_days: i64,
    ) -> Result<marking::Model, ServiceError> {
        if extra_days < 1 || extra_days > self.policy.max_extension_days {
            return Err(ServiceError::ValidationError(format!(
                "extension must be between 1 and {} days",
                self.policy.max_extension_days
            )));
        }

        let now = Utc::now();
        let model = MarkingEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Marking {} not found", id)))?;

        if model.owner_id != actor_id {
            return Err(ServiceError::AuthorizationError(
                "only the owner may extend this hold".to_string(),
            ));
        }
        if !model.is_live(now) {
            return Err(ServiceError::StateError(format!(
                "marking {} is {}, only a live hold can be extended",
                id,
                model.effective_status(now).as_str()
            )));
        }

        let new_expires_at = model.expires_at + Duration::days(extra_days);
        let result = MarkingEntity::update_many()
            .col_expr(marking::Column::ExpiresAt, Expr::value(new_expires_at))
            .col_expr(marking::Column::UpdatedAt, Expr::value(now))
            .filter(marking::Column::Id.eq(id))
            .filter(marking::Column::Status.eq(MarkingStatus::Active.as_str()))
            .filter(marking::Column::ExpiresAt.gt(now))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::StateError(format!(
                "marking {} is no longer live",
                id
            )));
        }

        info!(marking_id = %id, %new_expires_at, "Marking extended");
        self.event_sender
            .send(Event::MarkingExtended {
                marking_id: id,
                new_expires_at,
            })
            .await
            .map_err(ServiceError::EventError)?;

        self.fetch(id).await
    }

    /// Converts a live hold into a confirmed request. The flip to `converted`
    /// and the full submission (quota, conflicts, items, approval gates)
    /// happen in one transaction; losing the expiry race rolls everything
    /// back.
    #[instrument(skip(self, input))]
    pub async fn convert(
        &self,
        id: Uuid,
        actor_id: Uuid,
        input: ConversionInput,
    ) -> Result<SubmittedPeminjaman, ServiceError> {
        let mut attempt = 0;
        let submitted = loop {
            match self.convert_in_txn(id, actor_id, &input).await {
                Err(err) if is_serialization_failure(&err) && attempt < SERIALIZATION_RETRIES => {
                    attempt += 1;
                    warn!(attempt, "conversion lost a serialization race, retrying");
                }
                result => break result?,
            }
        };

        info!(
            marking_id = %id,
            peminjaman_id = %submitted.peminjaman.id,
            "Marking converted"
        );
        self.event_sender
            .send(Event::MarkingConverted {
                marking_id: id,
                peminjaman_id: submitted.peminjaman.id,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(submitted)
    }

    async fn convert_in_txn(
        &self,
        id: Uuid,
        actor_id: Uuid,
        input: &ConversionInput,
    ) -> Result<SubmittedPeminjaman, ServiceError> {
        let now = Utc::now();
        let txn = begin_serializable(&self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let model = MarkingEntity::find_by_id(id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Marking {} not found", id)))?;
        if model.owner_id != actor_id {
            return Err(ServiceError::AuthorizationError(
                "only the owner may convert this hold".to_string(),
            ));
        }

        let result = MarkingEntity::update_many()
            .col_expr(
                marking::Column::Status,
                Expr::value(MarkingStatus::Converted.as_str()),
            )
            .col_expr(marking::Column::UpdatedAt, Expr::value(now))
            .filter(marking::Column::Id.eq(id))
            .filter(marking::Column::Status.eq(MarkingStatus::Active.as_str()))
            .filter(marking::Column::ExpiresAt.gt(now))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::StateError(format!(
                "marking {} is {}, only a live hold can be converted",
                id,
                model.effective_status(now).as_str()
            )));
        }

        let submitted = peminjaman::submit_in_txn(
            &txn,
            peminjaman::NewPeminjaman {
                owner_id: model.owner_id,
                prasarana_id: model.prasarana_id,
                location_text: model.location_text.clone(),
                start_at: model.start_at,
                end_at: model.end_at,
                participants: model.participants,
                document_ref: input.document_ref.clone(),
                marking_id: Some(id),
                items: input.items.clone(),
            },
            &self.policy,
            now,
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(submitted)
    }

    /// Cancels a live hold. Terminal holds cannot be cancelled.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: Uuid, actor_id: Uuid) -> Result<marking::Model, ServiceError> {
        let now = Utc::now();
        let model = MarkingEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Marking {} not found", id)))?;
        if model.owner_id != actor_id {
            return Err(ServiceError::AuthorizationError(
                "only the owner may cancel this hold".to_string(),
            ));
        }

        let result = MarkingEntity::update_many()
            .col_expr(
                marking::Column::Status,
                Expr::value(MarkingStatus::Cancelled.as_str()),
            )
            .col_expr(marking::Column::UpdatedAt, Expr::value(now))
            .filter(marking::Column::Id.eq(id))
            .filter(marking::Column::Status.eq(MarkingStatus::Active.as_str()))
            .filter(marking::Column::ExpiresAt.gt(now))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::StateError(format!(
                "marking {} is {}, only a live hold can be cancelled",
                id,
                model.effective_status(now).as_str()
            )));
        }

        info!(marking_id = %id, "Marking cancelled");
        self.event_sender
            .send(Event::MarkingCancelled(id))
            .await
            .map_err(ServiceError::EventError)?;

        self.fetch(id).await
    }

    /// Flips every active hold past its expiry to `expired`. Each row is a
    /// separate guarded update, so a hold converted or cancelled mid-sweep is
    /// skipped rather than clobbered. Never fails the caller; returns the
    /// flip count.
    #[instrument(skip(self))]
    pub async fn expire_sweep(&self) -> Result<u64, ServiceError> {
        let now = Utc::now();
        let stale = MarkingEntity::find()
            .filter(marking::Column::Status.eq(MarkingStatus::Active.as_str()))
            .filter(marking::Column::ExpiresAt.lte(now))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut expired = 0u64;
        for model in &stale {
            let result = MarkingEntity::update_many()
                .col_expr(
                    marking::Column::Status,
                    Expr::value(MarkingStatus::Expired.as_str()),
                )
                .col_expr(marking::Column::UpdatedAt, Expr::value(now))
                .filter(marking::Column::Id.eq(model.id))
                .filter(marking::Column::Status.eq(MarkingStatus::Active.as_str()))
                .filter(marking::Column::ExpiresAt.lte(now))
                .exec(&*self.db)
                .await;
            match result {
                Ok(r) => expired += r.rows_affected,
                Err(err) => {
                    warn!(marking_id = %model.id, error = %err, "Sweep skipped a hold");
                }
            }
        }

        if expired > 0 {
            info!(count = expired, "Expired markings swept");
            self.event_sender
                .send(Event::MarkingsExpired { count: expired })
                .await
                .map_err(ServiceError::EventError)?;
        }
        Ok(expired)
    }

    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<MarkingStats, ServiceError> {
        let db = &*self.db;
        let now = Utc::now();

        let total = MarkingEntity::find()
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        let live = MarkingEntity::find()
            .filter(marking::Column::Status.eq(MarkingStatus::Active.as_str()))
            .filter(marking::Column::ExpiresAt.gt(now))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        let converted = MarkingEntity::find()
            .filter(marking::Column::Status.eq(MarkingStatus::Converted.as_str()))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        // Rows already flipped plus active rows the sweep has not reached yet.
        let expired_flipped = MarkingEntity::find()
            .filter(marking::Column::Status.eq(MarkingStatus::Expired.as_str()))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        let expired_pending_sweep = MarkingEntity::find()
            .filter(marking::Column::Status.eq(MarkingStatus::Active.as_str()))
            .filter(marking::Column::ExpiresAt.lte(now))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(MarkingStats {
            total,
            live,
            converted,
            expired: expired_flipped + expired_pending_sweep,
            stats_at: now,
        })
    }

    async fn fetch(&self, id: Uuid) -> Result<marking::Model, ServiceError> {
        MarkingEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::InternalError(format!("marking {} vanished", id)))
    }
}
