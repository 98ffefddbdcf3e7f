//! Peminjaman lifecycle: the envelope state machine over the approval
//! workflow and the custody tracker, plus submission.
//!
//! Valid edges: pending -> approved | rejected | cancelled,
//! approved -> picked_up | cancelled, picked_up -> returned. Status is only
//! ever mutated through [`transition_with`], which performs a guarded update
//! so a concurrent writer loses cleanly with a `StateError`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait, UpdateMany,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::ReservationPolicy;
use crate::db::{begin_serializable, is_serialization_failure, SERIALIZATION_RETRIES};
use crate::entities::{
    approval_step,
    peminjaman::{self, Entity as PeminjamanEntity, PeminjamanStatus},
    peminjaman_item::{self, Entity as PeminjamanItemEntity},
    sarana::Entity as SaranaEntity,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::{approvals, conflicts, custody, quota};

/// The lifecycle transition table. Everything not listed here is invalid.
pub fn is_valid_transition(from: PeminjamanStatus, to: PeminjamanStatus) -> bool {
    use PeminjamanStatus::*;
    matches!(
        (from, to),
        (Pending, Approved)
            | (Pending, Rejected)
            | (Pending, Cancelled)
            | (Approved, PickedUp)
            | (Approved, Cancelled)
            | (PickedUp, Returned)
    )
}

/// Guarded status transition: refuses edges outside the table and updates the
/// row only while it still holds `from`. `rows_affected == 0` means another
/// writer got there first and surfaces as a `StateError`, never a lost update.
/// `extra` stamps additional columns in the same statement.
pub(crate) async fn transition_with<C, F>(
    conn: &C,
    id: Uuid,
    from: PeminjamanStatus,
    to: PeminjamanStatus,
    extra: F,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
    F: FnOnce(UpdateMany<PeminjamanEntity>) -> UpdateMany<PeminjamanEntity>,
{
    if !is_valid_transition(from, to) {
        return Err(ServiceError::InvalidTransition(format!(
            "peminjaman {}: {} -> {}",
            id,
            from.as_str(),
            to.as_str()
        )));
    }

    let update = PeminjamanEntity::update_many()
        .col_expr(peminjaman::Column::Status, Expr::value(to.as_str()))
        .col_expr(peminjaman::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(peminjaman::Column::Id.eq(id))
        .filter(peminjaman::Column::Status.eq(from.as_str()));

    let result = extra(update).exec(conn).await.map_err(ServiceError::db_error)?;
    if result.rows_affected == 0 {
        return Err(ServiceError::StateError(format!(
            "peminjaman {} is no longer {}",
            id,
            from.as_str()
        )));
    }
    Ok(())
}

/// One requested equipment line.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewItem {
    pub sarana_id: Uuid,
    pub quantity: i32,
}

/// Input for a new confirmed request, either submitted directly or seeded
/// from a converted marking.
#[derive(Debug, Clone)]
pub struct NewPeminjaman {
    pub owner_id: Uuid,
    pub prasarana_id: Option<Uuid>,
    pub location_text: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub participants: i32,
    pub document_ref: Option<String>,
    pub marking_id: Option<Uuid>,
    pub items: Vec<NewItem>,
}

/// Result of a submission: the pending request, its generated approval gates,
/// and the conflict flag when another live record overlaps.
#[derive(Debug, Clone)]
pub struct SubmittedPeminjaman {
    pub peminjaman: peminjaman::Model,
    pub items: Vec<peminjaman_item::Model>,
    pub steps: Vec<approval_step::Model>,
    pub conflict: Option<conflicts::ConflictNote>,
}

/// Submission core, run inside the caller's transaction so quota check,
/// conflict stamping, inserts and step generation commit or roll back as one.
pub(crate) async fn submit_in_txn<C: ConnectionTrait>(
    txn: &C,
    new: NewPeminjaman,
    policy: &ReservationPolicy,
    now: DateTime<Utc>,
) -> Result<SubmittedPeminjaman, ServiceError> {
    if new.end_at <= new.start_at {
        return Err(ServiceError::ValidationError(
            "end must be after start".to_string(),
        ));
    }
    let has_location = new
        .location_text
        .as_deref()
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false);
    if new.prasarana_id.is_none() && !has_location && new.items.is_empty() {
        return Err(ServiceError::ValidationError(
            "a place, a custom location, or at least one equipment item is required".to_string(),
        ));
    }
    if new.participants < 0 {
        return Err(ServiceError::ValidationError(
            "participants cannot be negative".to_string(),
        ));
    }
    for item in &new.items {
        if item.quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "quantity for sarana {} must be at least 1",
                item.sarana_id
            )));
        }
        let sarana = SaranaEntity::find_by_id(item.sarana_id)
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("sarana {} not found", item.sarana_id))
            })?;
        if !sarana.is_active {
            return Err(ServiceError::ValidationError(format!(
                "sarana {} is not available for booking",
                sarana.code
            )));
        }
    }

    quota::check_quota(txn, new.owner_id, policy.max_active_per_user, now).await?;

    // Conflicts are flagged, not blocked: the first overlapping live record
    // decides the group this request joins.
    let place_scope = if let Some(id) = new.prasarana_id {
        Some(conflicts::ReservationScope::Prasarana(id))
    } else if has_location {
        new.location_text
            .clone()
            .map(conflicts::ReservationScope::Location)
    } else {
        None
    };

    let mut hit = None;
    if let Some(scope) = &place_scope {
        hit = conflicts::find_place_conflict(
            txn,
            scope,
            new.start_at,
            new.end_at,
            new.marking_id,
            None,
            now,
        )
        .await?;
    }
    if hit.is_none() {
        for item in &new.items {
            hit = conflicts::find_sarana_conflict(
                txn,
                item.sarana_id,
                new.start_at,
                new.end_at,
                None,
            )
            .await?;
            if hit.is_some() {
                break;
            }
        }
    }

    let (conflict_group, conflict_note) = match &hit {
        Some(hit) => (
            Some(conflicts::join_conflict_group(txn, hit).await?),
            Some(hit.note()),
        ),
        None => (None, None),
    };

    let model = peminjaman::ActiveModel {
        owner_id: Set(new.owner_id),
        prasarana_id: Set(new.prasarana_id),
        location_text: Set(new.location_text.clone()),
        start_at: Set(new.start_at),
        end_at: Set(new.end_at),
        participants: Set(new.participants),
        status: Set(PeminjamanStatus::Pending.as_str().to_string()),
        conflict_group: Set(conflict_group),
        document_ref: Set(new.document_ref.clone()),
        marking_id: Set(new.marking_id),
        ..Default::default()
    }
    .insert(txn)
    .await
    .map_err(ServiceError::db_error)?;

    let mut items = Vec::with_capacity(new.items.len());
    for item in &new.items {
        let inserted = peminjaman_item::ActiveModel {
            peminjaman_id: Set(model.id),
            sarana_id: Set(item.sarana_id),
            quantity: Set(item.quantity),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(ServiceError::db_error)?;
        items.push(inserted);
    }

    let sarana_ids: Vec<Uuid> = items.iter().map(|i| i.sarana_id).collect();
    let steps = approvals::build_steps_in_txn(txn, &model, &sarana_ids).await?;

    Ok(SubmittedPeminjaman {
        peminjaman: model,
        items,
        steps,
        conflict: conflict_note,
    })
}

/// Statistics over confirmed requests.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PeminjamanStats {
    pub total: u64,
    pub live: u64,
    pub awaiting_approval: u64,
    pub in_custody: u64,
    pub flagged_conflicts: u64,
    pub stats_at: DateTime<Utc>,
}

/// Service for confirmed requests: submission, queries and cancellation.
#[derive(Clone)]
pub struct PeminjamanService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    policy: ReservationPolicy,
}

impl PeminjamanService {
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

    /// Submits a new request. It lands in `pending` with its full approval
    /// gate set; overlap with live records flags a conflict group instead of
    /// failing.
    #[instrument(skip(self, new), fields(owner_id = %new.owner_id))]
    pub async fn submit(&self, new: NewPeminjaman) -> Result<SubmittedPeminjaman, ServiceError> {
        let mut attempt = 0;
        let submitted = loop {
            match self.submit_once(new.clone()).await {
                Err(err) if is_serialization_failure(&err) && attempt < SERIALIZATION_RETRIES => {
                    attempt += 1;
                    warn!(attempt, "submission lost a serialization race, retrying");
                }
                result => break result?,
            }
        };

        info!(
            peminjaman_id = %submitted.peminjaman.id,
            steps = submitted.steps.len(),
            conflict = submitted.conflict.is_some(),
            "Peminjaman submitted"
        );
        self.event_sender
            .send(Event::PeminjamanSubmitted {
                peminjaman_id: submitted.peminjaman.id,
                owner_id: submitted.peminjaman.owner_id,
                conflict_group: submitted.peminjaman.conflict_group.clone(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(submitted)
    }

    /// Quota check, conflict stamping, inserts and gate generation as one
    /// serializable unit, so two concurrent submissions for the same user
    /// cannot both pass the ceiling.
    async fn submit_once(&self, new: NewPeminjaman) -> Result<SubmittedPeminjaman, ServiceError> {
        let txn = begin_serializable(&self.db)
            .await
            .map_err(ServiceError::db_error)?;
        let submitted = submit_in_txn(&txn, new, &self.policy, Utc::now()).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(submitted)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Option<peminjaman::Model>, ServiceError> {
        PeminjamanEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn get_with_items(
        &self,
        id: Uuid,
    ) -> Result<Option<(peminjaman::Model, Vec<peminjaman_item::Model>)>, ServiceError> {
        let Some(model) = self.get(id).await? else {
            return Ok(None);
        };
        let items = PeminjamanItemEntity::find()
            .filter(peminjaman_item::Column::PeminjamanId.eq(id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(Some((model, items)))
    }

    /// Lists requests with pagination and optional filters.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        limit: u64,
        status_filter: Option<&str>,
        owner_filter: Option<Uuid>,
    ) -> Result<(Vec<peminjaman::Model>, u64), ServiceError> {
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

        let mut query = PeminjamanEntity::find();
        if let Some(status) = status_filter {
            if PeminjamanStatus::from_str(status).is_none() {
                return Err(ServiceError::ValidationError(format!(
                    "unknown status filter: {}",
                    status
                )));
            }
            query = query.filter(peminjaman::Column::Status.eq(status));
        }
        if let Some(owner) = owner_filter {
            query = query.filter(peminjaman::Column::OwnerId.eq(owner));
        }
        query = query.order_by_desc(peminjaman::Column::CreatedAt);

        let paginator = query.paginate(&*self.db, limit);
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let models = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((models, total))
    }

    /// Cancels a request from `pending` or `approved`, releasing any custody
    /// grants. Only the owner may cancel unless the caller passed an
    /// override-permitted actor through the gateway.
    #[instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        id: Uuid,
        actor_id: Uuid,
        reason: String,
        by_override: bool,
    ) -> Result<peminjaman::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let model = PeminjamanEntity::find_by_id(id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Peminjaman {} not found", id)))?;

        if !by_override && model.owner_id != actor_id {
            return Err(ServiceError::AuthorizationError(
                "only the owner may cancel this request".to_string(),
            ));
        }

        let current = PeminjamanStatus::from_str(&model.status).ok_or_else(|| {
            ServiceError::InternalError(format!("corrupt status on peminjaman {}", id))
        })?;
        if !matches!(
            current,
            PeminjamanStatus::Pending | PeminjamanStatus::Approved
        ) {
            return Err(ServiceError::StateError(format!(
                "peminjaman {} cannot be cancelled from {}",
                id,
                current.as_str()
            )));
        }

        custody::release_assignments_in_txn(&txn, id).await?;

        let now = Utc::now();
        let reason_clone = reason.clone();
        transition_with(&txn, id, current, PeminjamanStatus::Cancelled, move |q| {
            q.col_expr(peminjaman::Column::CancelReason, Expr::value(reason_clone))
                .col_expr(peminjaman::Column::CancelledBy, Expr::value(actor_id))
                .col_expr(peminjaman::Column::CancelledAt, Expr::value(now))
        })
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(peminjaman_id = %id, actor = %actor_id, "Peminjaman cancelled");
        self.event_sender
            .send(Event::PeminjamanCancelled {
                peminjaman_id: id,
                actor_id,
            })
            .await
            .map_err(ServiceError::EventError)?;

        self.get(id)
            .await?
            .ok_or_else(|| ServiceError::InternalError(format!("peminjaman {} vanished", id)))
    }

    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<PeminjamanStats, ServiceError> {
        let db = &*self.db;
        let now = Utc::now();

        let total = PeminjamanEntity::find()
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        let live = PeminjamanEntity::find()
            .filter(peminjaman::Column::Status.is_in(PeminjamanStatus::live_strs()))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        let awaiting = PeminjamanEntity::find()
            .filter(peminjaman::Column::Status.eq(PeminjamanStatus::Pending.as_str()))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        let in_custody = PeminjamanEntity::find()
            .filter(peminjaman::Column::Status.eq(PeminjamanStatus::PickedUp.as_str()))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        let flagged = PeminjamanEntity::find()
            .filter(peminjaman::Column::ConflictGroup.is_not_null())
            .filter(peminjaman::Column::Status.is_in(PeminjamanStatus::live_strs()))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(PeminjamanStats {
            total,
            live,
            awaiting_approval: awaiting,
            in_custody,
            flagged_conflicts: flagged,
            stats_at: now,
        })
    }
}
