//! Multi-level approval workflow.
//!
//! Gates are generated in bulk at submission from the active approver roster:
//! one step per global level, plus one step per level per referenced resource
//! that has active specific approvers. A rejection at any gate terminates the
//! request; the last approval flips it to approved. Decisions are final, and
//! a decision landing ahead of a lower pending level of the same chain is
//! accepted but flagged.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::{
    approval_step::{self, ApprovalDecision, ApprovalType, Entity as StepEntity},
    global_approver::{self, Entity as GlobalApproverEntity},
    peminjaman::{self, Entity as PeminjamanEntity, PeminjamanStatus},
    resource_approver::{self, Entity as ResourceApproverEntity, RESOURCE_PRASARANA, RESOURCE_SARANA},
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::peminjaman::transition_with;

/// Builds the full gate set for a freshly submitted request. Runs inside the
/// submission transaction; a request is never visible without its gates.
///
/// Levels with several active approvers get the longest-standing assignment.
/// A resource with no active specific approvers contributes no gate.
pub(crate) async fn build_steps_in_txn<C: ConnectionTrait>(
    txn: &C,
    request: &peminjaman::Model,
    sarana_ids: &[Uuid],
) -> Result<Vec<approval_step::Model>, ServiceError> {
    let mut steps = Vec::new();

    let globals = GlobalApproverEntity::find()
        .filter(global_approver::Column::IsActive.eq(true))
        .order_by_asc(global_approver::Column::Level)
        .order_by_asc(global_approver::Column::CreatedAt)
        .all(txn)
        .await
        .map_err(ServiceError::db_error)?;
    let mut per_level: BTreeMap<i32, Uuid> = BTreeMap::new();
    for approver in globals {
        per_level.entry(approver.level).or_insert(approver.user_id);
    }
    // Roster levels may be gapped; gates are numbered contiguously from 1 in
    // roster-level order.
    for (ordinal, (_, user_id)) in per_level.into_iter().enumerate() {
        let step = approval_step::ActiveModel {
            peminjaman_id: Set(request.id),
            approval_type: Set(ApprovalType::Global.as_str().to_string()),
            level: Set(ordinal as i32 + 1),
            resource_type: Set(None),
            resource_id: Set(None),
            approver_id: Set(user_id),
            decision: Set(ApprovalDecision::Pending.as_str().to_string()),
            out_of_order: Set(false),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(ServiceError::db_error)?;
        steps.push(step);
    }

    let mut resources: Vec<(&str, Uuid)> = Vec::new();
    if let Some(place) = request.prasarana_id {
        resources.push((RESOURCE_PRASARANA, place));
    }
    for sarana_id in sarana_ids {
        resources.push((RESOURCE_SARANA, *sarana_id));
    }

    for (resource_type, resource_id) in resources {
        let specific = ResourceApproverEntity::find()
            .filter(resource_approver::Column::ResourceType.eq(resource_type))
            .filter(resource_approver::Column::ResourceId.eq(resource_id))
            .filter(resource_approver::Column::IsActive.eq(true))
            .order_by_asc(resource_approver::Column::Level)
            .order_by_asc(resource_approver::Column::CreatedAt)
            .all(txn)
            .await
            .map_err(ServiceError::db_error)?;
        let mut per_level: BTreeMap<i32, Uuid> = BTreeMap::new();
        for approver in specific {
            per_level.entry(approver.level).or_insert(approver.user_id);
        }
        for (ordinal, (_, user_id)) in per_level.into_iter().enumerate() {
            let step = approval_step::ActiveModel {
                peminjaman_id: Set(request.id),
                approval_type: Set(ApprovalType::Resource.as_str().to_string()),
                level: Set(ordinal as i32 + 1),
                resource_type: Set(Some(resource_type.to_string())),
                resource_id: Set(Some(resource_id)),
                approver_id: Set(user_id),
                decision: Set(ApprovalDecision::Pending.as_str().to_string()),
                out_of_order: Set(false),
                ..Default::default()
            }
            .insert(txn)
            .await
            .map_err(ServiceError::db_error)?;
            steps.push(step);
        }
    }

    Ok(steps)
}

/// Result of applying one decision.
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub step: approval_step::Model,
    /// Status of the request after this decision.
    pub peminjaman_status: PeminjamanStatus,
    /// True when the decision arrived ahead of a lower pending level.
    pub out_of_order: bool,
}

#[derive(Clone)]
pub struct ApprovalService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl ApprovalService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Applies the assigned approver's decision to a step.
    #[instrument(skip(self, reason))]
    pub async fn process_approval(
        &self,
        step_id: Uuid,
        actor_id: Uuid,
        decision: ApprovalDecision,
        reason: Option<String>,
    ) -> Result<DecisionOutcome, ServiceError> {
        self.decide(step_id, actor_id, decision, reason, false).await
    }

    /// Applies a decision on behalf of the assigned approver. The gateway
    /// vouches for the actor's override permission; the step keeps its
    /// assigned approver and records who actually decided.
    #[instrument(skip(self, reason))]
    pub async fn override_approval(
        &self,
        step_id: Uuid,
        actor_id: Uuid,
        decision: ApprovalDecision,
        reason: Option<String>,
    ) -> Result<DecisionOutcome, ServiceError> {
        self.decide(step_id, actor_id, decision, reason, true).await
    }

    async fn decide(
        &self,
        step_id: Uuid,
        actor_id: Uuid,
        decision: ApprovalDecision,
        reason: Option<String>,
        by_override: bool,
    ) -> Result<DecisionOutcome, ServiceError> {
        if decision == ApprovalDecision::Pending {
            return Err(ServiceError::ValidationError(
                "decision must be approved or rejected".to_string(),
            ));
        }
        if decision == ApprovalDecision::Rejected
            && reason.as_deref().map(str::trim).unwrap_or("").is_empty()
        {
            return Err(ServiceError::ValidationError(
                "a rejection requires a reason".to_string(),
            ));
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let step = StepEntity::find_by_id(step_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Approval step {} not found", step_id)))?;

        if ApprovalDecision::from_str(&step.decision) != Some(ApprovalDecision::Pending) {
            return Err(ServiceError::StateError(format!(
                "step {} has already been decided",
                step_id
            )));
        }
        if !by_override && step.approver_id != actor_id {
            return Err(ServiceError::AuthorizationError(
                "actor is not the assigned approver for this step".to_string(),
            ));
        }

        let request = PeminjamanEntity::find_by_id(step.peminjaman_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "step {} references missing peminjaman {}",
                    step_id, step.peminjaman_id
                ))
            })?;
        if PeminjamanStatus::from_str(&request.status) != Some(PeminjamanStatus::Pending) {
            return Err(ServiceError::StateError(format!(
                "peminjaman {} is not awaiting approval",
                request.id
            )));
        }

        let out_of_order = self.has_lower_pending(&txn, &step).await?;
        if out_of_order {
            warn!(
                step_id = %step_id,
                level = step.level,
                "decision accepted ahead of a lower pending level"
            );
        }

        // Guarded update: losing a decision race surfaces as already-decided.
        let now = Utc::now();
        let result = StepEntity::update_many()
            .col_expr(
                approval_step::Column::Decision,
                Expr::value(decision.as_str()),
            )
            .col_expr(approval_step::Column::Reason, Expr::value(reason.clone()))
            .col_expr(
                approval_step::Column::OverriddenBy,
                Expr::value(by_override.then_some(actor_id)),
            )
            .col_expr(approval_step::Column::OutOfOrder, Expr::value(out_of_order))
            .col_expr(approval_step::Column::DecidedAt, Expr::value(now))
            .col_expr(approval_step::Column::UpdatedAt, Expr::value(now))
            .filter(approval_step::Column::Id.eq(step_id))
            .filter(approval_step::Column::Decision.eq(ApprovalDecision::Pending.as_str()))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::StateError(format!(
                "step {} has already been decided",
                step_id
            )));
        }

        let peminjaman_status = match decision {
            ApprovalDecision::Rejected => {
                // History is preserved: remaining pending steps stay pending.
                let reason_text = reason.clone().unwrap_or_default();
                transition_with(
                    &txn,
                    request.id,
                    PeminjamanStatus::Pending,
                    PeminjamanStatus::Rejected,
                    |q| {
                        q.col_expr(
                            peminjaman::Column::RejectionReason,
                            Expr::value(reason_text),
                        )
                    },
                )
                .await?;
                PeminjamanStatus::Rejected
            }
            ApprovalDecision::Approved => {
                let remaining = StepEntity::find()
                    .filter(approval_step::Column::PeminjamanId.eq(request.id))
                    .filter(
                        approval_step::Column::Decision
                            .eq(ApprovalDecision::Pending.as_str()),
                    )
                    .count(&txn)
                    .await
                    .map_err(ServiceError::db_error)?;
                if remaining == 0 {
                    transition_with(
                        &txn,
                        request.id,
                        PeminjamanStatus::Pending,
                        PeminjamanStatus::Approved,
                        |q| q,
                    )
                    .await?;
                    PeminjamanStatus::Approved
                } else {
                    PeminjamanStatus::Pending
                }
            }
            ApprovalDecision::Pending => unreachable!("rejected above"),
        };

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            step_id = %step_id,
            peminjaman_id = %request.id,
            decision = decision.as_str(),
            overridden = by_override,
            "Approval decision recorded"
        );
        self.event_sender
            .send(Event::ApprovalDecided {
                step_id,
                peminjaman_id: request.id,
                actor_id,
                decision: decision.as_str().to_string(),
                overridden: by_override,
                out_of_order,
            })
            .await
            .map_err(ServiceError::EventError)?;
        match peminjaman_status {
            PeminjamanStatus::Approved => {
                self.event_sender
                    .send(Event::PeminjamanApproved(request.id))
                    .await
                    .map_err(ServiceError::EventError)?;
            }
            PeminjamanStatus::Rejected => {
                self.event_sender
                    .send(Event::PeminjamanRejected {
                        peminjaman_id: request.id,
                        reason: reason.unwrap_or_default(),
                    })
                    .await
                    .map_err(ServiceError::EventError)?;
            }
            _ => {}
        }

        let step = StepEntity::find_by_id(step_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::InternalError(format!("step {} vanished", step_id)))?;

        Ok(DecisionOutcome {
            step,
            peminjaman_status,
            out_of_order,
        })
    }

    /// True when a lower level of the same gate chain is still pending.
    async fn has_lower_pending<C: ConnectionTrait>(
        &self,
        conn: &C,
        step: &approval_step::Model,
    ) -> Result<bool, ServiceError> {
        let mut chain = Condition::all()
            .add(approval_step::Column::PeminjamanId.eq(step.peminjaman_id))
            .add(approval_step::Column::ApprovalType.eq(step.approval_type.clone()))
            .add(approval_step::Column::Level.lt(step.level))
            .add(approval_step::Column::Decision.eq(ApprovalDecision::Pending.as_str()));
        chain = match step.resource_id {
            Some(resource_id) => chain.add(approval_step::Column::ResourceId.eq(resource_id)),
            None => chain.add(approval_step::Column::ResourceId.is_null()),
        };

        let pending_below = StepEntity::find()
            .filter(chain)
            .count(conn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(pending_below > 0)
    }

    /// All steps of a request, ordered the way approvers see them.
    #[instrument(skip(self))]
    pub async fn steps_for(
        &self,
        peminjaman_id: Uuid,
    ) -> Result<Vec<approval_step::Model>, ServiceError> {
        StepEntity::find()
            .filter(approval_step::Column::PeminjamanId.eq(peminjaman_id))
            .order_by_asc(approval_step::Column::ApprovalType)
            .order_by_asc(approval_step::Column::ResourceId)
            .order_by_asc(approval_step::Column::Level)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Pending steps assigned to an approver that are actionable now, i.e.
    /// every lower level of the same chain is already approved. Skip-ahead
    /// decisions on the others are still accepted, just flagged.
    #[instrument(skip(self))]
    pub async fn actionable_steps_for(
        &self,
        approver_id: Uuid,
    ) -> Result<Vec<approval_step::Model>, ServiceError> {
        let pending = StepEntity::find()
            .filter(approval_step::Column::ApproverId.eq(approver_id))
            .filter(approval_step::Column::Decision.eq(ApprovalDecision::Pending.as_str()))
            .order_by_asc(approval_step::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut actionable = Vec::new();
        for step in pending {
            if !self.has_lower_pending(&*self.db, &step).await? {
                actionable.push(step);
            }
        }
        Ok(actionable)
    }
}
