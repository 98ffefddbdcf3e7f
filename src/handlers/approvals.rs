use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::approval_step::ApprovalDecision;
use crate::errors::ServiceError;
use crate::services::approvals::DecisionOutcome;
use crate::{ApiResponse, ApiResult, AppState};

use super::peminjaman::StepDto;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/approvals/steps/:id/decide", post(decide_step))
        .route("/approvals/steps/:id/override", post(override_step))
        .route("/approvals/queue/:approver_id", get(approver_queue))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DecideStepRequest {
    pub actor_id: Uuid,
    /// "approved" or "rejected"
    pub decision: String,
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
}

/// Outcome of a decision: the decided step and the request status it left
/// behind.
#[derive(Debug, Serialize, ToSchema)]
pub struct DecisionDto {
    pub step: StepDto,
    pub peminjaman_status: String,
    pub out_of_order: bool,
}

impl From<DecisionOutcome> for DecisionDto {
    fn from(o: DecisionOutcome) -> Self {
        Self {
            step: o.step.into(),
            peminjaman_status: o.peminjaman_status.as_str().to_string(),
            out_of_order: o.out_of_order,
        }
    }
}

fn parse_decision(raw: &str) -> Result<ApprovalDecision, ServiceError> {
    match ApprovalDecision::from_str(raw) {
        Some(ApprovalDecision::Pending) | None => Err(ServiceError::ValidationError(format!(
            "decision must be approved or rejected, got {}",
            raw
        ))),
        Some(decision) => Ok(decision),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/approvals/steps/{id}/decide",
    request_body = DecideStepRequest,
    responses(
        (status = 200, description = "Decision recorded"),
        (status = 403, description = "Actor is not the assigned approver"),
        (status = 409, description = "Step already decided or request no longer pending")
    ),
    tag = "approvals"
)]
pub async fn decide_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DecideStepRequest>,
) -> ApiResult<DecisionDto> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
    let decision = parse_decision(&payload.decision)?;

    let outcome = state
        .services
        .approvals
        .process_approval(id, payload.actor_id, decision, payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(outcome.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/approvals/steps/{id}/override",
    request_body = DecideStepRequest,
    responses(
        (status = 200, description = "Decision recorded on behalf of the assigned approver"),
        (status = 409, description = "Step already decided or request no longer pending")
    ),
    tag = "approvals"
)]
pub async fn override_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DecideStepRequest>,
) -> ApiResult<DecisionDto> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
    let decision = parse_decision(&payload.decision)?;

    let outcome = state
        .services
        .approvals
        .override_approval(id, payload.actor_id, decision, payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(outcome.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/approvals/queue/{approver_id}",
    responses((status = 200, description = "Pending steps actionable by the approver now")),
    tag = "approvals"
)]
pub async fn approver_queue(
    State(state): State<AppState>,
    Path(approver_id): Path<Uuid>,
) -> ApiResult<Vec<StepDto>> {
    let steps = state
        .services
        .approvals
        .actionable_steps_for(approver_id)
        .await?;
    Ok(Json(ApiResponse::success(
        steps.into_iter().map(StepDto::from).collect(),
    )))
}
