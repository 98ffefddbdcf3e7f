use axum::{
    extract::{Path, State},
    response::Json,
    routing::{post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{sarana_unit::UnitStatus, unit_assignment};
use crate::errors::ServiceError;
use crate::services::custody::{AssignmentSpec, ReturnCondition};
use crate::{ApiResponse, ApiResult, AppState};

use super::peminjaman::PeminjamanDto;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/peminjaman/:id/assignments",
            post(assign_units).get(list_assignments),
        )
        .route("/peminjaman/:id/pickup", post(validate_pickup))
        .route("/peminjaman/:id/return", post(validate_return))
        .route("/units/:id/status", put(set_unit_status))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignUnitsRequest {
    #[serde(default)]
    pub specs: Vec<AssignmentSpec>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PickupRequest {
    pub actor_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub photo_ref: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReturnRequest {
    pub actor_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub photo_ref: String,
    #[serde(default)]
    pub conditions: Vec<ReturnCondition>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetUnitStatusRequest {
    /// available | damaged | maintenance | lost
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssignmentDto {
    pub id: Uuid,
    pub peminjaman_id: Uuid,
    pub item_id: Uuid,
    pub sarana_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub quantity: i32,
    pub released: bool,
    pub condition_on_return: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<unit_assignment::Model> for AssignmentDto {
    fn from(a: unit_assignment::Model) -> Self {
        Self {
            id: a.id,
            peminjaman_id: a.peminjaman_id,
            item_id: a.item_id,
            sarana_id: a.sarana_id,
            unit_id: a.unit_id,
            quantity: a.quantity,
            released: a.released,
            condition_on_return: a.condition_on_return,
            created_at: a.created_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/peminjaman/{id}/assignments",
    request_body = AssignUnitsRequest,
    responses(
        (status = 200, description = "Units bound to the approved request"),
        (status = 409, description = "Unit already out, or request not approved"),
        (status = 422, description = "Pooled stock insufficient")
    ),
    tag = "custody"
)]
pub async fn assign_units(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignUnitsRequest>,
) -> ApiResult<Vec<AssignmentDto>> {
    let assignments = state.services.custody.assign_units(id, payload.specs).await?;
    Ok(Json(ApiResponse::success(
        assignments.into_iter().map(AssignmentDto::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/peminjaman/{id}/assignments",
    responses((status = 200, description = "Custody rows of the request")),
    tag = "custody"
)]
pub async fn list_assignments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<AssignmentDto>> {
    let assignments = state.services.custody.assignments_for(id).await?;
    Ok(Json(ApiResponse::success(
        assignments.into_iter().map(AssignmentDto::from).collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/peminjaman/{id}/pickup",
    request_body = PickupRequest,
    responses(
        (status = 200, description = "Handover recorded, request in custody"),
        (status = 409, description = "Request not approved or units not assigned")
    ),
    tag = "custody"
)]
pub async fn validate_pickup(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PickupRequest>,
) -> ApiResult<PeminjamanDto> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
    let model = state
        .services
        .custody
        .validate_pickup(id, payload.actor_id, payload.photo_ref)
        .await?;
    Ok(Json(ApiResponse::success(model.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/peminjaman/{id}/return",
    request_body = ReturnRequest,
    responses(
        (status = 200, description = "Custody released, request closed"),
        (status = 409, description = "Request is not in custody")
    ),
    tag = "custody"
)]
pub async fn validate_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReturnRequest>,
) -> ApiResult<PeminjamanDto> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
    let model = state
        .services
        .custody
        .validate_return(id, payload.actor_id, payload.photo_ref, payload.conditions)
        .await?;
    Ok(Json(ApiResponse::success(model.into())))
}

#[utoipa::path(
    put,
    path = "/api/v1/units/{id}/status",
    request_body = SetUnitStatusRequest,
    responses(
        (status = 200, description = "Unit condition corrected"),
        (status = 409, description = "Unit is currently assigned")
    ),
    tag = "custody"
)]
pub async fn set_unit_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetUnitStatusRequest>,
) -> ApiResult<super::resources::UnitDto> {
    let status = UnitStatus::from_str(&payload.status).ok_or_else(|| {
        ServiceError::ValidationError(format!("unknown unit status: {}", payload.status))
    })?;
    let unit = state.services.custody.set_unit_status(id, status).await?;
    Ok(Json(ApiResponse::success(unit.into())))
}
