//! Admin surface for the bookable inventory: places (prasarana), equipment
//! (sarana) with their serialized units, and the approver roster the chain
//! builder reads.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::post,
    Router,
};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{
    global_approver, prasarana,
    resource_approver::{self, RESOURCE_PRASARANA, RESOURCE_SARANA},
    sarana::{self, TrackingType},
    sarana_unit::{self, UnitStatus},
};
use crate::errors::ServiceError;
use crate::{ApiResponse, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/prasarana", post(create_prasarana).get(list_prasarana))
        .route("/sarana", post(create_sarana).get(list_sarana))
        .route("/sarana/:id/units", post(create_unit).get(list_units))
        .route("/approvers/global", post(register_global_approver))
        .route("/approvers/resource", post(register_resource_approver))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePrasaranaRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub location: Option<String>,
    pub capacity: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PrasaranaDto {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub location: Option<String>,
    pub capacity: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<prasarana::Model> for PrasaranaDto {
    fn from(p: prasarana::Model) -> Self {
        Self {
            id: p.id,
            code: p.code,
            name: p.name,
            location: p.location,
            capacity: p.capacity,
            is_active: p.is_active,
            created_at: p.created_at,
        }
    }
}

pub async fn create_prasarana(
    State(state): State<AppState>,
    Json(payload): Json<CreatePrasaranaRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let model = prasarana::ActiveModel {
        code: Set(payload.code),
        name: Set(payload.name),
        location: Set(payload.location),
        capacity: Set(payload.capacity),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(&*state.db)
    .await
    .map_err(ServiceError::db_error)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(PrasaranaDto::from(model))),
    ))
}

pub async fn list_prasarana(State(state): State<AppState>) -> ApiResult<Vec<PrasaranaDto>> {
    let models = prasarana::Entity::find()
        .order_by_asc(prasarana::Column::Code)
        .all(&*state.db)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(Json(ApiResponse::success(
        models.into_iter().map(PrasaranaDto::from).collect(),
    )))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateSaranaRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// "pooled" or "serialized"
    pub tracking: String,
    /// Initial stock for pooled equipment; serialized stock grows as units
    /// are registered.
    #[serde(default)]
    #[validate(range(min = 0))]
    pub total_units: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SaranaDto {
    pub id: Uuid,
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
}

impl From<sarana::Model> for SaranaDto {
    fn from(s: sarana::Model) -> Self {
        Self {
            id: s.id,
            code: s.code,
            name: s.name,
            tracking: s.tracking,
            total_units: s.total_units,
            available_units: s.available_units,
            damaged_units: s.damaged_units,
            maintenance_units: s.maintenance_units,
            lost_units: s.lost_units,
            is_active: s.is_active,
            created_at: s.created_at,
        }
    }
}

pub async fn create_sarana(
    State(state): State<AppState>,
    Json(payload): Json<CreateSaranaRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
    let tracking = TrackingType::from_str(&payload.tracking).ok_or_else(|| {
        ServiceError::ValidationError(format!(
            "tracking must be pooled or serialized, got {}",
            payload.tracking
        ))
    })?;

    let (total, available) = match tracking {
        TrackingType::Pooled => (payload.total_units, payload.total_units),
        TrackingType::Serialized => (0, 0),
    };

    let model = sarana::ActiveModel {
        code: Set(payload.code),
        name: Set(payload.name),
        tracking: Set(tracking.as_str().to_string()),
        total_units: Set(total),
        available_units: Set(available),
        damaged_units: Set(0),
        maintenance_units: Set(0),
        lost_units: Set(0),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(&*state.db)
    .await
    .map_err(ServiceError::db_error)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(SaranaDto::from(model))),
    ))
}

pub async fn list_sarana(State(state): State<AppState>) -> ApiResult<Vec<SaranaDto>> {
    let models = sarana::Entity::find()
        .order_by_asc(sarana::Column::Code)
        .all(&*state.db)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(Json(ApiResponse::success(
        models.into_iter().map(SaranaDto::from).collect(),
    )))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUnitRequest {
    #[validate(length(min = 1, max = 64))]
    pub unit_code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnitDto {
    pub id: Uuid,
    pub sarana_id: Uuid,
    pub unit_code: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<sarana_unit::Model> for UnitDto {
    fn from(u: sarana_unit::Model) -> Self {
        Self {
            id: u.id,
            sarana_id: u.sarana_id,
            unit_code: u.unit_code,
            status: u.status,
            created_at: u.created_at,
        }
    }
}

/// Registers a serialized unit and bumps the owning sarana's totals.
pub async fn create_unit(
    State(state): State<AppState>,
    Path(sarana_id): Path<Uuid>,
    Json(payload): Json<CreateUnitRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let equipment = sarana::Entity::find_by_id(sarana_id)
        .one(&*state.db)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Sarana {} not found", sarana_id)))?;
    if equipment.tracking_type() != Some(TrackingType::Serialized) {
        return Err(ServiceError::ValidationError(format!(
            "sarana {} is pooled; it has no individual units",
            equipment.code
        )));
    }

    let unit = sarana_unit::ActiveModel {
        sarana_id: Set(sarana_id),
        unit_code: Set(payload.unit_code),
        status: Set(UnitStatus::Available.as_str().to_string()),
        ..Default::default()
    }
    .insert(&*state.db)
    .await
    .map_err(ServiceError::db_error)?;

    let total = equipment.total_units;
    let mut counters: sarana::ActiveModel = equipment.into();
    counters.total_units = Set(total + 1);
    counters.update(&*state.db).await.map_err(ServiceError::db_error)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(UnitDto::from(unit))),
    ))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UnitFilters {
    pub status: Option<String>,
}

pub async fn list_units(
    State(state): State<AppState>,
    Path(sarana_id): Path<Uuid>,
    Query(filters): Query<UnitFilters>,
) -> ApiResult<Vec<UnitDto>> {
    let mut query = sarana_unit::Entity::find()
        .filter(sarana_unit::Column::SaranaId.eq(sarana_id));
    if let Some(status) = &filters.status {
        if UnitStatus::from_str(status).is_none() {
            return Err(ServiceError::ValidationError(format!(
                "unknown unit status filter: {}",
                status
            )));
        }
        query = query.filter(sarana_unit::Column::Status.eq(status.as_str()));
    }
    let models = query
        .order_by_asc(sarana_unit::Column::UnitCode)
        .all(&*state.db)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(Json(ApiResponse::success(
        models.into_iter().map(UnitDto::from).collect(),
    )))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterGlobalApproverRequest {
    pub user_id: Uuid,
    #[validate(range(min = 1, max = 10))]
    pub level: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterResourceApproverRequest {
    /// "prasarana" or "sarana"
    pub resource_type: String,
    pub resource_id: Uuid,
    pub user_id: Uuid,
    #[validate(range(min = 1, max = 10))]
    pub level: i32,
}

pub async fn register_global_approver(
    State(state): State<AppState>,
    Json(payload): Json<RegisterGlobalApproverRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let model = global_approver::ActiveModel {
        user_id: Set(payload.user_id),
        level: Set(payload.level),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(&*state.db)
    .await
    .map_err(ServiceError::db_error)?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(model))))
}

pub async fn register_resource_approver(
    State(state): State<AppState>,
    Json(payload): Json<RegisterResourceApproverRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
    if payload.resource_type != RESOURCE_PRASARANA && payload.resource_type != RESOURCE_SARANA {
        return Err(ServiceError::ValidationError(format!(
            "resource_type must be {} or {}",
            RESOURCE_PRASARANA, RESOURCE_SARANA
        )));
    }

    let model = resource_approver::ActiveModel {
        resource_type: Set(payload.resource_type),
        resource_id: Set(payload.resource_id),
        user_id: Set(payload.user_id),
        level: Set(payload.level),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(&*state.db)
    .await
    .map_err(ServiceError::db_error)?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(model))))
}
