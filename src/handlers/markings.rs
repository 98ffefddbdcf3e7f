use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::marking;
use crate::errors::ServiceError;
use crate::services::conflicts::ConflictNote;
use crate::services::markings::{ConversionInput, NewMarking};
use crate::services::peminjaman::NewItem;
use crate::{ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

use super::peminjaman::SubmissionDto;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/markings", post(create_marking).get(list_markings))
        .route("/markings/stats", get(marking_stats))
        .route("/markings/sweep", post(sweep_markings))
        .route("/markings/:id", get(get_marking))
        .route("/markings/:id/extend", post(extend_marking))
        .route("/markings/:id/convert", post(convert_marking))
        .route("/markings/:id/cancel", post(cancel_marking))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateMarkingRequest {
    pub owner_id: Uuid,
    pub prasarana_id: Option<Uuid>,
    #[validate(length(max = 255))]
    pub location_text: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub participants: i32,
    /// Hold length in days; defaults to the configured hold window.
    #[validate(range(min = 1))]
    pub duration_days: Option<i64>,
    pub planned_submit_by: Option<DateTime<Utc>>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ExtendMarkingRequest {
    pub actor_id: Uuid,
    #[validate(range(min = 1))]
    pub extra_days: i64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConvertMarkingRequest {
    pub actor_id: Uuid,
    #[validate(length(max = 255))]
    pub document_ref: Option<String>,
    #[serde(default)]
    pub items: Vec<NewItem>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelMarkingRequest {
    pub actor_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkingDto {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub prasarana_id: Option<Uuid>,
    pub location_text: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub participants: i32,
    pub expires_at: DateTime<Utc>,
    pub planned_submit_by: Option<DateTime<Utc>>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<marking::Model> for MarkingDto {
    fn from(m: marking::Model) -> Self {
        Self {
            id: m.id,
            owner_id: m.owner_id,
            prasarana_id: m.prasarana_id,
            location_text: m.location_text,
            start_at: m.start_at,
            end_at: m.end_at,
            participants: m.participants,
            expires_at: m.expires_at,
            planned_submit_by: m.planned_submit_by,
            status: m.status,
            notes: m.notes,
            created_at: m.created_at,
        }
    }
}

/// Created hold plus the conflict flag when the slot already overlaps a live
/// record.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedMarkingDto {
    #[serde(flatten)]
    pub marking: MarkingDto,
    pub conflict: Option<ConflictNote>,
}

#[utoipa::path(
    post,
    path = "/api/v1/markings",
    request_body = CreateMarkingRequest,
    responses(
        (status = 201, description = "Hold placed, possibly flagged with a conflict"),
        (status = 400, description = "Invalid slot or missing place"),
        (status = 422, description = "Owner quota exceeded")
    ),
    tag = "markings"
)]
pub async fn create_marking(
    State(state): State<AppState>,
    Json(payload): Json<CreateMarkingRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let created = state
        .services
        .markings
        .create(NewMarking {
            owner_id: payload.owner_id,
            prasarana_id: payload.prasarana_id,
            location_text: payload.location_text,
            start_at: payload.start_at,
            end_at: payload.end_at,
            participants: payload.participants,
            duration_days: payload.duration_days,
            planned_submit_by: payload.planned_submit_by,
            notes: payload.notes,
        })
        .await?;

    let dto = CreatedMarkingDto {
        marking: created.marking.into(),
        conflict: created.conflict,
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::success(dto))))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MarkingFilters {
    pub status: Option<String>,
    pub owner_id: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/api/v1/markings",
    responses((status = 200, description = "Paginated holds")),
    tag = "markings"
)]
pub async fn list_markings(
    State(state): State<AppState>,
    Query(list): Query<ListQuery>,
    Query(filters): Query<MarkingFilters>,
) -> ApiResult<PaginatedResponse<MarkingDto>> {
    let (models, total) = state
        .services
        .markings
        .list(
            list.page,
            list.limit,
            filters.status.as_deref(),
            filters.owner_id,
        )
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        models.into_iter().map(MarkingDto::from).collect(),
        total,
        list.page,
        list.limit,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/markings/{id}",
    responses(
        (status = 200, description = "Hold with its effective status"),
        (status = 404, description = "Unknown hold")
    ),
    tag = "markings"
)]
pub async fn get_marking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<MarkingDto> {
    let model = state
        .services
        .markings
        .get(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Marking {} not found", id)))?;
    Ok(Json(ApiResponse::success(model.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/markings/{id}/extend",
    request_body = ExtendMarkingRequest,
    responses(
        (status = 200, description = "Expiry pushed forward"),
        (status = 409, description = "Hold is no longer live")
    ),
    tag = "markings"
)]
pub async fn extend_marking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ExtendMarkingRequest>,
) -> ApiResult<MarkingDto> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
    let model = state
        .services
        .markings
        .extend(id, payload.actor_id, payload.extra_days)
        .await?;
    Ok(Json(ApiResponse::success(model.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/markings/{id}/convert",
    request_body = ConvertMarkingRequest,
    responses(
        (status = 201, description = "Hold converted into a pending request"),
        (status = 409, description = "Hold is no longer live")
    ),
    tag = "markings"
)]
pub async fn convert_marking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConvertMarkingRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let submitted = state
        .services
        .markings
        .convert(
            id,
            payload.actor_id,
            ConversionInput {
                document_ref: payload.document_ref,
                items: payload.items,
            },
        )
        .await?;

    let dto = SubmissionDto::from(submitted);
    Ok((StatusCode::CREATED, Json(ApiResponse::success(dto))))
}

#[utoipa::path(
    post,
    path = "/api/v1/markings/{id}/cancel",
    request_body = CancelMarkingRequest,
    responses(
        (status = 200, description = "Hold cancelled"),
        (status = 409, description = "Hold is no longer live")
    ),
    tag = "markings"
)]
pub async fn cancel_marking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelMarkingRequest>,
) -> ApiResult<MarkingDto> {
    let model = state
        .services
        .markings
        .cancel(id, payload.actor_id)
        .await?;
    Ok(Json(ApiResponse::success(model.into())))
}

/// Manual trigger for the expiry sweep, for external schedulers.
#[utoipa::path(
    post,
    path = "/api/v1/markings/sweep",
    responses((status = 200, description = "Number of holds flipped to expired")),
    tag = "markings"
)]
pub async fn sweep_markings(State(state): State<AppState>) -> ApiResult<u64> {
    let count = state.services.markings.expire_sweep().await?;
    Ok(Json(ApiResponse::success(count)))
}

#[utoipa::path(
    get,
    path = "/api/v1/markings/stats",
    responses((status = 200, description = "Hold counters")),
    tag = "markings"
)]
pub async fn marking_stats(
    State(state): State<AppState>,
) -> ApiResult<crate::services::markings::MarkingStats> {
    let stats = state.services.markings.stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}
