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

use crate::entities::{approval_step, peminjaman, peminjaman_item};
use crate::errors::ServiceError;
use crate::services::conflicts::ConflictNote;
use crate::services::peminjaman::{NewItem, NewPeminjaman, SubmittedPeminjaman};
use crate::{ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/peminjaman", post(submit_peminjaman).get(list_peminjaman))
        .route("/peminjaman/stats", get(peminjaman_stats))
        .route("/peminjaman/:id", get(get_peminjaman))
        .route("/peminjaman/:id/cancel", post(cancel_peminjaman))
        .route("/peminjaman/:id/steps", get(peminjaman_steps))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SubmitPeminjamanRequest {
    pub owner_id: Uuid,
    pub prasarana_id: Option<Uuid>,
    #[validate(length(max = 255))]
    pub location_text: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub participants: i32,
    #[validate(length(max = 255))]
    pub document_ref: Option<String>,
    #[serde(default)]
    pub items: Vec<NewItem>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CancelPeminjamanRequest {
    pub actor_id: Uuid,
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
    /// Set by the gateway when the actor holds override permission and is
    /// not the owner.
    #[serde(default)]
    pub by_override: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PeminjamanDto {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub prasarana_id: Option<Uuid>,
    pub location_text: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub participants: i32,
    pub status: String,
    pub conflict_group: Option<String>,
    pub document_ref: Option<String>,
    pub rejection_reason: Option<String>,
    pub cancel_reason: Option<String>,
    pub marking_id: Option<Uuid>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<peminjaman::Model> for PeminjamanDto {
    fn from(p: peminjaman::Model) -> Self {
        Self {
            id: p.id,
            owner_id: p.owner_id,
            prasarana_id: p.prasarana_id,
            location_text: p.location_text,
            start_at: p.start_at,
            end_at: p.end_at,
            participants: p.participants,
            status: p.status,
            conflict_group: p.conflict_group,
            document_ref: p.document_ref,
            rejection_reason: p.rejection_reason,
            cancel_reason: p.cancel_reason,
            marking_id: p.marking_id,
            picked_up_at: p.picked_up_at,
            returned_at: p.returned_at,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemDto {
    pub id: Uuid,
    pub sarana_id: Uuid,
    pub quantity: i32,
}

impl From<peminjaman_item::Model> for ItemDto {
    fn from(i: peminjaman_item::Model) -> Self {
        Self {
            id: i.id,
            sarana_id: i.sarana_id,
            quantity: i.quantity,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StepDto {
    pub id: Uuid,
    pub approval_type: String,
    pub level: i32,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub approver_id: Uuid,
    pub decision: String,
    pub reason: Option<String>,
    pub overridden_by: Option<Uuid>,
    pub out_of_order: bool,
    pub decided_at: Option<DateTime<Utc>>,
}

impl From<approval_step::Model> for StepDto {
    fn from(s: approval_step::Model) -> Self {
        Self {
            id: s.id,
            approval_type: s.approval_type,
            level: s.level,
            resource_type: s.resource_type,
            resource_id: s.resource_id,
            approver_id: s.approver_id,
            decision: s.decision,
            reason: s.reason,
            overridden_by: s.overridden_by,
            out_of_order: s.out_of_order,
            decided_at: s.decided_at,
        }
    }
}

/// A freshly submitted request with its generated approval gates.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmissionDto {
    pub peminjaman: PeminjamanDto,
    pub items: Vec<ItemDto>,
    pub steps: Vec<StepDto>,
    pub conflict: Option<ConflictNote>,
}

impl From<SubmittedPeminjaman> for SubmissionDto {
    fn from(s: SubmittedPeminjaman) -> Self {
        Self {
            peminjaman: s.peminjaman.into(),
            items: s.items.into_iter().map(ItemDto::from).collect(),
            steps: s.steps.into_iter().map(StepDto::from).collect(),
            conflict: s.conflict,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/peminjaman",
    request_body = SubmitPeminjamanRequest,
    responses(
        (status = 201, description = "Request submitted as pending with approval gates"),
        (status = 400, description = "Invalid slot, scope or items"),
        (status = 422, description = "Owner quota exceeded")
    ),
    tag = "peminjaman"
)]
pub async fn submit_peminjaman(
    State(state): State<AppState>,
    Json(payload): Json<SubmitPeminjamanRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let submitted = state
        .services
        .peminjaman
        .submit(NewPeminjaman {
            owner_id: payload.owner_id,
            prasarana_id: payload.prasarana_id,
            location_text: payload.location_text,
            start_at: payload.start_at,
            end_at: payload.end_at,
            participants: payload.participants,
            document_ref: payload.document_ref,
            marking_id: None,
            items: payload.items,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(SubmissionDto::from(submitted))),
    ))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PeminjamanFilters {
    pub status: Option<String>,
    pub owner_id: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/api/v1/peminjaman",
    responses((status = 200, description = "Paginated requests")),
    tag = "peminjaman"
)]
pub async fn list_peminjaman(
    State(state): State<AppState>,
    Query(list): Query<ListQuery>,
    Query(filters): Query<PeminjamanFilters>,
) -> ApiResult<PaginatedResponse<PeminjamanDto>> {
    let (models, total) = state
        .services
        .peminjaman
        .list(
            list.page,
            list.limit,
            filters.status.as_deref(),
            filters.owner_id,
        )
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        models.into_iter().map(PeminjamanDto::from).collect(),
        total,
        list.page,
        list.limit,
    ))))
}

/// Request detail with its equipment lines.
#[derive(Debug, Serialize, ToSchema)]
pub struct PeminjamanDetailDto {
    #[serde(flatten)]
    pub peminjaman: PeminjamanDto,
    pub items: Vec<ItemDto>,
}

#[utoipa::path(
    get,
    path = "/api/v1/peminjaman/{id}",
    responses(
        (status = 200, description = "Request with equipment lines"),
        (status = 404, description = "Unknown request")
    ),
    tag = "peminjaman"
)]
pub async fn get_peminjaman(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<PeminjamanDetailDto> {
    let (model, items) = state
        .services
        .peminjaman
        .get_with_items(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Peminjaman {} not found", id)))?;

    Ok(Json(ApiResponse::success(PeminjamanDetailDto {
        peminjaman: model.into(),
        items: items.into_iter().map(ItemDto::from).collect(),
    })))
}

#[utoipa::path(
    post,
    path = "/api/v1/peminjaman/{id}/cancel",
    request_body = CancelPeminjamanRequest,
    responses(
        (status = 200, description = "Request cancelled, custody released"),
        (status = 403, description = "Actor is not the owner"),
        (status = 409, description = "Request is past the cancellable states")
    ),
    tag = "peminjaman"
)]
pub async fn cancel_peminjaman(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelPeminjamanRequest>,
) -> ApiResult<PeminjamanDto> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
    let model = state
        .services
        .peminjaman
        .cancel(id, payload.actor_id, payload.reason, payload.by_override)
        .await?;
    Ok(Json(ApiResponse::success(model.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/peminjaman/{id}/steps",
    responses((status = 200, description = "Approval gates of the request")),
    tag = "peminjaman"
)]
pub async fn peminjaman_steps(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<StepDto>> {
    let steps = state.services.approvals.steps_for(id).await?;
    Ok(Json(ApiResponse::success(
        steps.into_iter().map(StepDto::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/peminjaman/stats",
    responses((status = 200, description = "Request counters")),
    tag = "peminjaman"
)]
pub async fn peminjaman_stats(
    State(state): State<AppState>,
) -> ApiResult<crate::services::peminjaman::PeminjamanStats> {
    let stats = state.services.peminjaman.stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}
