//! OpenAPI document for the reservation API, served at `/api-docs/openapi.json`.

use axum::{response::Json, routing::get, Router};
use utoipa::OpenApi;

use crate::handlers;
use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sarpras Reservation API",
        description = "Reservations for shared facilities: soft holds, confirmed \
            borrowing requests, conflict flagging, multi-level approval and \
            custody tracking of equipment units."
    ),
    paths(
        handlers::markings::create_marking,
        handlers::markings::list_markings,
        handlers::markings::get_marking,
        handlers::markings::extend_marking,
        handlers::markings::convert_marking,
        handlers::markings::cancel_marking,
        handlers::markings::sweep_markings,
        handlers::markings::marking_stats,
        handlers::peminjaman::submit_peminjaman,
        handlers::peminjaman::list_peminjaman,
        handlers::peminjaman::get_peminjaman,
        handlers::peminjaman::cancel_peminjaman,
        handlers::peminjaman::peminjaman_steps,
        handlers::peminjaman::peminjaman_stats,
        handlers::approvals::decide_step,
        handlers::approvals::override_step,
        handlers::approvals::approver_queue,
        handlers::custody::assign_units,
        handlers::custody::list_assignments,
        handlers::custody::validate_pickup,
        handlers::custody::validate_return,
        handlers::custody::set_unit_status,
    ),
    components(schemas(
        handlers::markings::CreateMarkingRequest,
        handlers::markings::ExtendMarkingRequest,
        handlers::markings::ConvertMarkingRequest,
        handlers::markings::CancelMarkingRequest,
        handlers::markings::MarkingDto,
        handlers::markings::CreatedMarkingDto,
        handlers::peminjaman::SubmitPeminjamanRequest,
        handlers::peminjaman::CancelPeminjamanRequest,
        handlers::peminjaman::PeminjamanDto,
        handlers::peminjaman::ItemDto,
        handlers::peminjaman::StepDto,
        handlers::peminjaman::SubmissionDto,
        handlers::approvals::DecideStepRequest,
        handlers::approvals::DecisionDto,
        handlers::custody::AssignUnitsRequest,
        handlers::custody::PickupRequest,
        handlers::custody::ReturnRequest,
        handlers::custody::SetUnitStatusRequest,
        handlers::custody::AssignmentDto,
        handlers::resources::PrasaranaDto,
        handlers::resources::SaranaDto,
        handlers::resources::UnitDto,
        crate::services::peminjaman::NewItem,
        crate::services::conflicts::ConflictNote,
        crate::services::custody::AssignmentSpec,
        crate::services::custody::ReturnCondition,
    )),
    tags(
        (name = "markings", description = "Soft holds on time slots"),
        (name = "peminjaman", description = "Confirmed borrowing requests"),
        (name = "approvals", description = "Multi-level decision workflow"),
        (name = "custody", description = "Unit assignment, pickup and return")
    )
)]
pub struct ApiDoc;

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDoc::openapi()) }),
    )
}
