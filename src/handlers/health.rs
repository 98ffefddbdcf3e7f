use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::{ConnectionTrait, Statement};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{ApiResponse, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatus {
    pub status: String,
    pub database: String,
    pub version: String,
    pub timestamp: String,
}

pub async fn health_check(State(state): State<AppState>) -> ApiResult<HealthStatus> {
    let db_status = match state
        .db
        .execute(Statement::from_string(
            state.db.get_database_backend(),
            "SELECT 1".to_owned(),
        ))
        .await
    {
        Ok(_) => "up",
        Err(_) => "down",
    };

    Ok(Json(ApiResponse::success(HealthStatus {
        status: if db_status == "up" { "healthy" } else { "degraded" }.to_string(),
        database: db_status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })))
}

/// Readiness probe. 503 until the database answers.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<String>>, StatusCode> {
    state
        .db
        .execute(Statement::from_string(
            state.db.get_database_backend(),
            "SELECT 1".to_owned(),
        ))
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(ApiResponse::success("ready".to_string())))
}
