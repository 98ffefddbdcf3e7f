//! Per-user concurrency quota.
//!
//! A user's live footprint is their active, unexpired markings plus their
//! peminjaman in pending/approved/picked_up. The check runs inside the
//! caller's transaction so check-and-insert is atomic per user.

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

use crate::entities::{
    marking::{self, Entity as MarkingEntity, MarkingStatus},
    peminjaman::{self, Entity as PeminjamanEntity, PeminjamanStatus},
};
use crate::errors::ServiceError;

/// Counts the user's live markings and requests at `now`.
pub async fn live_count<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<u64, ServiceError> {
    let markings = MarkingEntity::find()
        .filter(marking::Column::OwnerId.eq(user_id))
        .filter(marking::Column::Status.eq(MarkingStatus::Active.as_str()))
        .filter(marking::Column::ExpiresAt.gt(now))
        .count(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let requests = PeminjamanEntity::find()
        .filter(peminjaman::Column::OwnerId.eq(user_id))
        .filter(peminjaman::Column::Status.is_in(PeminjamanStatus::live_strs()))
        .count(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(markings + requests)
}

/// Refuses a new marking or peminjaman once the user's live footprint has
/// reached the configured ceiling.
pub async fn check_quota<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    ceiling: u64,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let current = live_count(conn, user_id, now).await?;
    if current >= ceiling {
        return Err(ServiceError::QuotaExceeded(format!(
            "user has {} live reservations, ceiling is {}",
            current, ceiling
        )));
    }
    Ok(())
}
