//! Time-range conflict detection.
//!
//! Two half-open intervals `[s1,e1)` and `[s2,e2)` conflict iff
//! `s1 < e2 && s2 < e1`; touching endpoints do not conflict. Only live records
//! participate: active, unexpired markings and peminjaman in
//! pending/approved/picked_up. Conflicts are flagged with a shared group code
//! for manual resolution, never used to block submission.

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{
    marking::{self, Entity as MarkingEntity, MarkingStatus},
    peminjaman::{self, Entity as PeminjamanEntity, PeminjamanStatus},
    peminjaman_item::{self, Entity as PeminjamanItemEntity},
};
use crate::errors::ServiceError;

/// What a candidate interval is being booked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationScope {
    /// A registered place: conflicts with any live record on the same id,
    /// regardless of location text.
    Prasarana(Uuid),
    /// Free-text location: conflicts only with the identical string.
    Location(String),
}

/// The first live record found overlapping the candidate interval.
#[derive(Debug, Clone)]
pub enum ConflictHit {
    Marking(marking::Model),
    Peminjaman(peminjaman::Model),
}

impl ConflictHit {
    pub fn id(&self) -> Uuid {
        match self {
            ConflictHit::Marking(m) => m.id,
            ConflictHit::Peminjaman(p) => p.id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            ConflictHit::Marking(m) => m.created_at,
            ConflictHit::Peminjaman(p) => p.created_at,
        }
    }

    pub fn note(&self) -> ConflictNote {
        match self {
            ConflictHit::Marking(m) => ConflictNote {
                record: "marking".to_string(),
                id: m.id,
            },
            ConflictHit::Peminjaman(p) => ConflictNote {
                record: "peminjaman".to_string(),
                id: p.id,
            },
        }
    }
}

/// Conflicting-record reference surfaced to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConflictNote {
    /// "marking" or "peminjaman"
    pub record: String,
    pub id: Uuid,
}

/// Half-open interval overlap predicate.
pub fn overlaps(
    s1: DateTime<Utc>,
    e1: DateTime<Utc>,
    s2: DateTime<Utc>,
    e2: DateTime<Utc>,
) -> bool {
    s1 < e2 && s2 < e1
}

/// Finds the first live marking or peminjaman overlapping `[start,end)` on the
/// given place scope. Tie-break is earliest `created_at`, then lowest id, so
/// repeated checks return the same record.
pub async fn find_place_conflict<C: ConnectionTrait>(
    conn: &C,
    scope: &ReservationScope,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude_marking: Option<Uuid>,
    exclude_peminjaman: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<Option<ConflictHit>, ServiceError> {
    let mut marking_query = MarkingEntity::find()
        .filter(marking::Column::Status.eq(MarkingStatus::Active.as_str()))
        .filter(marking::Column::ExpiresAt.gt(now))
        .filter(marking::Column::StartAt.lt(end))
        .filter(marking::Column::EndAt.gt(start));
    let mut peminjaman_query = PeminjamanEntity::find()
        .filter(peminjaman::Column::Status.is_in(PeminjamanStatus::live_strs()))
        .filter(peminjaman::Column::StartAt.lt(end))
        .filter(peminjaman::Column::EndAt.gt(start));

    match scope {
        ReservationScope::Prasarana(id) => {
            marking_query = marking_query.filter(marking::Column::PrasaranaId.eq(*id));
            peminjaman_query = peminjaman_query.filter(peminjaman::Column::PrasaranaId.eq(*id));
        }
        ReservationScope::Location(text) => {
            marking_query = marking_query
                .filter(marking::Column::PrasaranaId.is_null())
                .filter(marking::Column::LocationText.eq(text.clone()));
            peminjaman_query = peminjaman_query
                .filter(peminjaman::Column::PrasaranaId.is_null())
                .filter(peminjaman::Column::LocationText.eq(text.clone()));
        }
    }

    if let Some(id) = exclude_marking {
        marking_query = marking_query.filter(marking::Column::Id.ne(id));
    }
    if let Some(id) = exclude_peminjaman {
        peminjaman_query = peminjaman_query.filter(peminjaman::Column::Id.ne(id));
    }

    let first_marking = marking_query
        .order_by_asc(marking::Column::CreatedAt)
        .order_by_asc(marking::Column::Id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;
    let first_peminjaman = peminjaman_query
        .order_by_asc(peminjaman::Column::CreatedAt)
        .order_by_asc(peminjaman::Column::Id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(
        match (
            first_marking.map(ConflictHit::Marking),
            first_peminjaman.map(ConflictHit::Peminjaman),
        ) {
            (Some(m), Some(p)) => Some(if m.created_at() <= p.created_at() { m } else { p }),
            (Some(m), None) => Some(m),
            (None, Some(p)) => Some(p),
            (None, None) => None,
        },
    )
}

/// Finds the first live peminjaman whose items reference the given sarana and
/// whose interval overlaps `[start,end)`. Markings never reference equipment,
/// so only requests participate here.
pub async fn find_sarana_conflict<C: ConnectionTrait>(
    conn: &C,
    sarana_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude_peminjaman: Option<Uuid>,
) -> Result<Option<ConflictHit>, ServiceError> {
    let referencing_ids: Vec<Uuid> = PeminjamanItemEntity::find()
        .filter(peminjaman_item::Column::SaranaId.eq(sarana_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?
        .into_iter()
        .map(|item| item.peminjaman_id)
        .collect();

    if referencing_ids.is_empty() {
        return Ok(None);
    }

    let mut query = PeminjamanEntity::find()
        .filter(peminjaman::Column::Id.is_in(referencing_ids))
        .filter(peminjaman::Column::Status.is_in(PeminjamanStatus::live_strs()))
        .filter(peminjaman::Column::StartAt.lt(end))
        .filter(peminjaman::Column::EndAt.gt(start));

    if let Some(id) = exclude_peminjaman {
        query = query.filter(peminjaman::Column::Id.ne(id));
    }

    Ok(query
        .order_by_asc(peminjaman::Column::CreatedAt)
        .order_by_asc(peminjaman::Column::Id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .map(ConflictHit::Peminjaman))
}

/// Mints a fresh conflict-group code.
pub fn new_conflict_group() -> String {
    format!("CG-{}", &Uuid::new_v4().simple().to_string()[..8])
}

/// Resolves the group code a newly flagged request should join: the hit's
/// existing group when it has one, otherwise a fresh code that is also stamped
/// onto the conflicting peminjaman (markings carry no group; their conflicts
/// only mark the new record).
pub async fn join_conflict_group<C: ConnectionTrait>(
    conn: &C,
    hit: &ConflictHit,
) -> Result<String, ServiceError> {
    match hit {
        ConflictHit::Peminjaman(other) => {
            if let Some(group) = &other.conflict_group {
                return Ok(group.clone());
            }
            let group = new_conflict_group();
            let mut active: peminjaman::ActiveModel = other.clone().into();
            active.conflict_group = Set(Some(group.clone()));
            sea_orm::ActiveModelTrait::update(active, conn)
                .await
                .map_err(ServiceError::db_error)?;
            Ok(group)
        }
        ConflictHit::Marking(_) => Ok(new_conflict_group()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[rstest::rstest]
    #[case(0, 2, 1, 3, true)]
    #[case(1, 3, 0, 2, true)]
    #[case(0, 4, 1, 2, true)]
    // Touching endpoints do not conflict.
    #[case(0, 1, 1, 2, false)]
    #[case(1, 2, 0, 1, false)]
    // Disjoint.
    #[case(0, 1, 2, 3, false)]
    // Identical.
    #[case(0, 1, 0, 1, true)]
    fn half_open_overlap(
        #[case] s1: i64,
        #[case] e1: i64,
        #[case] s2: i64,
        #[case] e2: i64,
        #[case] expected: bool,
    ) {
        let t0 = Utc::now();
        let at = |h: i64| t0 + Duration::hours(h);
        assert_eq!(overlaps(at(s1), at(e1), at(s2), at(e2)), expected);
    }

    #[test]
    fn conflict_group_format() {
        let group = new_conflict_group();
        assert!(group.starts_with("CG-"));
        assert_eq!(group.len(), 11);
    }
}
