mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

use sarpras_api::config::ReservationPolicy;
use sarpras_api::entities::marking::{self, MarkingStatus};
use sarpras_api::errors::ServiceError;
use sarpras_api::services::markings::{ConversionInput, NewMarking};

use common::{seed_prasarana, setup, setup_with_policy, slot, TestApp};

fn hold_on_place(prasarana_id: Uuid, days_from_now: i64) -> NewMarking {
    let (start_at, end_at) = slot(days_from_now, 3);
    NewMarking {
        owner_id: Uuid::new_v4(),
        prasarana_id: Some(prasarana_id),
        location_text: None,
        start_at,
        end_at,
        participants: 20,
        duration_days: None,
        planned_submit_by: None,
        notes: None,
    }
}

async fn force_expired(app: &TestApp, marking_id: Uuid) {
    let model = app
        .markings
        .get(marking_id)
        .await
        .unwrap()
        .expect("marking exists");
    let mut active: marking::ActiveModel = model.into();
    active.expires_at = Set(Utc::now() - Duration::hours(1));
    active.status = Set(MarkingStatus::Active.as_str().to_string());
    active.update(&*app.db).await.expect("expiry forced");
}

#[tokio::test]
async fn create_places_an_active_hold() {
    let app = setup().await;
    let place = seed_prasarana(&app, "GKU-1").await;

    let created = app
        .markings
        .create(hold_on_place(place.id, 2))
        .await
        .unwrap();

    assert_eq!(created.marking.status, "active");
    assert!(created.conflict.is_none());
    assert!(created.marking.expires_at > Utc::now());
}

#[tokio::test]
async fn overlapping_hold_is_flagged_not_blocked() {
    let app = setup().await;
    let place = seed_prasarana(&app, "GKU-1").await;

    let first = app
        .markings
        .create(hold_on_place(place.id, 2))
        .await
        .unwrap();
    let second = app
        .markings
        .create(hold_on_place(place.id, 2))
        .await
        .unwrap();

    assert_eq!(second.marking.status, "active");
    let conflict = second.conflict.expect("overlap must be flagged");
    assert_eq!(conflict.record, "marking");
    assert_eq!(conflict.id, first.marking.id);
}

#[tokio::test]
async fn touching_intervals_do_not_conflict() {
    let app = setup().await;
    let place = seed_prasarana(&app, "GKU-1").await;

    let first = app
        .markings
        .create(hold_on_place(place.id, 2))
        .await
        .unwrap();

    // Second hold starts exactly where the first ends.
    let mut adjacent = hold_on_place(place.id, 2);
    adjacent.start_at = first.marking.end_at;
    adjacent.end_at = first.marking.end_at + Duration::hours(2);
    let second = app.markings.create(adjacent).await.unwrap();

    assert!(second.conflict.is_none());
}

#[tokio::test]
async fn different_locations_do_not_conflict() {
    let app = setup().await;
    let (start_at, end_at) = slot(2, 3);

    let base = NewMarking {
        owner_id: Uuid::new_v4(),
        prasarana_id: None,
        location_text: Some("lapangan timur".to_string()),
        start_at,
        end_at,
        participants: 50,
        duration_days: None,
        planned_submit_by: None,
        notes: None,
    };
    app.markings.create(base.clone()).await.unwrap();

    let mut other_place = base.clone();
    other_place.location_text = Some("lapangan barat".to_string());
    let created = app.markings.create(other_place).await.unwrap();
    assert!(created.conflict.is_none());

    let mut same_place = base;
    same_place.owner_id = Uuid::new_v4();
    let flagged = app.markings.create(same_place).await.unwrap();
    assert!(flagged.conflict.is_some());
}

#[tokio::test]
async fn create_rejects_bad_slots() {
    let app = setup().await;
    let place = seed_prasarana(&app, "GKU-1").await;

    let mut inverted = hold_on_place(place.id, 2);
    std::mem::swap(&mut inverted.start_at, &mut inverted.end_at);
    assert_matches!(
        app.markings.create(inverted).await,
        Err(ServiceError::ValidationError(_))
    );

    let mut past = hold_on_place(place.id, 2);
    past.start_at = Utc::now() - Duration::days(1);
    past.end_at = Utc::now() + Duration::hours(1);
    assert_matches!(
        app.markings.create(past).await,
        Err(ServiceError::ValidationError(_))
    );

    let mut scopeless = hold_on_place(place.id, 2);
    scopeless.prasarana_id = None;
    scopeless.location_text = None;
    assert_matches!(
        app.markings.create(scopeless).await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn long_slots_are_accepted() {
    let app = setup().await;
    let place = seed_prasarana(&app, "GKU-1").await;

    // The slot span is not bounded by the hold window.
    let mut hold = hold_on_place(place.id, 1);
    hold.end_at = hold.start_at + Duration::days(10);
    let created = app.markings.create(hold).await.unwrap();

    assert_eq!(created.marking.status, "active");
    assert_eq!(
        (created.marking.end_at - created.marking.start_at).num_days(),
        10
    );
}

#[tokio::test]
async fn requested_hold_duration_sets_expiry() {
    let app = setup().await;
    let place = seed_prasarana(&app, "GKU-1").await;

    let mut hold = hold_on_place(place.id, 20);
    hold.duration_days = Some(5);
    let created = app.markings.create(hold).await.unwrap();

    let lifetime = created.marking.expires_at - created.marking.created_at;
    assert!(lifetime <= Duration::days(5));
    assert!(lifetime > Duration::days(5) - Duration::minutes(1));

    // A request beyond the window is clamped to it, not rejected.
    let mut greedy = hold_on_place(place.id, 21);
    greedy.duration_days = Some(30);
    let clamped = app.markings.create(greedy).await.unwrap();

    let max = Duration::days(app.policy.max_extension_days);
    let lifetime = clamped.marking.expires_at - clamped.marking.created_at;
    assert!(lifetime <= max);
    assert!(lifetime > max - Duration::minutes(1));
}

#[tokio::test]
async fn quota_caps_live_holds_per_user() {
    let app = setup_with_policy(ReservationPolicy {
        max_active_per_user: 2,
        ..ReservationPolicy::default()
    })
    .await;
    let place = seed_prasarana(&app, "GKU-1").await;
    let owner = Uuid::new_v4();

    for n in 0..2 {
        let mut hold = hold_on_place(place.id, 2 + n);
        hold.owner_id = owner;
        app.markings.create(hold).await.unwrap();
    }

    let mut third = hold_on_place(place.id, 8);
    third.owner_id = owner;
    assert_matches!(
        app.markings.create(third).await,
        Err(ServiceError::QuotaExceeded(_))
    );

    // A different user is unaffected.
    app.markings
        .create(hold_on_place(place.id, 9))
        .await
        .unwrap();
}

#[tokio::test]
async fn cancelled_hold_frees_quota() {
    let app = setup_with_policy(ReservationPolicy {
        max_active_per_user: 1,
        ..ReservationPolicy::default()
    })
    .await;
    let place = seed_prasarana(&app, "GKU-1").await;
    let owner = Uuid::new_v4();

    let mut hold = hold_on_place(place.id, 2);
    hold.owner_id = owner;
    let created = app.markings.create(hold).await.unwrap();

    app.markings.cancel(created.marking.id, owner).await.unwrap();

    let mut next = hold_on_place(place.id, 5);
    next.owner_id = owner;
    app.markings.create(next).await.unwrap();
}

#[tokio::test]
async fn extend_is_monotonic_and_capped() {
    let app = setup().await;
    let place = seed_prasarana(&app, "GKU-1").await;
    let hold = hold_on_place(place.id, 2);
    let owner = hold.owner_id;
    let created = app.markings.create(hold).await.unwrap();

    let extended = app.markings.extend(created.marking.id, owner, 2).await.unwrap();
    assert_eq!(
        extended.expires_at,
        created.marking.expires_at + Duration::days(2)
    );

    let again = app.markings.extend(created.marking.id, owner, 1).await.unwrap();
    assert!(again.expires_at > extended.expires_at);

    assert_matches!(
        app.markings
            .extend(created.marking.id, owner, app.policy.max_extension_days + 1)
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        app.markings.extend(created.marking.id, owner, 0).await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn extend_refuses_expired_and_foreign_holds() {
    let app = setup().await;
    let place = seed_prasarana(&app, "GKU-1").await;
    let hold = hold_on_place(place.id, 2);
    let owner = hold.owner_id;
    let created = app.markings.create(hold).await.unwrap();

    assert_matches!(
        app.markings.extend(created.marking.id, Uuid::new_v4(), 1).await,
        Err(ServiceError::AuthorizationError(_))
    );

    force_expired(&app, created.marking.id).await;
    assert_matches!(
        app.markings.extend(created.marking.id, owner, 1).await,
        Err(ServiceError::StateError(_))
    );
}

#[tokio::test]
async fn get_projects_expiry_before_the_sweep() {
    let app = setup().await;
    let place = seed_prasarana(&app, "GKU-1").await;
    let created = app
        .markings
        .create(hold_on_place(place.id, 2))
        .await
        .unwrap();

    force_expired(&app, created.marking.id).await;

    let seen = app.markings.get(created.marking.id).await.unwrap().unwrap();
    assert_eq!(seen.status, "expired");
}

#[tokio::test]
async fn sweep_flips_only_stale_holds_and_is_idempotent() {
    let app = setup().await;
    let place = seed_prasarana(&app, "GKU-1").await;

    let stale = app
        .markings
        .create(hold_on_place(place.id, 2))
        .await
        .unwrap();
    let fresh = app
        .markings
        .create(hold_on_place(place.id, 5))
        .await
        .unwrap();
    force_expired(&app, stale.marking.id).await;

    assert_eq!(app.markings.expire_sweep().await.unwrap(), 1);
    assert_eq!(app.markings.expire_sweep().await.unwrap(), 0);

    let flipped = app.markings.get(stale.marking.id).await.unwrap().unwrap();
    assert_eq!(flipped.status, "expired");
    let untouched = app.markings.get(fresh.marking.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, "active");
}

#[tokio::test]
async fn sweep_leaves_terminal_holds_alone() {
    let app = setup().await;
    let place = seed_prasarana(&app, "GKU-1").await;
    let hold = hold_on_place(place.id, 2);
    let owner = hold.owner_id;
    let created = app.markings.create(hold).await.unwrap();

    app.markings.cancel(created.marking.id, owner).await.unwrap();
    assert_eq!(app.markings.expire_sweep().await.unwrap(), 0);

    let seen = app.markings.get(created.marking.id).await.unwrap().unwrap();
    assert_eq!(seen.status, "cancelled");
}

#[tokio::test]
async fn convert_refuses_expired_holds() {
    let app = setup().await;
    let place = seed_prasarana(&app, "GKU-1").await;
    let hold = hold_on_place(place.id, 2);
    let owner = hold.owner_id;
    let created = app.markings.create(hold).await.unwrap();
    force_expired(&app, created.marking.id).await;

    assert_matches!(
        app.markings
            .convert(
                created.marking.id,
                owner,
                ConversionInput {
                    document_ref: Some("SURAT/01".to_string()),
                    items: vec![],
                },
            )
            .await,
        Err(ServiceError::StateError(_))
    );

    // The losing convert must not leave a request behind.
    let (requests, total) = app.peminjaman.list(1, 10, None, None).await.unwrap();
    assert!(requests.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn convert_produces_a_pending_request_once() {
    let app = setup().await;
    let place = seed_prasarana(&app, "GKU-1").await;
    let hold = hold_on_place(place.id, 2);
    let owner = hold.owner_id;
    let created = app.markings.create(hold).await.unwrap();

    let submitted = app
        .markings
        .convert(
            created.marking.id,
            owner,
            ConversionInput {
                document_ref: Some("SURAT/02".to_string()),
                items: vec![],
            },
        )
        .await
        .unwrap();

    assert_eq!(submitted.peminjaman.status, "pending");
    assert_eq!(submitted.peminjaman.marking_id, Some(created.marking.id));
    // The hold itself never trips the conflict check of its own conversion.
    assert!(submitted.conflict.is_none());

    let hold_after = app.markings.get(created.marking.id).await.unwrap().unwrap();
    assert_eq!(hold_after.status, "converted");

    assert_matches!(
        app.markings
            .convert(
                created.marking.id,
                owner,
                ConversionInput {
                    document_ref: None,
                    items: vec![],
                },
            )
            .await,
        Err(ServiceError::StateError(_))
    );
}

#[tokio::test]
async fn stats_count_effective_states() {
    let app = setup().await;
    let place = seed_prasarana(&app, "GKU-1").await;

    let live = app
        .markings
        .create(hold_on_place(place.id, 2))
        .await
        .unwrap();
    let stale = app
        .markings
        .create(hold_on_place(place.id, 4))
        .await
        .unwrap();
    force_expired(&app, stale.marking.id).await;
    let _ = live;

    let stats = app.markings.stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.live, 1);
    // Stale-but-unswept rows already count as expired.
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.converted, 0);
}
