mod common;

use assert_matches::assert_matches;
use sea_orm::EntityTrait;
use uuid::Uuid;

use sarpras_api::entities::approval_step::ApprovalDecision;
use sarpras_api::entities::sarana::Entity as SaranaEntity;
use sarpras_api::entities::sarana_unit::{Entity as SaranaUnitEntity, UnitStatus};
use sarpras_api::errors::ServiceError;
use sarpras_api::services::custody::{AssignmentSpec, ReturnCondition};
use sarpras_api::services::peminjaman::{NewItem, NewPeminjaman, SubmittedPeminjaman};

use common::{
    seed_global_approver, seed_pooled_sarana, seed_prasarana, seed_serialized_sarana, setup,
    slot, TestApp,
};

async fn submit_with_items(app: &TestApp, items: Vec<NewItem>) -> SubmittedPeminjaman {
    let place = seed_prasarana(app, &format!("R-{}", Uuid::new_v4().simple())).await;
    let (start_at, end_at) = slot(2, 4);
    app.peminjaman
        .submit(NewPeminjaman {
            owner_id: Uuid::new_v4(),
            prasarana_id: Some(place.id),
            location_text: None,
            start_at,
            end_at,
            participants: 10,
            document_ref: Some("SURAT/77".to_string()),
            marking_id: None,
            items,
        })
        .await
        .expect("submission")
}

async fn approve_all(app: &TestApp, submitted: &SubmittedPeminjaman, approver: Uuid) {
    for step in &submitted.steps {
        app.approvals
            .process_approval(step.id, approver, ApprovalDecision::Approved, None)
            .await
            .expect("gate approved");
    }
}

#[tokio::test]
async fn serialized_assignment_binds_named_units() {
    let app = setup().await;
    let approver = seed_global_approver(&app, 1).await;
    let (camera, units) = seed_serialized_sarana(&app, "KAMERA", 3).await;

    let submitted = submit_with_items(
        &app,
        vec![NewItem {
            sarana_id: camera.id,
            quantity: 2,
        }],
    )
    .await;
    approve_all(&app, &submitted, approver).await;

    let assignments = app
        .custody
        .assign_units(
            submitted.peminjaman.id,
            vec![AssignmentSpec {
                item_id: submitted.items[0].id,
                unit_ids: vec![units[0].id, units[1].id],
            }],
        )
        .await
        .unwrap();

    assert_eq!(assignments.len(), 2);
    assert!(assignments.iter().all(|a| a.unit_id.is_some() && !a.released));
}

#[tokio::test]
async fn assignment_requires_an_approved_request() {
    let app = setup().await;
    let _approver = seed_global_approver(&app, 1).await;
    let (camera, units) = seed_serialized_sarana(&app, "KAMERA", 1).await;

    let submitted = submit_with_items(
        &app,
        vec![NewItem {
            sarana_id: camera.id,
            quantity: 1,
        }],
    )
    .await;

    assert_matches!(
        app.custody
            .assign_units(
                submitted.peminjaman.id,
                vec![AssignmentSpec {
                    item_id: submitted.items[0].id,
                    unit_ids: vec![units[0].id],
                }],
            )
            .await,
        Err(ServiceError::StateError(_))
    );
}

#[tokio::test]
async fn a_unit_cannot_be_out_twice() {
    let app = setup().await;
    let approver = seed_global_approver(&app, 1).await;
    let (camera, units) = seed_serialized_sarana(&app, "KAMERA", 2).await;

    let first = submit_with_items(
        &app,
        vec![NewItem {
            sarana_id: camera.id,
            quantity: 1,
        }],
    )
    .await;
    approve_all(&app, &first, approver).await;
    app.custody
        .assign_units(
            first.peminjaman.id,
            vec![AssignmentSpec {
                item_id: first.items[0].id,
                unit_ids: vec![units[0].id],
            }],
        )
        .await
        .unwrap();

    let second = submit_with_items(
        &app,
        vec![NewItem {
            sarana_id: camera.id,
            quantity: 1,
        }],
    )
    .await;
    approve_all(&app, &second, approver).await;

    assert_matches!(
        app.custody
            .assign_units(
                second.peminjaman.id,
                vec![AssignmentSpec {
                    item_id: second.items[0].id,
                    unit_ids: vec![units[0].id],
                }],
            )
            .await,
        Err(ServiceError::ConflictError(_))
    );

    // The free unit still works.
    app.custody
        .assign_units(
            second.peminjaman.id,
            vec![AssignmentSpec {
                item_id: second.items[0].id,
                unit_ids: vec![units[1].id],
            }],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn pooled_shortage_leaves_stock_untouched() {
    let app = setup().await;
    let approver = seed_global_approver(&app, 1).await;
    let chairs = seed_pooled_sarana(&app, "KURSI", 5).await;

    let submitted = submit_with_items(
        &app,
        vec![NewItem {
            sarana_id: chairs.id,
            quantity: 8,
        }],
    )
    .await;
    approve_all(&app, &submitted, approver).await;

    assert_matches!(
        app.custody.assign_units(submitted.peminjaman.id, vec![]).await,
        Err(ServiceError::InsufficientStock(_))
    );

    let after = SaranaEntity::find_by_id(chairs.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.available_units, 5);
    assert!(app
        .custody
        .assignments_for(submitted.peminjaman.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn mixed_assignment_is_all_or_nothing() {
    let app = setup().await;
    let approver = seed_global_approver(&app, 1).await;
    let chairs = seed_pooled_sarana(&app, "KURSI", 10).await;
    let (camera, _units) = seed_serialized_sarana(&app, "KAMERA", 1).await;

    let submitted = submit_with_items(
        &app,
        vec![
            NewItem {
                sarana_id: chairs.id,
                quantity: 4,
            },
            NewItem {
                sarana_id: camera.id,
                quantity: 1,
            },
        ],
    )
    .await;
    approve_all(&app, &submitted, approver).await;

    // No unit spec for the serialized line: the whole call fails and the
    // pooled decrement is rolled back.
    assert_matches!(
        app.custody.assign_units(submitted.peminjaman.id, vec![]).await,
        Err(ServiceError::ValidationError(_))
    );
    let after = SaranaEntity::find_by_id(chairs.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.available_units, 10);
}

#[tokio::test]
async fn pickup_requires_approval_and_assignment() {
    let app = setup().await;
    let approver = seed_global_approver(&app, 1).await;
    let (camera, units) = seed_serialized_sarana(&app, "KAMERA", 1).await;

    let submitted = submit_with_items(
        &app,
        vec![NewItem {
            sarana_id: camera.id,
            quantity: 1,
        }],
    )
    .await;

    // Still pending.
    assert_matches!(
        app.custody
            .validate_pickup(submitted.peminjaman.id, Uuid::new_v4(), "foto-1".into())
            .await,
        Err(ServiceError::StateError(_))
    );

    approve_all(&app, &submitted, approver).await;

    // Approved but nothing assigned yet.
    assert_matches!(
        app.custody
            .validate_pickup(submitted.peminjaman.id, Uuid::new_v4(), "foto-1".into())
            .await,
        Err(ServiceError::StateError(_))
    );

    app.custody
        .assign_units(
            submitted.peminjaman.id,
            vec![AssignmentSpec {
                item_id: submitted.items[0].id,
                unit_ids: vec![units[0].id],
            }],
        )
        .await
        .unwrap();

    let picked = app
        .custody
        .validate_pickup(submitted.peminjaman.id, Uuid::new_v4(), "foto-1".into())
        .await
        .unwrap();
    assert_eq!(picked.status, "picked_up");
    assert!(picked.picked_up_at.is_some());
    assert_eq!(picked.pickup_photo_ref.as_deref(), Some("foto-1"));
}

#[tokio::test]
async fn place_only_request_skips_the_assignment_gate() {
    let app = setup().await;
    let approver = seed_global_approver(&app, 1).await;

    let submitted = submit_with_items(&app, vec![]).await;
    approve_all(&app, &submitted, approver).await;

    let picked = app
        .custody
        .validate_pickup(submitted.peminjaman.id, Uuid::new_v4(), "foto-kunci".into())
        .await
        .unwrap();
    assert_eq!(picked.status, "picked_up");
}

#[tokio::test]
async fn clean_return_restores_the_pool() {
    let app = setup().await;
    let approver = seed_global_approver(&app, 1).await;
    let chairs = seed_pooled_sarana(&app, "KURSI", 10).await;

    let submitted = submit_with_items(
        &app,
        vec![NewItem {
            sarana_id: chairs.id,
            quantity: 4,
        }],
    )
    .await;
    approve_all(&app, &submitted, approver).await;
    app.custody
        .assign_units(submitted.peminjaman.id, vec![])
        .await
        .unwrap();
    app.custody
        .validate_pickup(submitted.peminjaman.id, Uuid::new_v4(), "foto-ambil".into())
        .await
        .unwrap();

    let returned = app
        .custody
        .validate_return(
            submitted.peminjaman.id,
            Uuid::new_v4(),
            "foto-kembali".into(),
            vec![],
        )
        .await
        .unwrap();
    assert_eq!(returned.status, "returned");

    let after = SaranaEntity::find_by_id(chairs.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.available_units, 10);
    assert!(app
        .custody
        .assignments_for(submitted.peminjaman.id)
        .await
        .unwrap()
        .iter()
        .all(|a| a.released));
}

#[tokio::test]
async fn damaged_and_lost_stock_stays_out_of_the_pool() {
    let app = setup().await;
    let approver = seed_global_approver(&app, 1).await;
    let chairs = seed_pooled_sarana(&app, "KURSI", 10).await;
    let (camera, units) = seed_serialized_sarana(&app, "KAMERA", 2).await;

    let submitted = submit_with_items(
        &app,
        vec![
            NewItem {
                sarana_id: chairs.id,
                quantity: 6,
            },
            NewItem {
                sarana_id: camera.id,
                quantity: 2,
            },
        ],
    )
    .await;
    approve_all(&app, &submitted, approver).await;
    app.custody
        .assign_units(
            submitted.peminjaman.id,
            vec![AssignmentSpec {
                item_id: submitted.items[1].id,
                unit_ids: vec![units[0].id, units[1].id],
            }],
        )
        .await
        .unwrap();
    app.custody
        .validate_pickup(submitted.peminjaman.id, Uuid::new_v4(), "foto-ambil".into())
        .await
        .unwrap();

    app.custody
        .validate_return(
            submitted.peminjaman.id,
            Uuid::new_v4(),
            "foto-kembali".into(),
            vec![
                ReturnCondition {
                    unit_id: Some(units[0].id),
                    sarana_id: None,
                    quantity: 1,
                    condition: "damaged".to_string(),
                },
                ReturnCondition {
                    unit_id: None,
                    sarana_id: Some(chairs.id),
                    quantity: 2,
                    condition: "lost".to_string(),
                },
            ],
        )
        .await
        .unwrap();

    let chairs_after = SaranaEntity::find_by_id(chairs.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chairs_after.available_units, 8);
    assert_eq!(chairs_after.lost_units, 2);

    let damaged_unit = SaranaUnitEntity::find_by_id(units[0].id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(damaged_unit.status, "damaged");
    let good_unit = SaranaUnitEntity::find_by_id(units[1].id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(good_unit.status, "available");
}

#[tokio::test]
async fn return_requires_custody() {
    let app = setup().await;
    let approver = seed_global_approver(&app, 1).await;

    let submitted = submit_with_items(&app, vec![]).await;
    approve_all(&app, &submitted, approver).await;

    assert_matches!(
        app.custody
            .validate_return(
                submitted.peminjaman.id,
                Uuid::new_v4(),
                "foto".into(),
                vec![],
            )
            .await,
        Err(ServiceError::StateError(_))
    );
}

#[tokio::test]
async fn cancel_releases_custody_grants() {
    let app = setup().await;
    let approver = seed_global_approver(&app, 1).await;
    let chairs = seed_pooled_sarana(&app, "KURSI", 10).await;
    let (camera, units) = seed_serialized_sarana(&app, "KAMERA", 1).await;

    let submitted = submit_with_items(
        &app,
        vec![
            NewItem {
                sarana_id: chairs.id,
                quantity: 3,
            },
            NewItem {
                sarana_id: camera.id,
                quantity: 1,
            },
        ],
    )
    .await;
    let owner = submitted.peminjaman.owner_id;
    approve_all(&app, &submitted, approver).await;
    app.custody
        .assign_units(
            submitted.peminjaman.id,
            vec![AssignmentSpec {
                item_id: submitted.items[1].id,
                unit_ids: vec![units[0].id],
            }],
        )
        .await
        .unwrap();

    app.peminjaman
        .cancel(submitted.peminjaman.id, owner, "acara batal".into(), false)
        .await
        .unwrap();

    let chairs_after = SaranaEntity::find_by_id(chairs.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chairs_after.available_units, 10);

    // The freed unit is assignable again.
    let next = submit_with_items(
        &app,
        vec![NewItem {
            sarana_id: camera.id,
            quantity: 1,
        }],
    )
    .await;
    approve_all(&app, &next, approver).await;
    app.custody
        .assign_units(
            next.peminjaman.id,
            vec![AssignmentSpec {
                item_id: next.items[0].id,
                unit_ids: vec![units[0].id],
            }],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn unit_status_correction_refuses_assigned_units() {
    let app = setup().await;
    let approver = seed_global_approver(&app, 1).await;
    let (camera, units) = seed_serialized_sarana(&app, "KAMERA", 1).await;

    let corrected = app
        .custody
        .set_unit_status(units[0].id, UnitStatus::Maintenance)
        .await
        .unwrap();
    assert_eq!(corrected.status, "maintenance");
    app.custody
        .set_unit_status(units[0].id, UnitStatus::Available)
        .await
        .unwrap();

    let submitted = submit_with_items(
        &app,
        vec![NewItem {
            sarana_id: camera.id,
            quantity: 1,
        }],
    )
    .await;
    approve_all(&app, &submitted, approver).await;
    app.custody
        .assign_units(
            submitted.peminjaman.id,
            vec![AssignmentSpec {
                item_id: submitted.items[0].id,
                unit_ids: vec![units[0].id],
            }],
        )
        .await
        .unwrap();

    assert_matches!(
        app.custody
            .set_unit_status(units[0].id, UnitStatus::Lost)
            .await,
        Err(ServiceError::StateError(_))
    );
}
