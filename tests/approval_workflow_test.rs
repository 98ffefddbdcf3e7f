mod common;

use assert_matches::assert_matches;
use uuid::Uuid;

use sarpras_api::entities::approval_step::ApprovalDecision;
use sarpras_api::entities::resource_approver::{RESOURCE_PRASARANA, RESOURCE_SARANA};
use sarpras_api::errors::ServiceError;
use sarpras_api::services::peminjaman::{NewItem, NewPeminjaman};

use common::{
    seed_global_approver, seed_pooled_sarana, seed_prasarana, seed_resource_approver, setup,
    slot,
};

fn request_on_place(prasarana_id: Uuid, days_from_now: i64) -> NewPeminjaman {
    let (start_at, end_at) = slot(days_from_now, 4);
    NewPeminjaman {
        owner_id: Uuid::new_v4(),
        prasarana_id: Some(prasarana_id),
        location_text: None,
        start_at,
        end_at,
        participants: 30,
        document_ref: Some("SURAT/123".to_string()),
        marking_id: None,
        items: vec![],
    }
}

#[tokio::test]
async fn submission_builds_global_and_resource_gates() {
    let app = setup().await;
    let place = seed_prasarana(&app, "AULA").await;
    let equipment = seed_pooled_sarana(&app, "KURSI", 100).await;
    let lvl1 = seed_global_approver(&app, 1).await;
    let lvl2 = seed_global_approver(&app, 2).await;
    let place_owner = seed_resource_approver(&app, RESOURCE_PRASARANA, place.id, 1).await;
    let equipment_owner = seed_resource_approver(&app, RESOURCE_SARANA, equipment.id, 1).await;

    let mut new = request_on_place(place.id, 2);
    new.items = vec![NewItem {
        sarana_id: equipment.id,
        quantity: 10,
    }];
    let submitted = app.peminjaman.submit(new).await.unwrap();

    assert_eq!(submitted.peminjaman.status, "pending");
    assert_eq!(submitted.steps.len(), 4);
    let approvers: Vec<Uuid> = submitted.steps.iter().map(|s| s.approver_id).collect();
    assert!(approvers.contains(&lvl1));
    assert!(approvers.contains(&lvl2));
    assert!(approvers.contains(&place_owner));
    assert!(approvers.contains(&equipment_owner));
    assert!(submitted.steps.iter().all(|s| s.decision == "pending"));
}

#[tokio::test]
async fn gapped_roster_levels_become_contiguous_gates() {
    let app = setup().await;
    let place = seed_prasarana(&app, "AULA").await;
    let low = seed_global_approver(&app, 1).await;
    let high = seed_global_approver(&app, 3).await;

    let submitted = app
        .peminjaman
        .submit(request_on_place(place.id, 2))
        .await
        .unwrap();

    let mut levels: Vec<(i32, Uuid)> = submitted
        .steps
        .iter()
        .map(|s| (s.level, s.approver_id))
        .collect();
    levels.sort();
    assert_eq!(levels, vec![(1, low), (2, high)]);

    // The renumbered chain still gates in roster order.
    let queue = app.approvals.actionable_steps_for(high).await.unwrap();
    assert!(queue.is_empty());
    let first = submitted.steps.iter().find(|s| s.approver_id == low).unwrap();
    app.approvals
        .process_approval(first.id, low, ApprovalDecision::Approved, None)
        .await
        .unwrap();
    let queue = app.approvals.actionable_steps_for(high).await.unwrap();
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn request_stays_pending_until_every_gate_approves() {
    let app = setup().await;
    let place = seed_prasarana(&app, "AULA").await;
    let lvl1 = seed_global_approver(&app, 1).await;
    let lvl2 = seed_global_approver(&app, 2).await;

    let submitted = app
        .peminjaman
        .submit(request_on_place(place.id, 2))
        .await
        .unwrap();
    let steps = submitted.steps;
    let first = steps.iter().find(|s| s.approver_id == lvl1).unwrap();
    let second = steps.iter().find(|s| s.approver_id == lvl2).unwrap();

    let outcome = app
        .approvals
        .process_approval(first.id, lvl1, ApprovalDecision::Approved, None)
        .await
        .unwrap();
    assert_eq!(outcome.peminjaman_status.as_str(), "pending");
    assert!(!outcome.out_of_order);

    let outcome = app
        .approvals
        .process_approval(second.id, lvl2, ApprovalDecision::Approved, None)
        .await
        .unwrap();
    assert_eq!(outcome.peminjaman_status.as_str(), "approved");
}

#[tokio::test]
async fn skip_ahead_decision_is_accepted_but_flagged() {
    let app = setup().await;
    let place = seed_prasarana(&app, "AULA").await;
    let _lvl1 = seed_global_approver(&app, 1).await;
    let lvl2 = seed_global_approver(&app, 2).await;

    let submitted = app
        .peminjaman
        .submit(request_on_place(place.id, 2))
        .await
        .unwrap();
    let higher = submitted
        .steps
        .iter()
        .find(|s| s.approver_id == lvl2)
        .unwrap();

    let outcome = app
        .approvals
        .process_approval(higher.id, lvl2, ApprovalDecision::Approved, None)
        .await
        .unwrap();
    assert!(outcome.out_of_order);
    assert!(outcome.step.out_of_order);
    assert_eq!(outcome.peminjaman_status.as_str(), "pending");
}

#[tokio::test]
async fn rejection_short_circuits_the_request() {
    let app = setup().await;
    let place = seed_prasarana(&app, "AULA").await;
    let lvl1 = seed_global_approver(&app, 1).await;
    let lvl2 = seed_global_approver(&app, 2).await;

    let submitted = app
        .peminjaman
        .submit(request_on_place(place.id, 2))
        .await
        .unwrap();
    let first = submitted
        .steps
        .iter()
        .find(|s| s.approver_id == lvl1)
        .unwrap();

    let outcome = app
        .approvals
        .process_approval(
            first.id,
            lvl1,
            ApprovalDecision::Rejected,
            Some("jadwal bentrok dengan agenda resmi".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(outcome.peminjaman_status.as_str(), "rejected");

    let request = app
        .peminjaman
        .get(submitted.peminjaman.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status, "rejected");
    assert!(request.rejection_reason.is_some());

    // Remaining gates stay undecided but the request is terminal.
    let second = submitted
        .steps
        .iter()
        .find(|s| s.approver_id == lvl2)
        .unwrap();
    assert_matches!(
        app.approvals
            .process_approval(second.id, lvl2, ApprovalDecision::Approved, None)
            .await,
        Err(ServiceError::StateError(_))
    );
}

#[tokio::test]
async fn rejection_requires_a_reason() {
    let app = setup().await;
    let place = seed_prasarana(&app, "AULA").await;
    let lvl1 = seed_global_approver(&app, 1).await;

    let submitted = app
        .peminjaman
        .submit(request_on_place(place.id, 2))
        .await
        .unwrap();
    let step = &submitted.steps[0];

    assert_matches!(
        app.approvals
            .process_approval(step.id, lvl1, ApprovalDecision::Rejected, None)
            .await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn only_the_assigned_approver_may_decide() {
    let app = setup().await;
    let place = seed_prasarana(&app, "AULA").await;
    let _lvl1 = seed_global_approver(&app, 1).await;

    let submitted = app
        .peminjaman
        .submit(request_on_place(place.id, 2))
        .await
        .unwrap();
    let step = &submitted.steps[0];

    assert_matches!(
        app.approvals
            .process_approval(step.id, Uuid::new_v4(), ApprovalDecision::Approved, None)
            .await,
        Err(ServiceError::AuthorizationError(_))
    );
}

#[tokio::test]
async fn override_decides_on_behalf_and_records_the_actor() {
    let app = setup().await;
    let place = seed_prasarana(&app, "AULA").await;
    let lvl1 = seed_global_approver(&app, 1).await;

    let submitted = app
        .peminjaman
        .submit(request_on_place(place.id, 2))
        .await
        .unwrap();
    let step = &submitted.steps[0];
    let admin = Uuid::new_v4();

    let outcome = app
        .approvals
        .override_approval(step.id, admin, ApprovalDecision::Approved, None)
        .await
        .unwrap();
    assert_eq!(outcome.peminjaman_status.as_str(), "approved");
    assert_eq!(outcome.step.approver_id, lvl1);
    assert_eq!(outcome.step.overridden_by, Some(admin));
}

#[tokio::test]
async fn decided_step_refuses_a_second_decision() {
    let app = setup().await;
    let place = seed_prasarana(&app, "AULA").await;
    let lvl1 = seed_global_approver(&app, 1).await;

    let submitted = app
        .peminjaman
        .submit(request_on_place(place.id, 2))
        .await
        .unwrap();
    let step = &submitted.steps[0];

    app.approvals
        .process_approval(step.id, lvl1, ApprovalDecision::Approved, None)
        .await
        .unwrap();
    assert_matches!(
        app.approvals
            .process_approval(step.id, lvl1, ApprovalDecision::Approved, None)
            .await,
        Err(ServiceError::StateError(_))
    );
}

#[tokio::test]
async fn approver_queue_hides_steps_behind_lower_gates() {
    let app = setup().await;
    let place = seed_prasarana(&app, "AULA").await;
    let lvl1 = seed_global_approver(&app, 1).await;
    let lvl2 = seed_global_approver(&app, 2).await;

    let submitted = app
        .peminjaman
        .submit(request_on_place(place.id, 2))
        .await
        .unwrap();

    assert_eq!(app.approvals.actionable_steps_for(lvl1).await.unwrap().len(), 1);
    assert!(app.approvals.actionable_steps_for(lvl2).await.unwrap().is_empty());

    let first = submitted
        .steps
        .iter()
        .find(|s| s.approver_id == lvl1)
        .unwrap();
    app.approvals
        .process_approval(first.id, lvl1, ApprovalDecision::Approved, None)
        .await
        .unwrap();

    assert_eq!(app.approvals.actionable_steps_for(lvl2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn resource_chains_gate_independently_of_global_levels() {
    let app = setup().await;
    let place = seed_prasarana(&app, "AULA").await;
    let lvl2 = seed_global_approver(&app, 2).await;
    let place_owner = seed_resource_approver(&app, RESOURCE_PRASARANA, place.id, 1).await;

    let submitted = app
        .peminjaman
        .submit(request_on_place(place.id, 2))
        .await
        .unwrap();
    assert_eq!(submitted.steps.len(), 2);

    // The resource chain has no lower gate, so its step is actionable even
    // while the global chain is untouched.
    assert_eq!(
        app.approvals
            .actionable_steps_for(place_owner)
            .await
            .unwrap()
            .len(),
        1
    );
    let _ = lvl2;
}

#[tokio::test]
async fn overlapping_requests_share_one_conflict_group() {
    let app = setup().await;
    let place = seed_prasarana(&app, "AULA").await;

    let first = app
        .peminjaman
        .submit(request_on_place(place.id, 2))
        .await
        .unwrap();
    assert!(first.peminjaman.conflict_group.is_none());

    let second = app
        .peminjaman
        .submit(request_on_place(place.id, 2))
        .await
        .unwrap();
    let third = app
        .peminjaman
        .submit(request_on_place(place.id, 2))
        .await
        .unwrap();

    let group = second
        .peminjaman
        .conflict_group
        .clone()
        .expect("second request is flagged");
    assert!(group.starts_with("CG-"));
    assert_eq!(third.peminjaman.conflict_group, Some(group.clone()));

    // The first request was stamped retroactively with the same group.
    let first_after = app
        .peminjaman
        .get(first.peminjaman.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first_after.conflict_group, Some(group));
}

#[tokio::test]
async fn cancel_is_owner_only_without_override() {
    let app = setup().await;
    let place = seed_prasarana(&app, "AULA").await;
    let new = request_on_place(place.id, 2);
    let owner = new.owner_id;
    let submitted = app.peminjaman.submit(new).await.unwrap();

    assert_matches!(
        app.peminjaman
            .cancel(
                submitted.peminjaman.id,
                Uuid::new_v4(),
                "batal".to_string(),
                false,
            )
            .await,
        Err(ServiceError::AuthorizationError(_))
    );

    let cancelled = app
        .peminjaman
        .cancel(submitted.peminjaman.id, owner, "acara batal".to_string(), false)
        .await
        .unwrap();
    assert_eq!(cancelled.status, "cancelled");
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("acara batal"));

    assert_matches!(
        app.peminjaman
            .cancel(submitted.peminjaman.id, owner, "lagi".to_string(), false)
            .await,
        Err(ServiceError::StateError(_))
    );
}
