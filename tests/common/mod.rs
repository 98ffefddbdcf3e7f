//! Shared harness: in-memory sqlite with the schema applied and the full
//! service set wired to a live event channel.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;
use uuid::Uuid;

use sarpras_api::config::ReservationPolicy;
use sarpras_api::entities::{
    global_approver, prasarana, resource_approver, sarana, sarana_unit,
    sarana_unit::UnitStatus,
};
use sarpras_api::events::{process_events, EventSender};
use sarpras_api::migrator::Migrator;
use sarpras_api::services::approvals::ApprovalService;
use sarpras_api::services::custody::CustodyService;
use sarpras_api::services::markings::MarkingService;
use sarpras_api::services::peminjaman::PeminjamanService;

pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub markings: MarkingService,
    pub peminjaman: PeminjamanService,
    pub approvals: ApprovalService,
    pub custody: CustodyService,
    pub policy: ReservationPolicy,
}

pub async fn setup() -> TestApp {
    setup_with_policy(ReservationPolicy::default()).await
}

pub async fn setup_with_policy(policy: ReservationPolicy) -> TestApp {
    // One pooled connection, otherwise each connection sees its own memory db.
    let mut options = ConnectOptions::new("sqlite::memory:".to_owned());
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options)
        .await
        .expect("sqlite memory connection");
    Migrator::up(&db, None).await.expect("schema applied");
    let db = Arc::new(db);

    let (event_sender, event_rx) = EventSender::channel(256);
    tokio::spawn(process_events(event_rx));

    TestApp {
        markings: MarkingService::new(db.clone(), event_sender.clone(), policy.clone()),
        peminjaman: PeminjamanService::new(db.clone(), event_sender.clone(), policy.clone()),
        approvals: ApprovalService::new(db.clone(), event_sender.clone()),
        custody: CustodyService::new(db.clone(), event_sender),
        db,
        policy,
    }
}

pub fn slot(days_from_now: i64, hours: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc::now() + Duration::days(days_from_now);
    (start, start + Duration::hours(hours))
}

pub async fn seed_prasarana(app: &TestApp, code: &str) -> prasarana::Model {
    prasarana::ActiveModel {
        code: Set(code.to_string()),
        name: Set(format!("Gedung {}", code)),
        location: Set(Some("kampus utara".to_string())),
        capacity: Set(Some(120)),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(&*app.db)
    .await
    .expect("prasarana seeded")
}

pub async fn seed_pooled_sarana(app: &TestApp, code: &str, stock: i32) -> sarana::Model {
    sarana::ActiveModel {
        code: Set(code.to_string()),
        name: Set(format!("Peralatan {}", code)),
        tracking: Set("pooled".to_string()),
        total_units: Set(stock),
        available_units: Set(stock),
        damaged_units: Set(0),
        maintenance_units: Set(0),
        lost_units: Set(0),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(&*app.db)
    .await
    .expect("pooled sarana seeded")
}

pub async fn seed_serialized_sarana(
    app: &TestApp,
    code: &str,
    unit_count: usize,
) -> (sarana::Model, Vec<sarana_unit::Model>) {
    let equipment = sarana::ActiveModel {
        code: Set(code.to_string()),
        name: Set(format!("Peralatan {}", code)),
        tracking: Set("serialized".to_string()),
        total_units: Set(unit_count as i32),
        available_units: Set(0),
        damaged_units: Set(0),
        maintenance_units: Set(0),
        lost_units: Set(0),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(&*app.db)
    .await
    .expect("serialized sarana seeded");

    let mut units = Vec::with_capacity(unit_count);
    for n in 0..unit_count {
        let unit = sarana_unit::ActiveModel {
            sarana_id: Set(equipment.id),
            unit_code: Set(format!("{}-{:03}", code, n + 1)),
            status: Set(UnitStatus::Available.as_str().to_string()),
            ..Default::default()
        }
        .insert(&*app.db)
        .await
        .expect("unit seeded");
        units.push(unit);
    }
    (equipment, units)
}

pub async fn seed_global_approver(app: &TestApp, level: i32) -> Uuid {
    let user_id = Uuid::new_v4();
    global_approver::ActiveModel {
        user_id: Set(user_id),
        level: Set(level),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(&*app.db)
    .await
    .expect("global approver seeded");
    user_id
}

pub async fn seed_resource_approver(
    app: &TestApp,
    resource_type: &str,
    resource_id: Uuid,
    level: i32,
) -> Uuid {
    let user_id = Uuid::new_v4();
    resource_approver::ActiveModel {
        resource_type: Set(resource_type.to_string()),
        resource_id: Set(resource_id),
        user_id: Set(user_id),
        level: Set(level),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(&*app.db)
    .await
    .expect("resource approver seeded");
    user_id
}
