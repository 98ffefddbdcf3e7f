pub mod approvals;
pub mod custody;
pub mod health;
pub mod markings;
pub mod peminjaman;
pub mod resources;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::ReservationPolicy;
use crate::events::EventSender;
use crate::services::approvals::ApprovalService;
use crate::services::custody::CustodyService;
use crate::services::markings::MarkingService;
use crate::services::peminjaman::PeminjamanService;

/// Container for all domain services, one instance shared across handlers.
#[derive(Clone)]
pub struct AppServices {
    pub markings: Arc<MarkingService>,
    pub peminjaman: Arc<PeminjamanService>,
    pub approvals: Arc<ApprovalService>,
    pub custody: Arc<CustodyService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        policy: ReservationPolicy,
    ) -> Self {
        let markings = Arc::new(MarkingService::new(
            db.clone(),
            event_sender.clone(),
            policy.clone(),
        ));
        let peminjaman = Arc::new(PeminjamanService::new(
            db.clone(),
            event_sender.clone(),
            policy,
        ));
        let approvals = Arc::new(ApprovalService::new(db.clone(), event_sender.clone()));
        let custody = Arc::new(CustodyService::new(db, event_sender));

        Self {
            markings,
            peminjaman,
            approvals,
            custody,
        }
    }
}
