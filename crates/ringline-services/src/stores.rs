//! Entity store wiring
//!
//! Bundles the repository handles the services need so the binary, the
//! client's in-process backend and the tests can pick a backend in one call.

use ringline_core::traits::{
    CallRequestRepository, CommissionRepository, NotificationRepository, ReportRepository,
    SessionRepository,
};
use ringline_db::{
    MemoryStore, PgCallRequestRepository, PgCommissionRepository, PgNotificationRepository,
    PgPool, PgReportRepository, PgSessionRepository,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct EntityStores {
    pub calls: Arc<dyn CallRequestRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub reports: Arc<dyn ReportRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub commissions: Arc<dyn CommissionRepository>,
}

impl EntityStores {
    /// Every record kind backed by the same in-memory store
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            calls: store.clone(),
            sessions: store.clone(),
            reports: store.clone(),
            notifications: store.clone(),
            commissions: store,
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            calls: Arc::new(PgCallRequestRepository::new(pool.clone())),
            sessions: Arc::new(PgSessionRepository::new(pool.clone())),
            reports: Arc::new(PgReportRepository::new(pool.clone())),
            notifications: Arc::new(PgNotificationRepository::new(pool.clone())),
            commissions: Arc::new(PgCommissionRepository::new(pool)),
        }
    }
}
