//! In-memory entity store
//!
//! Same semantics as the PostgreSQL repositories: conditional call request
//! transitions and idempotent session creation. All tables sit behind one
//! lock so every operation is atomic with respect to the others.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use ringline_core::{
    models::{
        CallRequest, CallRequestStatus, CallTransition, Notification, Report, Session,
    },
    traits::{
        CallRequestFilter, CallRequestRepository, CommissionRepository, NotificationRepository,
        ReportRepository, Repository, SessionRepository,
    },
    AppError, AppResult,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    call_requests: HashMap<Uuid, CallRequest>,
    sessions: HashMap<Uuid, Session>,
    /// call_request_id -> session id
    sessions_by_call: HashMap<Uuid, Uuid>,
    reports: HashMap<Uuid, Report>,
    notifications: HashMap<Uuid, Notification>,
    commissions: HashMap<Uuid, Decimal>,
}

/// Entity store held in process memory
pub struct MemoryStore {
    tables: RwLock<Tables>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: while unavailable every operation fails with
    /// `StoreUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Set or replace a broadcaster's commission rate
    pub fn set_commission_rate(&self, broadcaster_id: Uuid, rate: Decimal) {
        self.tables.write().commissions.insert(broadcaster_id, rate);
    }

    /// Snapshot of every session, oldest first
    pub fn all_sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<_> = self.tables.read().sessions.values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    /// Snapshot of every report, oldest first
    pub fn all_reports(&self) -> Vec<Report> {
        let mut reports: Vec<_> = self.tables.read().reports.values().cloned().collect();
        reports.sort_by_key(|r| r.created_at);
        reports
    }

    /// Snapshot of every notification, oldest first
    pub fn all_notifications(&self) -> Vec<Notification> {
        let mut notifications: Vec<_> =
            self.tables.read().notifications.values().cloned().collect();
        notifications.sort_by_key(|n| n.created_at);
        notifications
    }

    fn check_available(&self) -> AppResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ))
        }
    }
}

#[async_trait]
impl Repository<CallRequest, Uuid> for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<CallRequest>> {
        self.check_available()?;
        Ok(self.tables.read().call_requests.get(&id).cloned())
    }

    async fn create(&self, entity: &CallRequest) -> AppResult<CallRequest> {
        self.check_available()?;
        let mut tables = self.tables.write();
        if tables.call_requests.contains_key(&entity.id) {
            return Err(AppError::Conflict(format!(
                "Call request {} already exists",
                entity.id
            )));
        }
        tables.call_requests.insert(entity.id, entity.clone());
        debug!("Stored call request {}", entity.id);
        Ok(entity.clone())
    }

    async fn update(&self, entity: &CallRequest) -> AppResult<CallRequest> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let slot = tables
            .call_requests
            .get_mut(&entity.id)
            .ok_or(AppError::CallRequestNotFound(entity.id))?;
        *slot = entity.clone();
        Ok(entity.clone())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.check_available()?;
        self.tables
            .write()
            .call_requests
            .remove(&id)
            .map(|_| ())
            .ok_or(AppError::CallRequestNotFound(id))
    }
}

#[async_trait]
impl CallRequestRepository for MemoryStore {
    async fn list(&self, filter: &CallRequestFilter) -> AppResult<Vec<CallRequest>> {
        self.check_available()?;
        let tables = self.tables.read();

        let mut calls: Vec<CallRequest> = tables
            .call_requests
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        calls.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        if let Some(limit) = filter.limit {
            calls.truncate(limit.max(0) as usize);
        }
        Ok(calls)
    }

    async fn transition_if_ringing(
        &self,
        id: Uuid,
        transition: CallTransition,
        at: DateTime<Utc>,
    ) -> AppResult<CallRequest> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let call = tables
            .call_requests
            .get_mut(&id)
            .ok_or(AppError::CallRequestNotFound(id))?;

        call.apply(transition, at)?;
        info!("Call request {} -> {}", id, call.status);
        Ok(call.clone())
    }

    async fn find_accepted_without_session(&self, limit: i64) -> AppResult<Vec<CallRequest>> {
        self.check_available()?;
        let tables = self.tables.read();

        let mut calls: Vec<CallRequest> = tables
            .call_requests
            .values()
            .filter(|c| c.status == CallRequestStatus::Accepted)
            .filter(|c| !tables.sessions_by_call.contains_key(&c.id))
            .cloned()
            .collect();
        calls.sort_by_key(|c| c.answered_at);
        calls.truncate(limit.max(0) as usize);
        Ok(calls)
    }
}

#[async_trait]
impl Repository<Session, Uuid> for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Session>> {
        self.check_available()?;
        Ok(self.tables.read().sessions.get(&id).cloned())
    }

    async fn create(&self, entity: &Session) -> AppResult<Session> {
        self.check_available()?;
        let mut tables = self.tables.write();
        if tables.sessions_by_call.contains_key(&entity.call_request_id) {
            return Err(AppError::Conflict(format!(
                "Session for call request {} already exists",
                entity.call_request_id
            )));
        }
        tables
            .sessions_by_call
            .insert(entity.call_request_id, entity.id);
        tables.sessions.insert(entity.id, entity.clone());
        Ok(entity.clone())
    }

    async fn update(&self, entity: &Session) -> AppResult<Session> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let slot = tables
            .sessions
            .get_mut(&entity.id)
            .ok_or_else(|| AppError::SessionNotFound(entity.id.to_string()))?;
        *slot = entity.clone();
        Ok(entity.clone())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let session = tables
            .sessions
            .remove(&id)
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))?;
        tables.sessions_by_call.remove(&session.call_request_id);
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn find_by_call_request(&self, call_request_id: Uuid) -> AppResult<Option<Session>> {
        self.check_available()?;
        let tables = self.tables.read();
        Ok(tables
            .sessions_by_call
            .get(&call_request_id)
            .and_then(|id| tables.sessions.get(id))
            .cloned())
    }

    async fn create_for_call_request(&self, session: &Session) -> AppResult<Session> {
        self.check_available()?;
        let mut tables = self.tables.write();

        if let Some(existing) = tables
            .sessions_by_call
            .get(&session.call_request_id)
            .and_then(|id| tables.sessions.get(id))
        {
            debug!(
                "Session for call request {} already exists",
                session.call_request_id
            );
            return Ok(existing.clone());
        }

        tables
            .sessions_by_call
            .insert(session.call_request_id, session.id);
        tables.sessions.insert(session.id, session.clone());
        info!("Session {} opened", session.id);
        Ok(session.clone())
    }
}

#[async_trait]
impl Repository<Report, Uuid> for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Report>> {
        self.check_available()?;
        Ok(self.tables.read().reports.get(&id).cloned())
    }

    async fn create(&self, entity: &Report) -> AppResult<Report> {
        self.check_available()?;
        self.tables.write().reports.insert(entity.id, entity.clone());
        Ok(entity.clone())
    }

    async fn update(&self, entity: &Report) -> AppResult<Report> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let slot = tables
            .reports
            .get_mut(&entity.id)
            .ok_or_else(|| AppError::NotFound(format!("Report {}", entity.id)))?;
        *slot = entity.clone();
        Ok(entity.clone())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.check_available()?;
        self.tables
            .write()
            .reports
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Report {}", id)))
    }
}

#[async_trait]
impl ReportRepository for MemoryStore {
    async fn list_by_call_request(&self, call_request_id: Uuid) -> AppResult<Vec<Report>> {
        self.check_available()?;
        let mut reports: Vec<Report> = self
            .tables
            .read()
            .reports
            .values()
            .filter(|r| r.call_request_id == Some(call_request_id))
            .cloned()
            .collect();
        reports.sort_by_key(|r| r.created_at);
        Ok(reports)
    }
}

#[async_trait]
impl Repository<Notification, Uuid> for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Notification>> {
        self.check_available()?;
        Ok(self.tables.read().notifications.get(&id).cloned())
    }

    async fn create(&self, entity: &Notification) -> AppResult<Notification> {
        self.check_available()?;
        self.tables
            .write()
            .notifications
            .insert(entity.id, entity.clone());
        Ok(entity.clone())
    }

    async fn update(&self, entity: &Notification) -> AppResult<Notification> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let slot = tables
            .notifications
            .get_mut(&entity.id)
            .ok_or_else(|| AppError::NotFound(format!("Notification {}", entity.id)))?;
        *slot = entity.clone();
        Ok(entity.clone())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.check_available()?;
        self.tables
            .write()
            .notifications
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Notification {}", id)))
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn list_for_user(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<Notification>> {
        self.check_available()?;
        let mut notifications: Vec<Notification> = self
            .tables
            .read()
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notifications.truncate(limit.max(0) as usize);
        Ok(notifications)
    }
}

#[async_trait]
impl CommissionRepository for MemoryStore {
    async fn commission_rate(&self, broadcaster_id: Uuid) -> AppResult<Option<Decimal>> {
        self.check_available()?;
        Ok(self.tables.read().commissions.get(&broadcaster_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ringline_core::models::SessionStatus;
    use rust_decimal_macros::dec;

    fn ringing(broadcaster_id: Uuid, created_at: DateTime<Utc>) -> CallRequest {
        CallRequest {
            caller_id: Uuid::new_v4(),
            broadcaster_id,
            total_price: dec!(10.00),
            caller_name: "caller".to_string(),
            created_at,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_capped() {
        let store = MemoryStore::new();
        let broadcaster = Uuid::new_v4();
        let base = Utc::now();

        for i in 0..5 {
            let call = ringing(broadcaster, base + Duration::seconds(i));
            Repository::<CallRequest, Uuid>::create(&store, &call).await.unwrap();
        }
        let elsewhere = ringing(Uuid::new_v4(), base);
        Repository::<CallRequest, Uuid>::create(&store, &elsewhere).await.unwrap();

        let calls = store
            .list(&CallRequestFilter::ringing_for(broadcaster).limit(3))
            .await
            .unwrap();

        assert_eq!(calls.len(), 3);
        assert!(calls.windows(2).all(|w| w[0].created_at > w[1].created_at));
        assert!(calls.iter().all(|c| c.broadcaster_id == broadcaster));
    }

    #[tokio::test]
    async fn test_second_transition_is_stale() {
        let store = MemoryStore::new();
        let call = ringing(Uuid::new_v4(), Utc::now());
        Repository::<CallRequest, Uuid>::create(&store, &call).await.unwrap();

        let accepted = store
            .transition_if_ringing(call.id, CallTransition::Accept, Utc::now())
            .await
            .unwrap();
        assert_eq!(accepted.status, CallRequestStatus::Accepted);

        let err = store
            .transition_if_ringing(call.id, CallTransition::Cancel, Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_stale());

        let stored = Repository::<CallRequest, Uuid>::find_by_id(&store, call.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, CallRequestStatus::Accepted);
    }

    #[tokio::test]
    async fn test_transition_unknown_id() {
        let store = MemoryStore::new();
        let err = store
            .transition_if_ringing(Uuid::new_v4(), CallTransition::Reject, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CallRequestNotFound(_)));
    }

    #[tokio::test]
    async fn test_session_creation_is_idempotent() {
        let store = MemoryStore::new();
        let mut call = ringing(Uuid::new_v4(), Utc::now());
        call.apply(CallTransition::Accept, Utc::now()).unwrap();
        Repository::<CallRequest, Uuid>::create(&store, &call).await.unwrap();

        let first = store
            .create_for_call_request(&Session::from_call_request(&call, dec!(7.00)))
            .await
            .unwrap();
        let second = store
            .create_for_call_request(&Session::from_call_request(&call, dec!(7.00)))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.all_sessions().len(), 1);
        assert_eq!(first.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_accepted_without_session() {
        let store = MemoryStore::new();
        let mut orphan = ringing(Uuid::new_v4(), Utc::now());
        orphan.apply(CallTransition::Accept, Utc::now()).unwrap();
        let mut served = ringing(Uuid::new_v4(), Utc::now());
        served.apply(CallTransition::Accept, Utc::now()).unwrap();

        Repository::<CallRequest, Uuid>::create(&store, &orphan).await.unwrap();
        Repository::<CallRequest, Uuid>::create(&store, &served).await.unwrap();
        store
            .create_for_call_request(&Session::from_call_request(&served, dec!(7.00)))
            .await
            .unwrap();

        let pending = store.find_accepted_without_session(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, orphan.id);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = MemoryStore::new();
        store.set_available(false);

        let err = store
            .list(&CallRequestFilter::default())
            .await
            .unwrap_err();
        assert!(err.is_transient());

        store.set_available(true);
        assert!(store.list(&CallRequestFilter::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_missing_fails() {
        let store = MemoryStore::new();
        let err = Repository::<Report, Uuid>::delete(&store, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
