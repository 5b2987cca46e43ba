//! End-to-end signaling flows against the in-memory store

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use futures::future::join_all;
use ringline_core::config::SignalingConfig;
use ringline_core::models::{
    CallRequest, CallRequestStatus, CallType, EndReason, NewCallRequest, NotificationKind,
    Principal, Report, Session, SessionStatus,
};
use ringline_core::traits::{ReportRepository, Repository, SessionRepository};
use ringline_core::{AppError, AppResult};
use ringline_db::MemoryStore;
use ringline_services::{
    CallRequestService, CommissionEarningsCalculator, EntityStores, LegacyPolicy,
    SessionReconciler, StaleRequestPolicy, StaleRequestSweeper, SupersedePolicy, TtlPolicy,
};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct Fixture {
    store: Arc<MemoryStore>,
    service: Arc<CallRequestService>,
    caller: Principal,
    broadcaster: Principal,
}

fn fixture_with(
    stores: impl FnOnce(Arc<MemoryStore>) -> EntityStores,
    policy: Arc<dyn StaleRequestPolicy>,
) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let config = SignalingConfig {
        session_retry_attempts: 3,
        session_retry_backoff_ms: 50,
        ..Default::default()
    };
    let earnings = Arc::new(CommissionEarningsCalculator::new(store.clone(), dec!(0.30)));
    let service = CallRequestService::new(stores(store.clone()), earnings, policy, &config);

    Fixture {
        store,
        service: Arc::new(service),
        caller: Principal::viewer(Uuid::new_v4()),
        broadcaster: Principal::broadcaster(Uuid::new_v4(), true),
    }
}

fn fixture() -> Fixture {
    fixture_with(EntityStores::memory, Arc::new(LegacyPolicy))
}

fn video_booking(broadcaster_id: Uuid) -> NewCallRequest {
    NewCallRequest {
        broadcaster_id,
        call_type: CallType::Video,
        duration_minutes: 30,
        total_price: dec!(21.00),
        caller_name: "Jordan".to_string(),
        caller_photo: None,
    }
}

async fn stored(store: &MemoryStore, id: Uuid) -> CallRequest {
    Repository::<CallRequest, Uuid>::find_by_id(store, id)
        .await
        .unwrap()
        .unwrap()
}

/// Insert a ringing request that has been ringing for `age`
async fn seed_ringing(f: &Fixture, age: ChronoDuration) -> CallRequest {
    let mut call = CallRequest::new(f.caller.user_id, video_booking(f.broadcaster.user_id));
    call.created_at = Utc::now() - age;
    Repository::<CallRequest, Uuid>::create(f.store.as_ref(), &call)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_accept_within_poll_interval_opens_session() {
    let f = fixture();
    let call = f
        .service
        .book(&f.caller, video_booking(f.broadcaster.user_id))
        .await
        .unwrap();

    let incoming = f.service.incoming(&f.broadcaster).await.unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].id, call.id);

    let outcome = f.service.accept(&f.broadcaster, call.id).await.unwrap();

    assert_eq!(outcome.call_request.status, CallRequestStatus::Accepted);
    assert!(outcome.call_request.answered_at.is_some());
    assert_eq!(outcome.session.session_type, CallType::Video);
    assert_eq!(outcome.session.duration_minutes, 30);
    assert_eq!(outcome.session.total_price, dec!(21.00));
    assert_eq!(outcome.session.broadcaster_earnings, dec!(14.70));
    assert_eq!(outcome.session.status, SessionStatus::Active);
    assert_eq!(outcome.session.customer_id, f.caller.user_id);

    let notes = f.store.all_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, NotificationKind::CallAccepted);
    assert_eq!(notes[0].user_id, f.caller.user_id);
}

#[tokio::test]
async fn test_commission_override_is_used() {
    let f = fixture();
    f.store
        .set_commission_rate(f.broadcaster.user_id, dec!(0.20));
    let call = f
        .service
        .book(&f.caller, video_booking(f.broadcaster.user_id))
        .await
        .unwrap();

    let outcome = f.service.accept(&f.broadcaster, call.id).await.unwrap();
    assert_eq!(outcome.session.broadcaster_earnings, dec!(16.80));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_broadcaster_sees_it() {
    let f = fixture();
    let call = f
        .service
        .book(&f.caller, video_booking(f.broadcaster.user_id))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    let cancelled = f.service.cancel(&f.caller, call.id).await.unwrap();

    assert_eq!(cancelled.status, CallRequestStatus::Cancelled);
    assert_eq!(cancelled.end_reason, Some(EndReason::CancelledByCaller));
    assert!(cancelled.ended_at.is_some());
    assert!(f.service.incoming(&f.broadcaster).await.unwrap().is_empty());
    assert!(f.store.all_sessions().is_empty());

    // Accept after cancel is stale and opens nothing
    let err = f.service.accept(&f.broadcaster, call.id).await.unwrap_err();
    assert!(err.is_stale());
    assert!(f.store.all_sessions().is_empty());
}

#[tokio::test]
async fn test_ban_files_one_report() {
    let f = fixture();
    let call = f
        .service
        .book(&f.caller, video_booking(f.broadcaster.user_id))
        .await
        .unwrap();

    let outcome = f.service.ban(&f.broadcaster, call.id).await.unwrap();
    assert_eq!(outcome.call_request.status, CallRequestStatus::Banned);
    assert!(outcome.call_request.ended_at.is_some());
    assert!(outcome.warning.is_none());

    let report = outcome.report.unwrap();
    assert_eq!(report.reporter_id, f.broadcaster.user_id);
    assert_eq!(report.reported_user_id, f.caller.user_id);
    assert_eq!(report.call_request_id, Some(call.id));

    // Second ban is stale and files nothing
    let err = f.service.ban(&f.broadcaster, call.id).await.unwrap_err();
    assert!(matches!(err, AppError::StaleTransition { .. }));
    assert_eq!(f.store.all_reports().len(), 1);

    // The banned caller is not notified
    assert!(f.store.all_notifications().is_empty());
}

#[tokio::test]
async fn test_cancel_racing_accept_is_stale() {
    let f = fixture();
    let call = f
        .service
        .book(&f.caller, video_booking(f.broadcaster.user_id))
        .await
        .unwrap();

    let outcome = f.service.accept(&f.broadcaster, call.id).await.unwrap();
    let err = f.service.cancel(&f.caller, call.id).await.unwrap_err();

    assert!(err.is_stale());
    assert_eq!(err.public_message(), "This call is no longer available");

    let sessions = f.store.all_sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0], outcome.session);
    assert_eq!(stored(&f.store, call.id).await.status, CallRequestStatus::Accepted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolutions_single_winner() {
    for _ in 0..20 {
        let f = fixture();
        let call = f
            .service
            .book(&f.caller, video_booking(f.broadcaster.user_id))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let (s, b, id) = (f.service.clone(), f.broadcaster, call.id);
            handles.push(tokio::spawn(async move {
                s.accept(&b, id).await.map(|_| "accept")
            }));
            let (s, b) = (f.service.clone(), f.broadcaster);
            handles.push(tokio::spawn(async move {
                s.reject(&b, id).await.map(|_| "reject")
            }));
            let (s, b) = (f.service.clone(), f.broadcaster);
            handles.push(tokio::spawn(async move { s.ban(&b, id).await.map(|_| "ban") }));
            let (s, c) = (f.service.clone(), f.caller);
            handles.push(tokio::spawn(async move {
                s.cancel(&c, id).await.map(|_| "cancel")
            }));
        }

        let results: Vec<AppResult<&str>> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.is_stale()));

        let final_status = stored(&f.store, call.id).await.status;
        let expected = match *winners[0] {
            "accept" => CallRequestStatus::Accepted,
            "reject" => CallRequestStatus::Rejected,
            "ban" => CallRequestStatus::Banned,
            _ => CallRequestStatus::Cancelled,
        };
        assert_eq!(final_status, expected);
        assert!(f.store.all_sessions().len() <= 1);
        assert_eq!(
            f.store.all_sessions().len(),
            usize::from(final_status == CallRequestStatus::Accepted)
        );
        assert!(f.store.all_reports().len() <= 1);
    }
}

#[tokio::test]
async fn test_accept_one_of_two_ringing_leaves_other_untouched() {
    let f = fixture();
    let older = seed_ringing(&f, ChronoDuration::seconds(5)).await;
    let newer = f
        .service
        .book(&f.caller, video_booking(f.broadcaster.user_id))
        .await
        .unwrap();

    let incoming = f.service.incoming(&f.broadcaster).await.unwrap();
    assert_eq!(incoming[0].id, newer.id);

    f.service.accept(&f.broadcaster, newer.id).await.unwrap();

    assert_eq!(f.store.all_sessions().len(), 1);
    assert_eq!(stored(&f.store, older.id).await.status, CallRequestStatus::Ringing);
}

#[tokio::test]
async fn test_access_rules() {
    let f = fixture();
    let call = f
        .service
        .book(&f.caller, video_booking(f.broadcaster.user_id))
        .await
        .unwrap();
    let stranger = Principal::viewer(Uuid::new_v4());

    assert!(matches!(
        f.service.get(&stranger, call.id).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(f.service.get(&f.broadcaster, call.id).await.is_ok());

    assert!(matches!(
        f.service.accept(&stranger, call.id).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        f.service.cancel(&f.broadcaster, call.id).await,
        Err(AppError::Forbidden(_))
    ));

    let unapproved = Principal::broadcaster(f.broadcaster.user_id, false);
    assert!(matches!(
        f.service.incoming(&unapproved).await,
        Err(AppError::NotCallEligible(_))
    ));
    assert!(matches!(
        f.service.accept(&unapproved, call.id).await,
        Err(AppError::NotCallEligible(_))
    ));
    assert!(matches!(
        f.service.reject(&unapproved, call.id).await,
        Err(AppError::NotCallEligible(_))
    ));
    assert!(matches!(
        f.service.ban(&unapproved, call.id).await,
        Err(AppError::NotCallEligible(_))
    ));
    assert!(f.store.all_sessions().is_empty());
    assert!(f.store.all_reports().is_empty());
    assert_eq!(stored(&f.store, call.id).await.status, CallRequestStatus::Ringing);

    assert!(matches!(
        f.service.accept(&f.broadcaster, Uuid::new_v4()).await,
        Err(AppError::CallRequestNotFound(_))
    ));
    assert!(matches!(
        f.service.session_for(&f.caller, call.id).await,
        Err(AppError::SessionNotFound(_))
    ));

    assert_eq!(f.service.outgoing(&f.caller).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_booking_validation() {
    let f = fixture();

    let self_call = video_booking(f.caller.user_id);
    assert!(matches!(
        f.service.book(&f.caller, self_call).await,
        Err(AppError::InvalidInput(_))
    ));

    let mut free_minutes = video_booking(f.broadcaster.user_id);
    free_minutes.duration_minutes = 0;
    assert!(matches!(
        f.service.book(&f.caller, free_minutes).await,
        Err(AppError::Validation(_))
    ));

    let mut negative = video_booking(f.broadcaster.user_id);
    negative.total_price = dec!(-1);
    assert!(f.service.book(&f.caller, negative).await.is_err());
}

// ==================== Stale policies ====================

#[tokio::test]
async fn test_legacy_policy_never_sweeps() {
    let f = fixture();
    let old = seed_ringing(&f, ChronoDuration::hours(3)).await;

    assert_eq!(f.service.sweep_stale(Utc::now()).await.unwrap(), 0);
    assert_eq!(stored(&f.store, old.id).await.status, CallRequestStatus::Ringing);
}

#[tokio::test]
async fn test_ttl_policy_expires_old_requests() {
    let f = fixture_with(
        EntityStores::memory,
        Arc::new(TtlPolicy::new(Duration::from_secs(60))),
    );
    let old = seed_ringing(&f, ChronoDuration::seconds(120)).await;
    let fresh = seed_ringing(&f, ChronoDuration::seconds(5)).await;

    assert_eq!(f.service.sweep_stale(Utc::now()).await.unwrap(), 1);

    let old = stored(&f.store, old.id).await;
    assert_eq!(old.status, CallRequestStatus::Rejected);
    assert_eq!(old.end_reason, Some(EndReason::Expired));
    assert_eq!(stored(&f.store, fresh.id).await.status, CallRequestStatus::Ringing);

    let notes = f.store.all_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, NotificationKind::CallMissed);
    assert_eq!(notes[0].user_id, f.caller.user_id);
}

#[tokio::test]
async fn test_supersede_policy_rejects_older_on_arrival() {
    let f = fixture_with(EntityStores::memory, Arc::new(SupersedePolicy));
    let older = seed_ringing(&f, ChronoDuration::seconds(30)).await;

    let newer = f
        .service
        .book(&f.caller, video_booking(f.broadcaster.user_id))
        .await
        .unwrap();

    let older = stored(&f.store, older.id).await;
    assert_eq!(older.status, CallRequestStatus::Rejected);
    assert_eq!(older.end_reason, Some(EndReason::Superseded));

    let incoming = f.service.incoming(&f.broadcaster).await.unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].id, newer.id);
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_task_runs_until_cancelled() {
    let f = fixture_with(
        EntityStores::memory,
        Arc::new(TtlPolicy::new(Duration::from_secs(60))),
    );
    let old = seed_ringing(&f, ChronoDuration::seconds(90)).await;

    let shutdown = CancellationToken::new();
    let handle = StaleRequestSweeper::new(f.service.clone(), Duration::from_secs(10))
        .spawn(shutdown.clone());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(stored(&f.store, old.id).await.end_reason, Some(EndReason::Expired));

    shutdown.cancel();
    handle.await.unwrap();
}

// ==================== Session recovery ====================

/// Session store that refuses the first `failures` inserts
struct FlakySessions {
    inner: Arc<MemoryStore>,
    failures: AtomicU32,
}

#[async_trait]
impl Repository<Session, Uuid> for FlakySessions {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Session>> {
        Repository::<Session, Uuid>::find_by_id(self.inner.as_ref(), id).await
    }
    async fn create(&self, entity: &Session) -> AppResult<Session> {
        Repository::<Session, Uuid>::create(self.inner.as_ref(), entity).await
    }
    async fn update(&self, entity: &Session) -> AppResult<Session> {
        Repository::<Session, Uuid>::update(self.inner.as_ref(), entity).await
    }
    async fn delete(&self, id: Uuid) -> AppResult<()> {
        Repository::<Session, Uuid>::delete(self.inner.as_ref(), id).await
    }
}

#[async_trait]
impl SessionRepository for FlakySessions {
    async fn find_by_call_request(&self, id: Uuid) -> AppResult<Option<Session>> {
        self.inner.find_by_call_request(id).await
    }
    async fn create_for_call_request(&self, session: &Session) -> AppResult<Session> {
        let refused = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(AppError::StoreUnavailable("sessions offline".into()));
        }
        self.inner.create_for_call_request(session).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_reconciler_repairs_missing_session() {
    let f = fixture_with(
        |store| {
            let mut stores = EntityStores::memory(store.clone());
            stores.sessions = Arc::new(FlakySessions {
                inner: store,
                failures: AtomicU32::new(3),
            });
            stores
        },
        Arc::new(LegacyPolicy),
    );
    let call = f
        .service
        .book(&f.caller, video_booking(f.broadcaster.user_id))
        .await
        .unwrap();

    let err = f.service.accept(&f.broadcaster, call.id).await.unwrap_err();
    assert!(matches!(err, AppError::SessionCreationFailed { .. }));
    assert_eq!(stored(&f.store, call.id).await.status, CallRequestStatus::Accepted);
    assert!(f.store.all_sessions().is_empty());

    // The caller is still told the call was accepted
    assert_eq!(f.store.all_notifications()[0].kind, NotificationKind::CallAccepted);

    let reconciler = SessionReconciler::new(f.service.clone(), Duration::from_secs(30));
    assert_eq!(reconciler.reconcile_once().await, 1);
    assert_eq!(reconciler.reconcile_once().await, 0);

    let session = f.service.session_for(&f.caller, call.id).await.unwrap();
    assert_eq!(session.broadcaster_earnings, dec!(14.70));
    assert_eq!(f.store.all_sessions().len(), 1);
}

// ==================== Partial ban failure ====================

struct RefusingReports;

#[async_trait]
impl Repository<Report, Uuid> for RefusingReports {
    async fn find_by_id(&self, _id: Uuid) -> AppResult<Option<Report>> {
        Ok(None)
    }
    async fn create(&self, _entity: &Report) -> AppResult<Report> {
        Err(AppError::StoreUnavailable("reports offline".into()))
    }
    async fn update(&self, entity: &Report) -> AppResult<Report> {
        Err(AppError::NotFound(entity.id.to_string()))
    }
    async fn delete(&self, id: Uuid) -> AppResult<()> {
        Err(AppError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl ReportRepository for RefusingReports {
    async fn list_by_call_request(&self, _id: Uuid) -> AppResult<Vec<Report>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_ban_survives_report_failure() {
    let f = fixture_with(
        |store| {
            let mut stores = EntityStores::memory(store);
            stores.reports = Arc::new(RefusingReports);
            stores
        },
        Arc::new(LegacyPolicy),
    );
    let call = f
        .service
        .book(&f.caller, video_booking(f.broadcaster.user_id))
        .await
        .unwrap();

    let outcome = f.service.ban(&f.broadcaster, call.id).await.unwrap();
    assert_eq!(outcome.call_request.status, CallRequestStatus::Banned);
    assert!(outcome.report.is_none());
    assert!(outcome.warning.is_some());
    assert_eq!(stored(&f.store, call.id).await.status, CallRequestStatus::Banned);
}
