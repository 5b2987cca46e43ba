//! Call request service
//!
//! Every mutation of a call request goes through `transition_if_ringing`, so
//! concurrent accept/reject/ban/cancel attempts on the same record resolve to
//! exactly one winner. Losers get `StaleTransition`. Secondary writes
//! (session, report, notification) happen only after the transition commits.

use chrono::{DateTime, Utc};
use ringline_core::{
    config::SignalingConfig,
    models::{
        CallRequest, CallRequestStatus, CallTransition, NewCallRequest, Principal, Report,
        Session, UserRole,
    },
    traits::{
        CallRequestFilter, CallRequestRepository, EarningsCalculator, ReportRepository,
        SessionRepository,
    },
    AppError, AppResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::constants::{RECONCILE_BATCH, SWEEP_BATCH};
use crate::notifier::CallNotifier;
use crate::resolution::{CallResolutionHandler, RetryPolicy};
use crate::stale_policy::{AutoResolution, StaleRequestPolicy};
use crate::stores::EntityStores;

/// Result of a successful accept
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptOutcome {
    pub call_request: CallRequest,
    pub session: Session,
}

/// Result of a ban. The ban is authoritative even when the report write
/// failed; `warning` says so.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanOutcome {
    pub call_request: CallRequest,
    pub report: Option<Report>,
    pub warning: Option<String>,
}

pub struct CallRequestService {
    calls: Arc<dyn CallRequestRepository>,
    sessions: Arc<dyn SessionRepository>,
    reports: Arc<dyn ReportRepository>,
    resolution: CallResolutionHandler,
    notifier: CallNotifier,
    policy: Arc<dyn StaleRequestPolicy>,
    incoming_page_size: i64,
    outgoing_page_size: i64,
}

impl CallRequestService {
    pub fn new(
        stores: EntityStores,
        earnings: Arc<dyn EarningsCalculator>,
        policy: Arc<dyn StaleRequestPolicy>,
        config: &SignalingConfig,
    ) -> Self {
        let resolution = CallResolutionHandler::new(
            stores.calls.clone(),
            stores.sessions.clone(),
            earnings,
            RetryPolicy {
                attempts: config.session_retry_attempts,
                backoff: config.session_retry_backoff(),
            },
        );

        info!("Call request service using '{}' stale policy", policy.name());

        Self {
            calls: stores.calls,
            sessions: stores.sessions,
            reports: stores.reports,
            resolution,
            notifier: CallNotifier::new(stores.notifications),
            policy,
            incoming_page_size: config.incoming_page_size.max(1),
            outgoing_page_size: config.outgoing_page_size.max(1),
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    // ==================== Booking ====================

    /// Place a call request. It starts ringing immediately.
    #[instrument(skip(self, booking), fields(caller_id = %caller.user_id, broadcaster_id = %booking.broadcaster_id))]
    pub async fn book(&self, caller: &Principal, booking: NewCallRequest) -> AppResult<CallRequest> {
        booking.validate_for(caller.user_id)?;

        let created = self
            .calls
            .create(&CallRequest::new(caller.user_id, booking))
            .await?;

        info!(
            "Call request {} ringing: {} for {} min at {}",
            created.id, created.call_type, created.duration_minutes, created.total_price
        );

        self.apply_arrival_policy(&created).await;
        Ok(created)
    }

    async fn apply_arrival_policy(&self, arrived: &CallRequest) {
        let others = match self
            .calls
            .list(&CallRequestFilter::ringing_for(arrived.broadcaster_id))
            .await
        {
            Ok(others) => others,
            Err(e) => {
                // The next arrival or sweep gets another chance
                warn!("Arrival policy skipped for {}: {}", arrived.id, e);
                return;
            }
        };

        let picks = self.policy.on_arrival(arrived, &others);
        self.apply_auto_resolutions(picks).await;
    }

    // ==================== Queries ====================

    /// Fetch a call request. Only its parties (and admins) may see it.
    #[instrument(skip(self))]
    pub async fn get(&self, principal: &Principal, id: Uuid) -> AppResult<CallRequest> {
        let call = self.load(id).await?;

        if !call.involves(principal.user_id) && principal.role != UserRole::Admin {
            return Err(AppError::Forbidden(format!(
                "Call request {} does not involve you",
                id
            )));
        }

        Ok(call)
    }

    /// Ringing requests for a broadcaster, newest first
    #[instrument(skip(self), fields(broadcaster_id = %broadcaster.user_id))]
    pub async fn incoming(&self, broadcaster: &Principal) -> AppResult<Vec<CallRequest>> {
        if !broadcaster.can_receive_calls() {
            return Err(AppError::NotCallEligible(broadcaster.user_id));
        }

        let calls = self
            .calls
            .list(&CallRequestFilter::ringing_for(broadcaster.user_id).limit(self.incoming_page_size))
            .await?;

        debug!("{} ringing for {}", calls.len(), broadcaster.user_id);
        Ok(calls)
    }

    /// A caller's recent requests, any status
    #[instrument(skip(self), fields(caller_id = %caller.user_id))]
    pub async fn outgoing(&self, caller: &Principal) -> AppResult<Vec<CallRequest>> {
        self.calls
            .list(&CallRequestFilter::placed_by(caller.user_id).limit(self.outgoing_page_size))
            .await
    }

    /// Session opened for an accepted call request
    #[instrument(skip(self))]
    pub async fn session_for(&self, principal: &Principal, call_request_id: Uuid) -> AppResult<Session> {
        self.get(principal, call_request_id).await?;

        self.sessions
            .find_by_call_request(call_request_id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(call_request_id.to_string()))
    }

    // ==================== Broadcaster transitions ====================

    /// Accept a ringing request and open its session
    #[instrument(skip(self), fields(broadcaster_id = %broadcaster.user_id))]
    pub async fn accept(&self, broadcaster: &Principal, id: Uuid) -> AppResult<AcceptOutcome> {
        self.load_as_broadcaster(broadcaster, id).await?;

        match self.resolution.accept(id).await {
            Ok((call_request, session)) => {
                self.notifier.notify_resolution(&call_request).await;
                Ok(AcceptOutcome {
                    call_request,
                    session,
                })
            }
            Err(e @ AppError::SessionCreationFailed { .. }) => {
                // The transition committed; the caller still hears about it
                if let Ok(call) = self.load(id).await {
                    self.notifier.notify_resolution(&call).await;
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Decline a ringing request
    #[instrument(skip(self), fields(broadcaster_id = %broadcaster.user_id))]
    pub async fn reject(&self, broadcaster: &Principal, id: Uuid) -> AppResult<CallRequest> {
        self.load_as_broadcaster(broadcaster, id).await?;

        let rejected = self.transition(id, CallTransition::Reject).await?;
        self.notifier.notify_resolution(&rejected).await;
        Ok(rejected)
    }

    /// Ban the caller of a ringing request and file a report against them
    #[instrument(skip(self), fields(broadcaster_id = %broadcaster.user_id))]
    pub async fn ban(&self, broadcaster: &Principal, id: Uuid) -> AppResult<BanOutcome> {
        self.load_as_broadcaster(broadcaster, id).await?;

        let banned = self.transition(id, CallTransition::Ban).await?;

        let (report, warning) = match self.reports.create(&Report::for_ban(&banned)).await {
            Ok(report) => {
                info!("Report {} filed against {}", report.id, report.reported_user_id);
                (Some(report), None)
            }
            Err(e) => {
                warn!("Call request {} banned but report failed: {}", id, e);
                (
                    None,
                    Some("The caller was banned but the report could not be recorded".to_string()),
                )
            }
        };

        Ok(BanOutcome {
            call_request: banned,
            report,
            warning,
        })
    }

    // ==================== Caller transitions ====================

    /// Withdraw a ringing request
    #[instrument(skip(self), fields(caller_id = %caller.user_id))]
    pub async fn cancel(&self, caller: &Principal, id: Uuid) -> AppResult<CallRequest> {
        let call = self.load(id).await?;
        if call.caller_id != caller.user_id {
            return Err(AppError::Forbidden(
                "Only the caller can cancel a call request".to_string(),
            ));
        }

        let cancelled = self.transition(id, CallTransition::Cancel).await?;
        self.notifier.notify_resolution(&cancelled).await;
        Ok(cancelled)
    }

    // ==================== Background work ====================

    /// Run the stale policy's sweep once. Returns how many requests were
    /// auto-resolved.
    #[instrument(skip(self))]
    pub async fn sweep_stale(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let Some(cutoff) = self.policy.sweep_cutoff(now) else {
            return Ok(0);
        };

        let filter = CallRequestFilter::default()
            .with_status(CallRequestStatus::Ringing)
            .created_before(cutoff)
            .limit(SWEEP_BATCH);
        let candidates = self.calls.list(&filter).await?;

        let picks = self.policy.sweep(&candidates, now);
        Ok(self.apply_auto_resolutions(picks).await)
    }

    /// Open sessions for accepted requests that are missing one. Returns how
    /// many were repaired.
    #[instrument(skip(self))]
    pub async fn reconcile_sessions(&self) -> AppResult<usize> {
        let orphans = self.calls.find_accepted_without_session(RECONCILE_BATCH).await?;
        let mut repaired = 0;

        for call in &orphans {
            match self.resolution.ensure_session(call).await {
                Ok(session) => {
                    info!("Reconciled session {} for call request {}", session.id, call.id);
                    repaired += 1;
                }
                Err(e) => warn!("Reconcile of {} failed: {}", call.id, e),
            }
        }

        Ok(repaired)
    }

    // ==================== Helpers ====================

    async fn load(&self, id: Uuid) -> AppResult<CallRequest> {
        self.calls
            .find_by_id(id)
            .await?
            .ok_or(AppError::CallRequestNotFound(id))
    }

    async fn load_as_broadcaster(&self, broadcaster: &Principal, id: Uuid) -> AppResult<CallRequest> {
        let call = self.load(id).await?;
        if call.broadcaster_id != broadcaster.user_id {
            return Err(AppError::Forbidden(format!(
                "Call request {} is not addressed to you",
                id
            )));
        }
        if !broadcaster.can_receive_calls() {
            return Err(AppError::NotCallEligible(broadcaster.user_id));
        }
        Ok(call)
    }

    async fn transition(&self, id: Uuid, transition: CallTransition) -> AppResult<CallRequest> {
        let updated = self
            .calls
            .transition_if_ringing(id, transition, Utc::now())
            .await?;

        info!("Call request {} -> {} ({})", id, updated.status, transition);
        Ok(updated)
    }

    async fn apply_auto_resolutions(&self, picks: Vec<AutoResolution>) -> usize {
        let mut applied = 0;

        for pick in picks {
            match self.transition(pick.id, pick.transition).await {
                Ok(resolved) => {
                    self.notifier.notify_resolution(&resolved).await;
                    applied += 1;
                }
                Err(e) if e.is_stale() => {
                    debug!("Auto {} on {} lost to a person", pick.transition, pick.id);
                }
                Err(e) => warn!("Auto {} on {} failed: {}", pick.transition, pick.id, e),
            }
        }

        applied
    }
}
