//! Call Resolution Handler
//!
//! The one place where accepting a call also opens a session. The status
//! transition is written first and gates everything else; the session write
//! is keyed by the call request id, so retrying it (here, or later from the
//! reconciler) can never produce a second session.

use chrono::Utc;
use ringline_core::{
    models::{CallRequest, CallRequestStatus, CallTransition, Session},
    traits::{CallRequestRepository, EarningsCalculator, SessionRepository},
    AppError, AppResult,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Retry schedule for session creation
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Delay before the second attempt; doubles after each failure
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

pub struct CallResolutionHandler {
    calls: Arc<dyn CallRequestRepository>,
    sessions: Arc<dyn SessionRepository>,
    earnings: Arc<dyn EarningsCalculator>,
    retry: RetryPolicy,
}

impl CallResolutionHandler {
    pub fn new(
        calls: Arc<dyn CallRequestRepository>,
        sessions: Arc<dyn SessionRepository>,
        earnings: Arc<dyn EarningsCalculator>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            calls,
            sessions,
            earnings,
            retry,
        }
    }

    /// Accept a ringing call request and open its session.
    ///
    /// Fails without side effects if the request is unknown or no longer
    /// ringing. If the session cannot be written after the transition
    /// committed, fails with `SessionCreationFailed`; the request stays
    /// accepted and the reconciler finishes the job.
    #[instrument(skip(self))]
    pub async fn accept(&self, id: Uuid) -> AppResult<(CallRequest, Session)> {
        let call = self
            .calls
            .find_by_id(id)
            .await?
            .ok_or(AppError::CallRequestNotFound(id))?;

        if !call.is_ringing() {
            debug!("Accept on resolved call request {} ({})", id, call.status);
            return Err(AppError::stale(id, call.status));
        }

        // Billing failures here leave the request ringing
        let earnings = self
            .earnings
            .compute_earnings(call.broadcaster_id, call.total_price)
            .await?;

        let accepted = self
            .calls
            .transition_if_ringing(id, CallTransition::Accept, Utc::now())
            .await?;

        let session = self
            .open_session_with_retry(&accepted, Some(earnings))
            .await?;

        info!(
            "Call request {} accepted, session {} ({} min, earnings {})",
            id, session.id, session.duration_minutes, session.broadcaster_earnings
        );
        Ok((accepted, session))
    }

    /// Make sure an accepted call request has its session.
    ///
    /// Returns the existing session when there is one.
    #[instrument(skip(self, call), fields(call_request_id = %call.id))]
    pub async fn ensure_session(&self, call: &CallRequest) -> AppResult<Session> {
        if call.status != CallRequestStatus::Accepted {
            return Err(AppError::InvalidInput(format!(
                "Call request {} is {}, not accepted",
                call.id, call.status
            )));
        }

        if let Some(existing) = self.sessions.find_by_call_request(call.id).await? {
            return Ok(existing);
        }

        self.open_session_with_retry(call, None).await
    }

    async fn open_session_with_retry(
        &self,
        call: &CallRequest,
        earnings: Option<rust_decimal::Decimal>,
    ) -> AppResult<Session> {
        let attempts = self.retry.attempts.max(1);
        let mut delay = self.retry.backoff;
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.open_session(call, earnings).await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    warn!(
                        "Session creation attempt {}/{} for {} failed: {}",
                        attempt, attempts, call.id, e
                    );
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());

        error!(
            target: "billing_integrity",
            call_request_id = %call.id,
            broadcaster_id = %call.broadcaster_id,
            customer_id = %call.caller_id,
            total_price = %call.total_price,
            "Accepted call has no session: {}",
            reason
        );

        Err(AppError::SessionCreationFailed {
            call_request_id: call.id,
            reason,
        })
    }

    async fn open_session(
        &self,
        call: &CallRequest,
        earnings: Option<rust_decimal::Decimal>,
    ) -> AppResult<Session> {
        let earnings = match earnings {
            Some(amount) => amount,
            None => {
                self.earnings
                    .compute_earnings(call.broadcaster_id, call.total_price)
                    .await?
            }
        };

        self.sessions
            .create_for_call_request(&Session::from_call_request(call, earnings))
            .await
    }
}
