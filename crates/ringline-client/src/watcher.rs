//! Incoming Call Watcher
//!
//! Shows a broadcaster the one ringing request that matters and rings while
//! it is shown. Selection rule: every snapshot replaces the display with the
//! newest ringing request, and an empty snapshot clears it. Older requests
//! are never shown while a newer one is ringing.
//!
//! After a local accept the watcher is engaged: it shows nothing and stops
//! polling until `release` is called, even if other requests are still
//! ringing in the store.
//!
//! Requests resolved through this watcher are never shown again, even when a
//! snapshot fetched before the resolution arrives after it.

use parking_lot::Mutex;
use ringline_core::{
    models::{CallRequest, Principal},
    AppError, AppResult,
};
use ringline_services::{AcceptOutcome, BanOutcome};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::SignalingBackend;
use crate::detector::IncomingCallDetector;
use crate::ringtone::RingtoneTask;

#[derive(Debug, Clone, PartialEq)]
pub enum WatcherState {
    /// Not a call-eligible broadcaster; nothing is polled
    Suspended,
    /// Nothing ringing
    Idle,
    /// The displayed request
    Ringing(CallRequest),
    /// In the session opened by a local accept
    Engaged { call_request_id: Uuid },
}

pub struct IncomingCallWatcher {
    backend: Arc<dyn SignalingBackend>,
    ringtone: RingtoneTask,
    eligible: bool,
    state: watch::Sender<WatcherState>,
    engaged: Mutex<Option<Uuid>>,
    /// Resolved locally; dropped once a snapshot no longer lists them
    resolved: Mutex<HashSet<Uuid>>,
    released: Notify,
}

impl IncomingCallWatcher {
    pub fn new(backend: Arc<dyn SignalingBackend>, ringtone: RingtoneTask, principal: &Principal) -> Self {
        let eligible = principal.can_receive_calls();
        let initial = if eligible {
            WatcherState::Idle
        } else {
            WatcherState::Suspended
        };

        Self {
            backend,
            ringtone,
            eligible,
            state: watch::channel(initial).0,
            engaged: Mutex::new(None),
            resolved: Mutex::new(HashSet::new()),
            released: Notify::new(),
        }
    }

    pub fn state(&self) -> WatcherState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WatcherState> {
        self.state.subscribe()
    }

    pub fn displayed(&self) -> Option<CallRequest> {
        match &*self.state.borrow() {
            WatcherState::Ringing(call) => Some(call.clone()),
            _ => None,
        }
    }

    pub fn is_ringing(&self) -> bool {
        self.ringtone.is_ringing()
    }

    /// Poll until `shutdown` fires or the detector ends.
    ///
    /// Returns immediately for users who cannot receive calls.
    pub async fn run(&self, mut detector: Box<dyn IncomingCallDetector>, shutdown: CancellationToken) {
        if !self.eligible {
            debug!("Incoming call watcher suspended: not call-eligible");
            return;
        }

        loop {
            if self.engaged.lock().is_some() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = self.released.notified() => continue,
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                snapshot = detector.next_snapshot() => match snapshot {
                    None => break,
                    Some(Ok(calls)) => self.apply_snapshot(calls),
                    Some(Err(e)) if e.is_transient() => {
                        warn!("Incoming poll failed, retrying next tick: {}", e);
                    }
                    Some(Err(e)) => warn!("Incoming poll failed: {}", e),
                },
            }
        }

        self.ringtone.stop();
        if self.engaged.lock().is_none() {
            self.show(WatcherState::Idle);
        }
        debug!("Incoming call watcher stopped");
    }

    /// Apply one snapshot of ringing requests
    pub fn apply_snapshot(&self, calls: Vec<CallRequest>) {
        if !self.eligible || self.engaged.lock().is_some() {
            return;
        }

        let newest = {
            let mut resolved = self.resolved.lock();
            resolved.retain(|id| calls.iter().any(|c| c.id == *id));

            calls
                .into_iter()
                .filter(|c| c.is_ringing() && !resolved.contains(&c.id))
                .max_by_key(|c| (c.created_at, c.id))
        };

        match newest {
            Some(call) => {
                if self.displayed().map(|shown| shown.id) != Some(call.id) {
                    info!("Showing incoming call {} from {}", call.id, call.caller_name);
                }
                self.show(WatcherState::Ringing(call));
            }
            None => self.show(WatcherState::Idle),
        }
    }

    /// Accept a request and open its session. The watcher stays engaged
    /// until `release`.
    pub async fn accept(&self, id: Uuid) -> AppResult<AcceptOutcome> {
        match self.backend.accept(id).await {
            Ok(outcome) => {
                self.resolved.lock().insert(id);
                *self.engaged.lock() = Some(id);
                self.show(WatcherState::Engaged { call_request_id: id });
                Ok(outcome)
            }
            Err(e @ AppError::SessionCreationFailed { .. }) => {
                // Accepted; the session will be repaired server side
                self.resolved.lock().insert(id);
                *self.engaged.lock() = Some(id);
                self.show(WatcherState::Engaged { call_request_id: id });
                Err(e)
            }
            Err(e) => Err(self.after_failure(id, e)),
        }
    }

    pub async fn reject(&self, id: Uuid) -> AppResult<CallRequest> {
        match self.backend.reject(id).await {
            Ok(call) => {
                self.forget(id);
                Ok(call)
            }
            Err(e) => Err(self.after_failure(id, e)),
        }
    }

    /// Ban the caller. A missing report comes back as `warning`.
    pub async fn ban(&self, id: Uuid) -> AppResult<BanOutcome> {
        match self.backend.ban(id).await {
            Ok(outcome) => {
                if let Some(warning) = &outcome.warning {
                    warn!("Ban of {} partially failed: {}", id, warning);
                }
                self.forget(id);
                Ok(outcome)
            }
            Err(e) => Err(self.after_failure(id, e)),
        }
    }

    /// Leave the engaged state and resume polling
    pub fn release(&self) {
        if self.engaged.lock().take().is_some() {
            self.show(WatcherState::Idle);
            self.released.notify_one();
        }
    }

    fn after_failure(&self, id: Uuid, e: AppError) -> AppError {
        if e.is_stale() || matches!(e, AppError::CallRequestNotFound(_)) {
            debug!("Call request {} already resolved elsewhere", id);
            self.forget(id);
        }
        e
    }

    /// Stop showing `id` now and in any late snapshot
    fn forget(&self, id: Uuid) {
        self.resolved.lock().insert(id);
        self.clear_if_shown(id);
    }

    fn clear_if_shown(&self, id: Uuid) {
        if self.displayed().map(|c| c.id) == Some(id) {
            self.show(WatcherState::Idle);
        }
    }

    fn show(&self, next: WatcherState) {
        let ringing = matches!(next, WatcherState::Ringing(_));
        self.state.send_replace(next);

        if let Err(e) = self.ringtone.set_ringing(ringing) {
            warn!("Ringtone unavailable: {}", e);
        }
    }
}
