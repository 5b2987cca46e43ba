//! Caller Wait View
//!
//! Rings from the moment the view is entered, runs a local elapsed-time
//! pulse for display, and closes as soon as the request leaves `ringing`
//! for any reason. Closing always stops the ringtone.

use parking_lot::Mutex;
use ringline_core::{
    models::{CallRequest, CallRequestStatus},
    AppResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::SignalingBackend;
use crate::detector::CallStatusDetector;
use crate::ringtone::RingtoneTask;

/// How the wait ended
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    Accepted(CallRequest),
    /// Rejected, banned or auto-rejected by the platform
    Declined(CallRequest),
    /// Withdrawn by this caller
    Cancelled(CallRequest),
    /// The request could not be followed any more; shown as a generic state
    Unavailable,
}

impl WaitOutcome {
    fn for_resolved(call: CallRequest) -> Self {
        match call.status {
            CallRequestStatus::Accepted => WaitOutcome::Accepted(call),
            CallRequestStatus::Cancelled => WaitOutcome::Cancelled(call),
            CallRequestStatus::Rejected | CallRequestStatus::Banned => WaitOutcome::Declined(call),
            CallRequestStatus::Ringing => WaitOutcome::Unavailable,
        }
    }
}

pub struct CallerWaitView {
    backend: Arc<dyn SignalingBackend>,
    ringtone: RingtoneTask,
    call: CallRequest,
    entered_at: Instant,
    pulse: watch::Sender<Duration>,
    outcome: Mutex<Option<WaitOutcome>>,
    closed: CancellationToken,
}

impl CallerWaitView {
    /// Enter the view for a freshly booked request and start ringing
    pub fn enter(
        backend: Arc<dyn SignalingBackend>,
        ringtone: RingtoneTask,
        call: CallRequest,
    ) -> Arc<Self> {
        if let Err(e) = ringtone.start() {
            warn!("Ringtone unavailable: {}", e);
        }
        info!("Waiting on call request {}", call.id);

        Arc::new(Self {
            backend,
            ringtone,
            call,
            entered_at: Instant::now(),
            pulse: watch::channel(Duration::ZERO).0,
            outcome: Mutex::new(None),
            closed: CancellationToken::new(),
        })
    }

    pub fn call(&self) -> &CallRequest {
        &self.call
    }

    pub fn elapsed(&self) -> Duration {
        self.entered_at.elapsed()
    }

    /// Elapsed time, updated on every pulse tick
    pub fn pulse(&self) -> watch::Receiver<Duration> {
        self.pulse.subscribe()
    }

    pub fn outcome(&self) -> Option<WaitOutcome> {
        self.outcome.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn is_ringing(&self) -> bool {
        self.ringtone.is_ringing()
    }

    /// Withdraw the request.
    ///
    /// If the broadcaster got there first this fails with `StaleTransition`
    /// and the view closes with whatever outcome won.
    pub async fn cancel(&self) -> AppResult<CallRequest> {
        match self.backend.cancel(self.call.id).await {
            Ok(cancelled) => {
                self.close(WaitOutcome::Cancelled(cancelled.clone()));
                Ok(cancelled)
            }
            Err(e) if e.is_stale() => {
                match self.backend.fetch(self.call.id).await {
                    Ok(current) if !current.is_ringing() => {
                        self.close(WaitOutcome::for_resolved(current))
                    }
                    _ => debug!("Could not read the winning status of {}", self.call.id),
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Follow the request until it resolves or the view is closed
    pub async fn run(&self, mut detector: Box<dyn CallStatusDetector>, pulse_every: Duration) -> WaitOutcome {
        let mut pulse = interval(pulse_every.max(Duration::from_millis(1)));
        pulse.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !self.closed.is_cancelled() {
            // The pulse must not cancel a status read that is in flight
            let next = detector.next_status();
            tokio::pin!(next);
            let update = loop {
                tokio::select! {
                    _ = self.closed.cancelled() => return self.outcome().unwrap_or(WaitOutcome::Unavailable),
                    _ = pulse.tick() => {
                        self.pulse.send_replace(self.elapsed());
                    }
                    update = &mut next => break update,
                }
            };

            match update {
                Some(Ok(call)) if call.is_ringing() => {}
                Some(Ok(call)) => self.close(WaitOutcome::for_resolved(call)),
                Some(Err(e)) if e.is_transient() => {
                    warn!("Status poll failed, retrying next tick: {}", e);
                }
                Some(Err(e)) => {
                    warn!("Lost track of call request {}: {}", self.call.id, e);
                    self.close(WaitOutcome::Unavailable);
                }
                None => self.close(WaitOutcome::Unavailable),
            }
        }

        self.outcome().unwrap_or(WaitOutcome::Unavailable)
    }

    /// Tear the view down without an outcome from the server
    pub fn leave(&self) {
        self.close(WaitOutcome::Unavailable);
    }

    fn close(&self, outcome: WaitOutcome) {
        {
            let mut slot = self.outcome.lock();
            if slot.is_some() {
                return;
            }
            info!("Call request {} wait ended: {}", self.call.id, outcome_label(&outcome));
            *slot = Some(outcome);
        }

        self.ringtone.stop();
        self.closed.cancel();
    }
}

fn outcome_label(outcome: &WaitOutcome) -> &'static str {
    match outcome {
        WaitOutcome::Accepted(_) => "accepted",
        WaitOutcome::Declined(_) => "declined",
        WaitOutcome::Cancelled(_) => "cancelled",
        WaitOutcome::Unavailable => "unavailable",
    }
}
