//! State change detection
//!
//! The watcher and the wait view only consume these traits, so a polling
//! source can be swapped for a push subscription without touching either.
//! `None` from a detector means its source is gone for good.

use async_trait::async_trait;
use ringline_core::{models::CallRequest, AppResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, Interval, MissedTickBehavior};
use uuid::Uuid;

use crate::backend::SignalingBackend;

/// Source of "what is ringing for me right now" snapshots
#[async_trait]
pub trait IncomingCallDetector: Send {
    async fn next_snapshot(&mut self) -> Option<AppResult<Vec<CallRequest>>>;
}

/// Source of updates for one outbound call request
#[async_trait]
pub trait CallStatusDetector: Send {
    async fn next_status(&mut self) -> Option<AppResult<CallRequest>>;
}

fn ticker(every: Duration) -> Interval {
    let mut ticker = interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Queries the backend on a fixed interval. The first query is immediate.
pub struct PollingIncomingDetector {
    backend: Arc<dyn SignalingBackend>,
    ticker: Interval,
}

impl PollingIncomingDetector {
    pub fn new(backend: Arc<dyn SignalingBackend>, every: Duration) -> Self {
        Self {
            backend,
            ticker: ticker(every),
        }
    }
}

#[async_trait]
impl IncomingCallDetector for PollingIncomingDetector {
    async fn next_snapshot(&mut self) -> Option<AppResult<Vec<CallRequest>>> {
        self.ticker.tick().await;
        Some(self.backend.incoming().await)
    }
}

/// Re-reads one call request on a fixed interval
pub struct PollingStatusDetector {
    backend: Arc<dyn SignalingBackend>,
    id: Uuid,
    ticker: Interval,
}

impl PollingStatusDetector {
    pub fn new(backend: Arc<dyn SignalingBackend>, id: Uuid, every: Duration) -> Self {
        Self {
            backend,
            id,
            ticker: ticker(every),
        }
    }
}

#[async_trait]
impl CallStatusDetector for PollingStatusDetector {
    async fn next_status(&mut self) -> Option<AppResult<CallRequest>> {
        self.ticker.tick().await;
        Some(self.backend.fetch(self.id).await)
    }
}

/// Fed by an external push channel; yields each published snapshot
pub struct PushIncomingDetector {
    updates: watch::Receiver<Vec<CallRequest>>,
    seen_initial: bool,
}

impl PushIncomingDetector {
    pub fn new(updates: watch::Receiver<Vec<CallRequest>>) -> Self {
        Self {
            updates,
            seen_initial: false,
        }
    }

    /// A sender for the push source plus a detector reading from it
    pub fn channel() -> (watch::Sender<Vec<CallRequest>>, Self) {
        let (tx, rx) = watch::channel(Vec::new());
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl IncomingCallDetector for PushIncomingDetector {
    async fn next_snapshot(&mut self) -> Option<AppResult<Vec<CallRequest>>> {
        if self.seen_initial {
            self.updates.changed().await.ok()?;
        }
        self.seen_initial = true;
        Some(Ok(self.updates.borrow_and_update().clone()))
    }
}

/// Fed by an external push channel carrying the latest copy of one request
pub struct PushStatusDetector {
    updates: watch::Receiver<CallRequest>,
    seen_initial: bool,
}

impl PushStatusDetector {
    pub fn new(updates: watch::Receiver<CallRequest>) -> Self {
        Self {
            updates,
            seen_initial: false,
        }
    }
}

#[async_trait]
impl CallStatusDetector for PushStatusDetector {
    async fn next_status(&mut self) -> Option<AppResult<CallRequest>> {
        if self.seen_initial {
            self.updates.changed().await.ok()?;
        }
        self.seen_initial = true;
        Some(Ok(self.updates.borrow_and_update().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_detector_yields_latest_then_ends() {
        let (tx, mut detector) = PushIncomingDetector::channel();

        assert!(detector.next_snapshot().await.unwrap().unwrap().is_empty());

        let call = CallRequest::default();
        tx.send(vec![call.clone()]).unwrap();
        let snapshot = detector.next_snapshot().await.unwrap().unwrap();
        assert_eq!(snapshot, vec![call]);

        drop(tx);
        assert!(detector.next_snapshot().await.is_none());
    }
}
