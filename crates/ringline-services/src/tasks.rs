//! Background tasks
//!
//! Both loops tick on a fixed interval until their token is cancelled. A
//! failed tick is logged and the next one retries.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::call_request_service::CallRequestService;

/// Applies the stale policy's sweep to long-ringing requests
pub struct StaleRequestSweeper {
    service: Arc<CallRequestService>,
    every: Duration,
}

impl StaleRequestSweeper {
    pub fn new(service: Arc<CallRequestService>, every: Duration) -> Self {
        Self { service, every }
    }

    pub async fn sweep_once(&self) -> usize {
        match self.service.sweep_stale(Utc::now()).await {
            Ok(0) => 0,
            Ok(n) => {
                info!("Sweeper auto-resolved {} ringing requests", n);
                n
            }
            Err(e) => {
                warn!("Stale sweep failed: {}", e);
                0
            }
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Stale request sweeper started ({} policy, every {:?})",
                self.service.policy_name(),
                self.every
            );
            run_every(self.every, shutdown, || self.sweep_once()).await;
            info!("Stale request sweeper stopped");
        })
    }
}

/// Opens missing sessions for accepted requests
pub struct SessionReconciler {
    service: Arc<CallRequestService>,
    every: Duration,
}

impl SessionReconciler {
    pub fn new(service: Arc<CallRequestService>, every: Duration) -> Self {
        Self { service, every }
    }

    pub async fn reconcile_once(&self) -> usize {
        match self.service.reconcile_sessions().await {
            Ok(n) => {
                if n > 0 {
                    info!("Reconciler opened {} missing sessions", n);
                }
                n
            }
            Err(e) => {
                warn!("Session reconcile failed: {}", e);
                0
            }
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Session reconciler started (every {:?})", self.every);
            run_every(self.every, shutdown, || self.reconcile_once()).await;
            info!("Session reconciler stopped");
        })
    }
}

async fn run_every<F, Fut>(every: Duration, shutdown: CancellationToken, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = usize>,
{
    let mut ticker = interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let n = tick().await;
                debug!("Background tick handled {}", n);
            }
        }
    }
}
