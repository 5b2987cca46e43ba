//! Call signaling services for Ringline
//!
//! This crate holds the server side of the call request lifecycle: booking,
//! the broadcaster and caller transitions, the handoff into a billable
//! session, and the background work that keeps stale or half-finished
//! requests from lingering.
//!
//! # Services
//!
//! - `CallRequestService` - booking, accept/reject/ban/cancel and queries
//! - `CallResolutionHandler` - accept plus idempotent session creation
//! - `CommissionEarningsCalculator` - broadcaster earnings from commission rates
//! - `CallNotifier` - call notification records
//! - `StaleRequestPolicy` - legacy, TTL and supersede handling of old ringing requests
//! - `StaleRequestSweeper` / `SessionReconciler` - interval-driven background tasks

pub mod billing;
pub mod call_request_service;
pub mod notifier;
pub mod resolution;
pub mod stale_policy;
pub mod stores;
pub mod tasks;

pub use billing::CommissionEarningsCalculator;
pub use call_request_service::{AcceptOutcome, BanOutcome, CallRequestService};
pub use notifier::CallNotifier;
pub use resolution::{CallResolutionHandler, RetryPolicy};
pub use stale_policy::{
    policy_from_config, AutoResolution, LegacyPolicy, StaleRequestPolicy, SupersedePolicy,
    TtlPolicy,
};
pub use stores::EntityStores;
pub use tasks::{SessionReconciler, StaleRequestSweeper};

/// Business logic constants
pub mod constants {
    /// Ringing requests examined per sweep tick
    pub const SWEEP_BATCH: i64 = 200;

    /// Accepted requests without a session repaired per reconcile tick
    pub const RECONCILE_BATCH: i64 = 100;
}
