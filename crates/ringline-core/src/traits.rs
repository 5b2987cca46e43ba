//! Common traits for repositories and collaborators
//!
//! The entity store is reached only through these traits. Implementations
//! must not assume cross-record transactions: every mutation of a call
//! request is a single-record conditional update.

use crate::error::AppError;
use crate::models::{
    CallRequest, CallRequestStatus, CallTransition, Notification, Report, Session,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Generic repository trait for single-record access
#[async_trait]
pub trait Repository<T, ID>: Send + Sync {
    /// Find entity by ID
    async fn find_by_id(&self, id: ID) -> Result<Option<T>, AppError>;

    /// Create a new entity
    async fn create(&self, entity: &T) -> Result<T, AppError>;

    /// Overwrite an existing entity; fails with `NotFound` if it is missing
    async fn update(&self, entity: &T) -> Result<T, AppError>;

    /// Delete entity by ID; fails with `NotFound` if it is missing
    async fn delete(&self, id: ID) -> Result<(), AppError>;
}

/// Filter for listing call requests. Results are always newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallRequestFilter {
    pub broadcaster_id: Option<Uuid>,
    pub caller_id: Option<Uuid>,
    pub status: Option<CallRequestStatus>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl CallRequestFilter {
    /// Ringing requests targeted at a broadcaster
    pub fn ringing_for(broadcaster_id: Uuid) -> Self {
        Self {
            broadcaster_id: Some(broadcaster_id),
            status: Some(CallRequestStatus::Ringing),
            ..Default::default()
        }
    }

    /// Requests placed by a caller, any status
    pub fn placed_by(caller_id: Uuid) -> Self {
        Self {
            caller_id: Some(caller_id),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: CallRequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn created_before(mut self, at: DateTime<Utc>) -> Self {
        self.created_before = Some(at);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// In-process evaluation of the filter's predicates (limit excluded)
    pub fn matches(&self, call: &CallRequest) -> bool {
        self.broadcaster_id.map_or(true, |id| call.broadcaster_id == id)
            && self.caller_id.map_or(true, |id| call.caller_id == id)
            && self.status.map_or(true, |s| call.status == s)
            && self.created_before.map_or(true, |at| call.created_at < at)
    }
}

/// Call request repository trait with specialized methods
#[async_trait]
pub trait CallRequestRepository: Repository<CallRequest, Uuid> {
    /// List call requests matching `filter`, newest first
    async fn list(&self, filter: &CallRequestFilter) -> Result<Vec<CallRequest>, AppError>;

    /// Apply `transition` only if the request is still ringing.
    ///
    /// Returns the updated record. Fails with `CallRequestNotFound` if the id
    /// is unknown and with `StaleTransition` if another transition won.
    async fn transition_if_ringing(
        &self,
        id: Uuid,
        transition: CallTransition,
        at: DateTime<Utc>,
    ) -> Result<CallRequest, AppError>;

    /// Accepted call requests that have no session yet, oldest first
    async fn find_accepted_without_session(&self, limit: i64)
        -> Result<Vec<CallRequest>, AppError>;
}

/// Session repository trait with specialized methods
#[async_trait]
pub trait SessionRepository: Repository<Session, Uuid> {
    /// Find the session opened for a call request
    async fn find_by_call_request(&self, call_request_id: Uuid)
        -> Result<Option<Session>, AppError>;

    /// Insert keyed by `call_request_id`.
    ///
    /// If a session already exists for the same call request the stored one
    /// is returned untouched and `session` is discarded.
    async fn create_for_call_request(&self, session: &Session) -> Result<Session, AppError>;
}

/// Report repository trait with specialized methods
#[async_trait]
pub trait ReportRepository: Repository<Report, Uuid> {
    async fn list_by_call_request(&self, call_request_id: Uuid) -> Result<Vec<Report>, AppError>;
}

/// Notification repository trait with specialized methods
#[async_trait]
pub trait NotificationRepository: Repository<Notification, Uuid> {
    /// Newest notifications for a recipient
    async fn list_for_user(&self, user_id: Uuid, limit: i64)
        -> Result<Vec<Notification>, AppError>;
}

/// Per-broadcaster commission overrides
#[async_trait]
pub trait CommissionRepository: Send + Sync {
    /// Platform commission rate for a broadcaster, if one is configured
    async fn commission_rate(&self, broadcaster_id: Uuid) -> Result<Option<Decimal>, AppError>;
}

/// Billing collaborator used when a session is opened
#[async_trait]
pub trait EarningsCalculator: Send + Sync {
    /// Broadcaster's share of `total_price`
    async fn compute_earnings(
        &self,
        broadcaster_id: Uuid,
        total_price: Decimal,
    ) -> Result<Decimal, AppError>;
}
