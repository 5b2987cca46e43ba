//! Call request model
//!
//! A call request is one attempt by a caller to open a private session with a
//! broadcaster. It starts `ringing` and is resolved exactly once; the record
//! is never deleted and serves as the audit trail of the attempt.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::AppResult;

/// Kind of private session being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    #[default]
    Video,
    Audio,
    Text,
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallType::Video => write!(f, "video"),
            CallType::Audio => write!(f, "audio"),
            CallType::Text => write!(f, "text"),
        }
    }
}

impl CallType {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "video" => Some(CallType::Video),
            "audio" => Some(CallType::Audio),
            "text" => Some(CallType::Text),
            _ => None,
        }
    }
}

/// Call request status
///
/// Everything except `Ringing` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallRequestStatus {
    #[default]
    Ringing,
    Accepted,
    Rejected,
    Banned,
    Cancelled,
}

impl fmt::Display for CallRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallRequestStatus::Ringing => write!(f, "ringing"),
            CallRequestStatus::Accepted => write!(f, "accepted"),
            CallRequestStatus::Rejected => write!(f, "rejected"),
            CallRequestStatus::Banned => write!(f, "banned"),
            CallRequestStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl CallRequestStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ringing" => Some(CallRequestStatus::Ringing),
            "accepted" => Some(CallRequestStatus::Accepted),
            "rejected" => Some(CallRequestStatus::Rejected),
            "banned" => Some(CallRequestStatus::Banned),
            "cancelled" => Some(CallRequestStatus::Cancelled),
            _ => None,
        }
    }

    #[inline]
    pub fn is_ringing(&self) -> bool {
        matches!(self, CallRequestStatus::Ringing)
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        !self.is_ringing()
    }
}

/// Why a call request left the ringing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Accepted,
    RejectedByBroadcaster,
    Banned,
    CancelledByCaller,
    /// Auto-rejected after ringing longer than the configured TTL
    Expired,
    /// Auto-rejected because a newer request for the same broadcaster arrived
    Superseded,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Accepted => write!(f, "accepted"),
            EndReason::RejectedByBroadcaster => write!(f, "rejected_by_broadcaster"),
            EndReason::Banned => write!(f, "banned"),
            EndReason::CancelledByCaller => write!(f, "cancelled_by_caller"),
            EndReason::Expired => write!(f, "expired"),
            EndReason::Superseded => write!(f, "superseded"),
        }
    }
}

impl EndReason {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "accepted" => Some(EndReason::Accepted),
            "rejected_by_broadcaster" => Some(EndReason::RejectedByBroadcaster),
            "banned" => Some(EndReason::Banned),
            "cancelled_by_caller" => Some(EndReason::CancelledByCaller),
            "expired" => Some(EndReason::Expired),
            "superseded" => Some(EndReason::Superseded),
            _ => None,
        }
    }
}

/// A single ringing -> terminal transition
///
/// Every mutation of a call request goes through one of these so that the
/// store can apply it as a conditional update on `status = 'ringing'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallTransition {
    Accept,
    Reject,
    Ban,
    Cancel,
    Expire,
    Supersede,
}

impl CallTransition {
    /// Status persisted by this transition
    pub fn target_status(&self) -> CallRequestStatus {
        match self {
            CallTransition::Accept => CallRequestStatus::Accepted,
            CallTransition::Reject | CallTransition::Expire | CallTransition::Supersede => {
                CallRequestStatus::Rejected
            }
            CallTransition::Ban => CallRequestStatus::Banned,
            CallTransition::Cancel => CallRequestStatus::Cancelled,
        }
    }

    pub fn end_reason(&self) -> EndReason {
        match self {
            CallTransition::Accept => EndReason::Accepted,
            CallTransition::Reject => EndReason::RejectedByBroadcaster,
            CallTransition::Ban => EndReason::Banned,
            CallTransition::Cancel => EndReason::CancelledByCaller,
            CallTransition::Expire => EndReason::Expired,
            CallTransition::Supersede => EndReason::Superseded,
        }
    }

    /// `answered_at` is stamped when the broadcaster answers (accept or reject)
    pub fn stamps_answered_at(&self) -> bool {
        matches!(self, CallTransition::Accept | CallTransition::Reject)
    }

    /// `ended_at` is stamped on every transition that does not open a session
    pub fn stamps_ended_at(&self) -> bool {
        !matches!(self, CallTransition::Accept)
    }

    /// Whether the system, not a person, initiated the transition
    pub fn is_automatic(&self) -> bool {
        matches!(self, CallTransition::Expire | CallTransition::Supersede)
    }
}

impl fmt::Display for CallTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallTransition::Accept => write!(f, "accept"),
            CallTransition::Reject => write!(f, "reject"),
            CallTransition::Ban => write!(f, "ban"),
            CallTransition::Cancel => write!(f, "cancel"),
            CallTransition::Expire => write!(f, "expire"),
            CallTransition::Supersede => write!(f, "supersede"),
        }
    }
}

/// Booking input submitted by a caller
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewCallRequest {
    pub broadcaster_id: Uuid,

    pub call_type: CallType,

    #[validate(range(min = 1, max = 480, message = "Duration must be between 1 and 480 minutes"))]
    pub duration_minutes: i32,

    pub total_price: Decimal,

    #[validate(length(min = 1, max = 120, message = "Caller name is required"))]
    pub caller_name: String,

    #[validate(length(max = 2048))]
    pub caller_photo: Option<String>,
}

impl NewCallRequest {
    /// Validate field constraints plus the money and party rules
    pub fn validate_for(&self, caller_id: Uuid) -> AppResult<()> {
        self.validate()?;

        if self.total_price < Decimal::ZERO {
            return Err(AppError::Validation(
                "total_price must not be negative".to_string(),
            ));
        }

        if self.broadcaster_id == caller_id {
            return Err(AppError::InvalidInput(
                "A caller cannot ring themselves".to_string(),
            ));
        }

        Ok(())
    }
}

/// Call request entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub id: Uuid,

    pub caller_id: Uuid,

    pub broadcaster_id: Uuid,

    pub call_type: CallType,

    pub duration_minutes: i32,

    pub total_price: Decimal,

    /// Denormalized so the broadcaster can render the call without a lookup
    pub caller_name: String,

    pub caller_photo: Option<String>,

    pub status: CallRequestStatus,

    pub end_reason: Option<EndReason>,

    pub created_at: DateTime<Utc>,

    /// Set on accept or reject
    pub answered_at: Option<DateTime<Utc>>,

    /// Set on reject, ban, cancel and automatic rejection
    pub ended_at: Option<DateTime<Utc>>,
}

impl CallRequest {
    /// Create a ringing call request from a booking
    pub fn new(caller_id: Uuid, booking: NewCallRequest) -> Self {
        Self {
            id: Uuid::now_v7(),
            caller_id,
            broadcaster_id: booking.broadcaster_id,
            call_type: booking.call_type,
            duration_minutes: booking.duration_minutes,
            total_price: booking.total_price,
            caller_name: booking.caller_name,
            caller_photo: booking.caller_photo,
            status: CallRequestStatus::Ringing,
            end_reason: None,
            created_at: Utc::now(),
            answered_at: None,
            ended_at: None,
        }
    }

    #[inline]
    pub fn is_ringing(&self) -> bool {
        self.status.is_ringing()
    }

    /// Whether `user_id` is the caller or the broadcaster of this request
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.caller_id == user_id || self.broadcaster_id == user_id
    }

    /// How long the request has been (or was) ringing
    pub fn ringing_for(&self, now: DateTime<Utc>) -> Duration {
        let until = self.answered_at.or(self.ended_at).unwrap_or(now);
        until - self.created_at
    }

    /// Apply a transition in memory.
    ///
    /// Fails with `StaleTransition` unless the request is still ringing; the
    /// record is left untouched in that case.
    pub fn apply(&mut self, transition: CallTransition, at: DateTime<Utc>) -> AppResult<()> {
        if !self.is_ringing() {
            return Err(AppError::stale(self.id, self.status));
        }

        self.status = transition.target_status();
        self.end_reason = Some(transition.end_reason());
        if transition.stamps_answered_at() {
            self.answered_at = Some(at);
        }
        if transition.stamps_ended_at() {
            self.ended_at = Some(at);
        }

        Ok(())
    }
}

impl Default for CallRequest {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7(),
            caller_id: Uuid::nil(),
            broadcaster_id: Uuid::nil(),
            call_type: CallType::Video,
            duration_minutes: 1,
            total_price: Decimal::ZERO,
            caller_name: String::new(),
            caller_photo: None,
            status: CallRequestStatus::Ringing,
            end_reason: None,
            created_at: Utc::now(),
            answered_at: None,
            ended_at: None,
        }
    }
}
