//! Session model
//!
//! The billable unit of time between a broadcaster and a customer. A session
//! exists only as the result of an accepted call request and is keyed by
//! that request's id, which doubles as the idempotency key for creation.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::call_request::{CallRequest, CallType};

/// Session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Completed,
    Cancelled,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl SessionStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }
}

/// Session entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,

    /// Originating call request; unique across sessions
    pub call_request_id: Uuid,

    pub broadcaster_id: Uuid,

    pub customer_id: Uuid,

    pub session_type: CallType,

    pub duration_minutes: i32,

    pub total_price: Decimal,

    /// Broadcaster's share as computed by the billing collaborator
    pub broadcaster_earnings: Decimal,

    pub status: SessionStatus,

    pub started_at: DateTime<Utc>,

    pub ended_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Build the active session mirroring an accepted call request
    pub fn from_call_request(call: &CallRequest, broadcaster_earnings: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            call_request_id: call.id,
            broadcaster_id: call.broadcaster_id,
            customer_id: call.caller_id,
            session_type: call.call_type,
            duration_minutes: call.duration_minutes,
            total_price: call.total_price,
            broadcaster_earnings,
            status: SessionStatus::Active,
            started_at: call.answered_at.unwrap_or(now),
            ended_at: None,
            created_at: now,
        }
    }

    /// When the booked time runs out
    pub fn scheduled_end(&self) -> DateTime<Utc> {
        self.started_at + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Platform share of the price
    pub fn platform_fee(&self) -> Decimal {
        self.total_price - self.broadcaster_earnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CallTransition;
    use rust_decimal_macros::dec;

    #[test]
    fn test_session_mirrors_call_request() {
        let mut call = CallRequest {
            caller_id: Uuid::new_v4(),
            broadcaster_id: Uuid::new_v4(),
            call_type: CallType::Audio,
            duration_minutes: 30,
            total_price: dec!(21.00),
            ..Default::default()
        };
        call.apply(CallTransition::Accept, Utc::now()).unwrap();

        let session = Session::from_call_request(&call, dec!(14.70));

        assert_eq!(session.call_request_id, call.id);
        assert_eq!(session.customer_id, call.caller_id);
        assert_eq!(session.session_type, CallType::Audio);
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.started_at, call.answered_at.unwrap());
        assert_eq!(session.platform_fee(), dec!(6.30));
        assert_eq!(
            session.scheduled_end() - session.started_at,
            Duration::minutes(30)
        );
    }
}
