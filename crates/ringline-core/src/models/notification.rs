//! Notification model
//!
//! Call-specific notification records. Delivery and fan-out are handled
//! outside this system; only the records are written here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::call_request::CallRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// To the caller: the broadcaster picked up
    CallAccepted,
    /// To the caller: the broadcaster declined
    CallDeclined,
    /// To the caller: the request was auto-rejected (expired or superseded)
    CallMissed,
    /// To the broadcaster: the caller hung up before an answer
    CallCancelled,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::CallAccepted => write!(f, "call_accepted"),
            NotificationKind::CallDeclined => write!(f, "call_declined"),
            NotificationKind::CallMissed => write!(f, "call_missed"),
            NotificationKind::CallCancelled => write!(f, "call_cancelled"),
        }
    }
}

impl NotificationKind {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "call_accepted" => Some(NotificationKind::CallAccepted),
            "call_declined" => Some(NotificationKind::CallDeclined),
            "call_missed" => Some(NotificationKind::CallMissed),
            "call_cancelled" => Some(NotificationKind::CallCancelled),
            _ => None,
        }
    }
}

/// Notification entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,

    /// Recipient
    pub user_id: Uuid,

    pub kind: NotificationKind,

    pub title: String,

    pub message: String,

    pub call_request_id: Option<Uuid>,

    pub is_read: bool,

    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Build the notification of `kind` about `call` for its natural recipient
    pub fn about(call: &CallRequest, kind: NotificationKind) -> Self {
        let (user_id, title, message) = match kind {
            NotificationKind::CallAccepted => (
                call.caller_id,
                "Call accepted",
                format!("Your {} call is starting now", call.call_type),
            ),
            NotificationKind::CallDeclined => (
                call.caller_id,
                "Call declined",
                "The broadcaster is not available right now".to_string(),
            ),
            NotificationKind::CallMissed => (
                call.caller_id,
                "Call missed",
                "Your call request was not answered".to_string(),
            ),
            NotificationKind::CallCancelled => (
                call.broadcaster_id,
                "Call cancelled",
                format!("{} cancelled their call request", call.caller_name),
            ),
        };

        Self {
            id: Uuid::now_v7(),
            user_id,
            kind,
            title: title.to_string(),
            message,
            call_request_id: Some(call.id),
            is_read: false,
            created_at: Utc::now(),
        }
    }
}
