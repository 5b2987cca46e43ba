//! Moderation report model
//!
//! Write-once audit record created when a broadcaster bans a caller from an
//! incoming call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::call_request::CallRequest;

/// Fixed reason recorded for reports filed through the ban action
pub const BAN_REPORT_REASON: &str = "banned_from_call";

/// Report review status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    Pending,
    Reviewed,
    Dismissed,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportStatus::Pending => write!(f, "pending"),
            ReportStatus::Reviewed => write!(f, "reviewed"),
            ReportStatus::Dismissed => write!(f, "dismissed"),
        }
    }
}

impl ReportStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(ReportStatus::Pending),
            "reviewed" => Some(ReportStatus::Reviewed),
            "dismissed" => Some(ReportStatus::Dismissed),
            _ => None,
        }
    }
}

/// Report entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,

    pub reporter_id: Uuid,

    pub reported_user_id: Uuid,

    pub call_request_id: Option<Uuid>,

    pub reason: String,

    pub description: String,

    pub status: ReportStatus,

    pub created_at: DateTime<Utc>,
}

impl Report {
    /// Report filed by the broadcaster against the caller of a banned request
    pub fn for_ban(call: &CallRequest) -> Self {
        Self {
            id: Uuid::now_v7(),
            reporter_id: call.broadcaster_id,
            reported_user_id: call.caller_id,
            call_request_id: Some(call.id),
            reason: BAN_REPORT_REASON.to_string(),
            description: format!(
                "Caller {} was banned from a {} call request ({} min)",
                call.caller_name, call.call_type, call.duration_minutes
            ),
            status: ReportStatus::Pending,
            created_at: Utc::now(),
        }
    }
}
