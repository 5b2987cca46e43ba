//! User role and authenticated principal
//!
//! User records themselves live outside this system; signaling only needs
//! to know who is acting and whether they may receive calls.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// User role enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Regular viewer; can book calls
    #[default]
    Viewer,
    /// Broadcaster; can receive calls when approved
    Broadcaster,
    /// Platform administrator
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Viewer => write!(f, "viewer"),
            UserRole::Broadcaster => write!(f, "broadcaster"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

impl UserRole {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "viewer" => Some(UserRole::Viewer),
            "broadcaster" => Some(UserRole::Broadcaster),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }

    pub fn is_broadcaster(&self) -> bool {
        matches!(self, UserRole::Broadcaster)
    }
}

/// The authenticated actor behind a signaling operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,

    pub role: UserRole,

    /// Broadcaster approved to take private calls
    pub call_eligible: bool,
}

impl Principal {
    pub fn viewer(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: UserRole::Viewer,
            call_eligible: false,
        }
    }

    pub fn broadcaster(user_id: Uuid, call_eligible: bool) -> Self {
        Self {
            user_id,
            role: UserRole::Broadcaster,
            call_eligible,
        }
    }

    /// Only approved broadcasters are rung
    pub fn can_receive_calls(&self) -> bool {
        self.role.is_broadcaster() && self.call_eligible
    }
}
