//! JWT Claims structure
//!
//! Tokens are issued by the wider platform; they carry the user id, role and
//! whether a broadcaster has been approved to take private calls.

use chrono::{Duration, Utc};
use ringline_core::models::{Principal, UserRole};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Subject (user id)
    pub sub: Uuid,

    /// User role
    pub role: UserRole,

    /// Approved to receive private calls
    #[serde(default)]
    pub call_eligible: bool,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Create new claims for a principal
    ///
    /// # Examples
    ///
    /// ```
    /// use ringline_auth::Claims;
    /// use ringline_core::models::Principal;
    /// use uuid::Uuid;
    ///
    /// let id = Uuid::new_v4();
    /// let claims = Claims::new(&Principal::broadcaster(id, true));
    /// assert_eq!(claims.sub, id);
    /// assert!(claims.call_eligible);
    /// ```
    pub fn new(principal: &Principal) -> Self {
        Self {
            sub: principal.user_id,
            role: principal.role,
            call_eligible: principal.call_eligible,
            iat: Utc::now().timestamp(),
            exp: 0, // Will be set by JwtService
        }
    }

    /// Create new claims with custom expiration duration
    pub fn with_expiration(principal: &Principal, expires_in_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            exp: (now + Duration::seconds(expires_in_secs)).timestamp(),
            iat: now.timestamp(),
            ..Self::new(principal)
        }
    }

    pub fn is_expired(&self) -> bool {
        self.exp <= Utc::now().timestamp()
    }

    /// The acting principal described by these claims
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.sub,
            role: self.role,
            call_eligible: self.call_eligible,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_round_trip_principal() {
        let principal = Principal::broadcaster(Uuid::new_v4(), true);
        let claims = Claims::new(&principal);
        assert_eq!(claims.principal(), principal);
        assert!(claims.iat > 0);
    }

    #[test]
    fn test_claims_with_expiration() {
        let claims = Claims::with_expiration(&Principal::viewer(Uuid::new_v4()), 3600);
        assert!(!claims.is_expired());

        let now = Utc::now().timestamp();
        assert!(claims.exp > now);
        assert!(claims.exp <= now + 3600);
    }

    #[test]
    fn test_expired_claims() {
        let mut claims = Claims::new(&Principal::viewer(Uuid::new_v4()));
        claims.exp = (Utc::now() - Duration::hours(1)).timestamp();
        assert!(claims.is_expired());
    }

    #[test]
    fn test_missing_eligibility_defaults_false() {
        let id = Uuid::new_v4();
        let json = format!(
            r#"{{"sub":"{}","role":"broadcaster","iat":1,"exp":2}}"#,
            id
        );
        let claims: Claims = serde_json::from_str(&json).unwrap();
        assert!(!claims.principal().can_receive_calls());
    }
}
