//! Token issuing and verification
//!
//! Verification is strict about expiry (no clock leeway): a ringing call can
//! outlive a short-lived token, and a broadcaster whose approval was revoked
//! must stop receiving calls as soon as their token runs out.

use crate::claims::Claims;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ringline_core::error::AppError;
use ringline_core::models::Principal;
use ringline_core::AppResult;
use tracing::{debug, error, warn};

/// HS256 token service shared by the HTTP extractors
#[derive(Clone)]
pub struct JwtService {
    ttl: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    /// ```
    /// use ringline_auth::JwtService;
    ///
    /// let tokens = JwtService::new("signing-secret", 3600);
    /// assert_eq!(tokens.ttl_secs(), 3600);
    /// ```
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            ttl: Duration::seconds(ttl_secs),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// Sign `claims`. A zero `exp` is replaced with now + ttl.
    pub fn sign(&self, claims: &Claims) -> AppResult<String> {
        let mut claims = claims.clone();
        if claims.exp == 0 {
            claims.exp = (Utc::now() + self.ttl).timestamp();
        }

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            error!(user_id = %claims.sub, "Token signing failed: {}", e);
            AppError::InvalidToken(format!("Token signing failed: {}", e))
        })
    }

    /// Issue a token for `principal` with the default ttl
    pub fn issue(&self, principal: &Principal) -> AppResult<String> {
        self.sign(&Claims::new(principal))
    }

    /// Check signature and expiry and return the claims.
    ///
    /// ```
    /// use ringline_auth::JwtService;
    /// use ringline_core::models::Principal;
    /// use uuid::Uuid;
    ///
    /// let tokens = JwtService::new("signing-secret", 3600);
    /// let broadcaster = Principal::broadcaster(Uuid::new_v4(), true);
    /// let claims = tokens.verify(&tokens.issue(&broadcaster)?)?;
    /// assert_eq!(claims.principal(), broadcaster);
    /// # Ok::<(), ringline_core::AppError>(())
    /// ```
    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => {
                    debug!("Rejected expired token");
                    AppError::TokenExpired
                }
                _ => {
                    warn!("Rejected token: {}", e);
                    AppError::InvalidToken(e.to_string())
                }
            })?
            .claims;

        debug!(user_id = %claims.sub, role = %claims.role, "Token verified");
        Ok(claims)
    }
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("ttl_secs", &self.ttl_secs())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringline_core::models::UserRole;
    use uuid::Uuid;

    const SECRET: &str = "ringline-test-signing-secret";

    #[test]
    fn test_broadcaster_eligibility_survives_the_token() {
        let tokens = JwtService::new(SECRET, 3600);
        let broadcaster = Principal::broadcaster(Uuid::new_v4(), true);

        let claims = tokens.verify(&tokens.issue(&broadcaster).unwrap()).unwrap();
        assert_eq!(claims.role, UserRole::Broadcaster);
        assert!(claims.principal().can_receive_calls());
    }

    #[test]
    fn test_expired_token_is_rejected_without_leeway() {
        let tokens = JwtService::new(SECRET, 3600);
        let claims = Claims::with_expiration(&Principal::viewer(Uuid::new_v4()), -1);

        let token = tokens.sign(&claims).unwrap();
        assert!(matches!(tokens.verify(&token), Err(AppError::TokenExpired)));
    }

    #[test]
    fn test_foreign_or_garbled_tokens_are_invalid() {
        let ours = JwtService::new(SECRET, 3600);
        let theirs = JwtService::new("someone-else", 3600);
        let token = theirs.issue(&Principal::viewer(Uuid::new_v4())).unwrap();

        assert!(matches!(ours.verify(&token), Err(AppError::InvalidToken(_))));
        assert!(matches!(ours.verify("not-a-token"), Err(AppError::InvalidToken(_))));
    }

    #[test]
    fn test_debug_output_omits_keys() {
        let rendered = format!("{:?}", JwtService::new(SECRET, 60));
        assert!(rendered.contains("ttl_secs: 60"));
        assert!(!rendered.contains(SECRET));
    }
}
