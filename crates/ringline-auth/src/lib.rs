//! Authentication for Ringline
//!
//! JWT validation and Actix-web extractors. Tokens are issued by the wider
//! platform; this crate only validates them and turns them into a
//! `Principal` for the signaling services.
//!
//! # Examples
//!
//! ```no_run
//! use actix_web::HttpResponse;
//! use ringline_auth::middleware::{AuthenticatedUser, CallEligibleBroadcaster};
//!
//! async fn outgoing(user: AuthenticatedUser) -> HttpResponse {
//!     HttpResponse::Ok().json(serde_json::json!({ "caller": user.user_id() }))
//! }
//!
//! async fn incoming(broadcaster: CallEligibleBroadcaster) -> HttpResponse {
//!     HttpResponse::Ok().json(serde_json::json!({ "broadcaster": broadcaster.user_id() }))
//! }
//! ```

pub mod claims;
pub mod jwt;
pub mod middleware;

pub use claims::Claims;
pub use jwt::JwtService;
pub use middleware::{AuthenticatedUser, CallEligibleBroadcaster};
