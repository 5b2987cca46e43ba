//! Domain models for Ringline
//!
//! This module contains all the core domain models used throughout the application.

pub mod call_request;
pub mod notification;
pub mod report;
pub mod session;
pub mod user;

pub use call_request::{
    CallRequest, CallRequestStatus, CallTransition, CallType, EndReason, NewCallRequest,
};
pub use notification::{Notification, NotificationKind};
pub use report::{Report, ReportStatus, BAN_REPORT_REASON};
pub use session::{Session, SessionStatus};
pub use user::{Principal, UserRole};
