//! Repository implementations
//!
//! Concrete PostgreSQL implementations of the repository traits defined in
//! ringline-core, using sqlx.

use ringline_core::AppError;

pub mod call_request_repo;
pub mod commission_repo;
pub mod notification_repo;
pub mod report_repo;
pub mod session_repo;

pub use call_request_repo::PgCallRequestRepository;
pub use commission_repo::PgCommissionRepository;
pub use notification_repo::PgNotificationRepository;
pub use report_repo::PgReportRepository;
pub use session_repo::PgSessionRepository;

/// Map a sqlx error, classifying connectivity failures as transient
pub(crate) fn store_error(context: &str, e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            AppError::StoreUnavailable(format!("{}: {}", context, e))
        }
        other => AppError::Database(format!("{}: {}", context, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_classification() {
        assert!(store_error("x", sqlx::Error::PoolTimedOut).is_transient());
        assert!(matches!(
            store_error("x", sqlx::Error::PoolClosed),
            AppError::StoreUnavailable(_)
        ));
        assert!(matches!(
            store_error("x", sqlx::Error::RowNotFound),
            AppError::Database(_)
        ));
    }
}
