//! PostgreSQL connection pool management
//!
//! Pool creation from `DatabaseConfig` and an idempotent schema bootstrap.

use ringline_core::config::DatabaseConfig;
use ringline_core::{AppError, AppResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};

/// Tables used by the signaling core.
///
/// `sessions.call_request_id` is unique: it is the idempotency key that
/// keeps a call request from ever opening two sessions.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS call_requests (
    id              UUID PRIMARY KEY,
    caller_id       UUID NOT NULL,
    broadcaster_id  UUID NOT NULL,
    call_type       TEXT NOT NULL,
    duration_minutes INTEGER NOT NULL CHECK (duration_minutes > 0),
    total_price     NUMERIC(12, 2) NOT NULL CHECK (total_price >= 0),
    caller_name     TEXT NOT NULL,
    caller_photo    TEXT,
    status          TEXT NOT NULL DEFAULT 'ringing',
    end_reason      TEXT,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    answered_at     TIMESTAMPTZ,
    ended_at        TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_call_requests_broadcaster_status
    ON call_requests (broadcaster_id, status, created_at DESC);

CREATE INDEX IF NOT EXISTS idx_call_requests_caller
    ON call_requests (caller_id, created_at DESC);

CREATE TABLE IF NOT EXISTS sessions (
    id                   UUID PRIMARY KEY,
    call_request_id      UUID NOT NULL UNIQUE REFERENCES call_requests (id),
    broadcaster_id       UUID NOT NULL,
    customer_id          UUID NOT NULL,
    session_type         TEXT NOT NULL,
    duration_minutes     INTEGER NOT NULL,
    total_price          NUMERIC(12, 2) NOT NULL,
    broadcaster_earnings NUMERIC(12, 2) NOT NULL,
    status               TEXT NOT NULL DEFAULT 'active',
    started_at           TIMESTAMPTZ NOT NULL,
    ended_at             TIMESTAMPTZ,
    created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS reports (
    id               UUID PRIMARY KEY,
    reporter_id      UUID NOT NULL,
    reported_user_id UUID NOT NULL,
    call_request_id  UUID REFERENCES call_requests (id),
    reason           TEXT NOT NULL,
    description      TEXT NOT NULL DEFAULT '',
    status           TEXT NOT NULL DEFAULT 'pending',
    created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS notifications (
    id              UUID PRIMARY KEY,
    user_id         UUID NOT NULL,
    kind            TEXT NOT NULL,
    title           TEXT NOT NULL,
    message         TEXT NOT NULL,
    call_request_id UUID,
    is_read         BOOLEAN NOT NULL DEFAULT FALSE,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_notifications_user
    ON notifications (user_id, created_at DESC);

CREATE TABLE IF NOT EXISTS broadcaster_commissions (
    broadcaster_id  UUID PRIMARY KEY,
    commission_rate NUMERIC(5, 4) NOT NULL CHECK (commission_rate >= 0 AND commission_rate <= 1),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

/// Create a PostgreSQL connection pool
///
/// # Example
///
/// ```no_run
/// use ringline_core::config::DatabaseConfig;
/// use ringline_db::create_pool;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DatabaseConfig {
///         url: Some("postgresql://localhost/ringline".to_string()),
///         ..Default::default()
///     };
///     let pool = create_pool(&config).await?;
///     Ok(())
/// }
/// ```
pub async fn create_pool(config: &DatabaseConfig) -> AppResult<PgPool> {
    let url = config
        .url
        .as_deref()
        .ok_or_else(|| AppError::Config("database.url is not set".to_string()))?;

    info!("Creating database connection pool");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
        .test_before_acquire(true)
        .connect(url)
        .await
        .map_err(|e| {
            warn!("Failed to create database pool: {}", e);
            AppError::Pool(format!("Failed to connect to database: {}", e))
        })?;

    info!(
        "Database pool created successfully with {} max connections",
        config.max_connections
    );

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| AppError::Database(format!("Database health check failed: {}", e)))?;

    info!("Database connection verified");

    Ok(pool)
}

/// Create the signaling tables and indexes if they do not exist
pub async fn ensure_schema(pool: &PgPool) -> AppResult<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| AppError::Database(format!("Schema bootstrap failed: {}", e)))?;

    info!("Database schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_url_is_config_error() {
        let err = create_pool(&DatabaseConfig::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_create_pool_and_schema() {
        let config = DatabaseConfig {
            url: Some(
                std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgresql://localhost/ringline".to_string()),
            ),
            max_connections: 5,
            ..Default::default()
        };

        let pool = create_pool(&config).await.unwrap();
        ensure_schema(&pool).await.unwrap();
        // Idempotent
        ensure_schema(&pool).await.unwrap();
    }
}
