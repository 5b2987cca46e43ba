//! Session repository implementation
//!
//! Sessions are keyed by the call request that opened them; the unique
//! constraint on `call_request_id` makes creation idempotent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ringline_core::{
    models::{CallType, Session, SessionStatus},
    traits::{Repository, SessionRepository},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::store_error;

const SESSION_COLUMNS: &str = r#"
    id, call_request_id, broadcaster_id, customer_id,
    session_type, duration_minutes, total_price, broadcaster_earnings,
    status, started_at, ended_at, created_at
"#;

/// PostgreSQL implementation of SessionRepository
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    /// Create a new session repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(&self, column: &str, id: Uuid) -> AppResult<Option<Session>> {
        let query = format!(
            "SELECT {} FROM sessions WHERE {} = $1",
            SESSION_COLUMNS, column
        );

        let row = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding session by {} {}: {}", column, id, e);
                store_error("Failed to find session", e)
            })?;

        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl Repository<Session, Uuid> for PgSessionRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Session>> {
        debug!("Finding session by id: {}", id);
        self.fetch_one_by("id", id).await
    }

    #[instrument(skip(self, entity), fields(call_request_id = %entity.call_request_id))]
    async fn create(&self, entity: &Session) -> AppResult<Session> {
        let query = format!(
            r#"
            INSERT INTO sessions (
                id, call_request_id, broadcaster_id, customer_id,
                session_type, duration_minutes, total_price, broadcaster_earnings,
                status, started_at, ended_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );

        let row = bind_session(sqlx::query_as::<sqlx::Postgres, SessionRow>(&query), entity)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error creating session: {}", e);
                store_error("Failed to create session", e)
            })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity), fields(id = %entity.id))]
    async fn update(&self, entity: &Session) -> AppResult<Session> {
        debug!("Updating session: {}", entity.id);

        let query = format!(
            r#"
            UPDATE sessions
            SET status = $2,
                ended_at = $3,
                broadcaster_earnings = $4
            WHERE id = $1
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(entity.id)
            .bind(entity.status.to_string())
            .bind(entity.ended_at)
            .bind(entity.broadcaster_earnings)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error updating session {}: {}", entity.id, e);
                store_error("Failed to update session", e)
            })?;

        row.map(Into::into)
            .ok_or_else(|| AppError::SessionNotFound(entity.id.to_string()))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting session {}: {}", id, e);
                store_error("Failed to delete session", e)
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::SessionNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    #[instrument(skip(self))]
    async fn find_by_call_request(&self, call_request_id: Uuid) -> AppResult<Option<Session>> {
        self.fetch_one_by("call_request_id", call_request_id).await
    }

    #[instrument(skip(self, session), fields(call_request_id = %session.call_request_id))]
    async fn create_for_call_request(&self, session: &Session) -> AppResult<Session> {
        let query = format!(
            r#"
            INSERT INTO sessions (
                id, call_request_id, broadcaster_id, customer_id,
                session_type, duration_minutes, total_price, broadcaster_earnings,
                status, started_at, ended_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (call_request_id) DO NOTHING
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );

        let inserted = bind_session(sqlx::query_as::<sqlx::Postgres, SessionRow>(&query), session)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error creating session: {}", e);
                store_error("Failed to create session", e)
            })?;

        if let Some(row) = inserted {
            info!("Session {} opened", row.id);
            return Ok(row.into());
        }

        warn!(
            "Session for call request {} already exists, returning it",
            session.call_request_id
        );
        self.find_by_call_request(session.call_request_id)
            .await?
            .ok_or_else(|| {
                AppError::Database(format!(
                    "Session for call request {} conflicted but could not be read back",
                    session.call_request_id
                ))
            })
    }
}

fn bind_session<'q>(
    query: sqlx::query::QueryAs<'q, sqlx::Postgres, SessionRow, sqlx::postgres::PgArguments>,
    s: &Session,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, SessionRow, sqlx::postgres::PgArguments> {
    query
        .bind(s.id)
        .bind(s.call_request_id)
        .bind(s.broadcaster_id)
        .bind(s.customer_id)
        .bind(s.session_type.to_string())
        .bind(s.duration_minutes)
        .bind(s.total_price)
        .bind(s.broadcaster_earnings)
        .bind(s.status.to_string())
        .bind(s.started_at)
        .bind(s.ended_at)
        .bind(s.created_at)
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    call_request_id: Uuid,
    broadcaster_id: Uuid,
    customer_id: Uuid,
    session_type: String,
    duration_minutes: i32,
    total_price: Decimal,
    broadcaster_earnings: Decimal,
    status: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            call_request_id: row.call_request_id,
            broadcaster_id: row.broadcaster_id,
            customer_id: row.customer_id,
            session_type: CallType::from_str(&row.session_type).unwrap_or_default(),
            duration_minutes: row.duration_minutes,
            total_price: row.total_price,
            broadcaster_earnings: row.broadcaster_earnings,
            status: SessionStatus::from_str(&row.status).unwrap_or_default(),
            started_at: row.started_at,
            ended_at: row.ended_at,
            created_at: row.created_at,
        }
    }
}
