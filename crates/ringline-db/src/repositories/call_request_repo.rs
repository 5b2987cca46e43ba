//! Call request repository implementation
//!
//! Every status change is a single conditional `UPDATE ... WHERE status =
//! 'ringing'`, so concurrent accept/reject/ban/cancel attempts on the same
//! row are serialized by PostgreSQL and exactly one of them wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ringline_core::{
    models::{CallRequest, CallRequestStatus, CallTransition, CallType, EndReason},
    traits::{CallRequestFilter, CallRequestRepository, Repository},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use super::store_error;

/// Column list shared by all queries
const CALL_REQUEST_COLUMNS: &str = r#"
    id, caller_id, broadcaster_id,
    call_type, duration_minutes, total_price,
    caller_name, caller_photo,
    status, end_reason,
    created_at, answered_at, ended_at
"#;

/// PostgreSQL implementation of CallRequestRepository
pub struct PgCallRequestRepository {
    pool: PgPool,
}

impl PgCallRequestRepository {
    /// Create a new call request repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn parse_status(s: &str) -> CallRequestStatus {
        // Unknown values are treated as resolved so they can never be mutated
        CallRequestStatus::from_str(s).unwrap_or(CallRequestStatus::Rejected)
    }

    fn parse_call_type(s: &str) -> CallType {
        CallType::from_str(s).unwrap_or_default()
    }
}

#[async_trait]
impl Repository<CallRequest, Uuid> for PgCallRequestRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<CallRequest>> {
        debug!("Finding call request by id: {}", id);

        let query = format!(
            "SELECT {} FROM call_requests WHERE id = $1",
            CALL_REQUEST_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallRequestRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding call request {}: {}", id, e);
                store_error("Failed to find call request", e)
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, entity), fields(broadcaster_id = %entity.broadcaster_id))]
    async fn create(&self, entity: &CallRequest) -> AppResult<CallRequest> {
        debug!("Creating call request from caller {}", entity.caller_id);

        let query = format!(
            r#"
            INSERT INTO call_requests (
                id, caller_id, broadcaster_id,
                call_type, duration_minutes, total_price,
                caller_name, caller_photo,
                status, end_reason,
                created_at, answered_at, ended_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            CALL_REQUEST_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallRequestRow>(&query)
            .bind(entity.id)
            .bind(entity.caller_id)
            .bind(entity.broadcaster_id)
            .bind(entity.call_type.to_string())
            .bind(entity.duration_minutes)
            .bind(entity.total_price)
            .bind(&entity.caller_name)
            .bind(&entity.caller_photo)
            .bind(entity.status.to_string())
            .bind(entity.end_reason.map(|r| r.to_string()))
            .bind(entity.created_at)
            .bind(entity.answered_at)
            .bind(entity.ended_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error creating call request: {}", e);
                store_error("Failed to create call request", e)
            })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity), fields(id = %entity.id))]
    async fn update(&self, entity: &CallRequest) -> AppResult<CallRequest> {
        debug!("Updating call request: {}", entity.id);

        let query = format!(
            r#"
            UPDATE call_requests
            SET call_type = $2,
                duration_minutes = $3,
                total_price = $4,
                caller_name = $5,
                caller_photo = $6,
                status = $7,
                end_reason = $8,
                answered_at = $9,
                ended_at = $10
            WHERE id = $1
            RETURNING {}
            "#,
            CALL_REQUEST_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallRequestRow>(&query)
            .bind(entity.id)
            .bind(entity.call_type.to_string())
            .bind(entity.duration_minutes)
            .bind(entity.total_price)
            .bind(&entity.caller_name)
            .bind(&entity.caller_photo)
            .bind(entity.status.to_string())
            .bind(entity.end_reason.map(|r| r.to_string()))
            .bind(entity.answered_at)
            .bind(entity.ended_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error updating call request {}: {}", entity.id, e);
                store_error("Failed to update call request", e)
            })?;

        row.map(Into::into)
            .ok_or(AppError::CallRequestNotFound(entity.id))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> AppResult<()> {
        debug!("Deleting call request: {}", id);

        let result = sqlx::query("DELETE FROM call_requests WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting call request {}: {}", id, e);
                store_error("Failed to delete call request", e)
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::CallRequestNotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl CallRequestRepository for PgCallRequestRepository {
    #[instrument(skip(self))]
    async fn list(&self, filter: &CallRequestFilter) -> AppResult<Vec<CallRequest>> {
        debug!("Listing call requests: {:?}", filter);

        let query = format!(
            r#"
            SELECT {}
            FROM call_requests
            WHERE ($1::uuid IS NULL OR broadcaster_id = $1)
                AND ($2::uuid IS NULL OR caller_id = $2)
                AND ($3::text IS NULL OR status = $3)
                AND ($4::timestamptz IS NULL OR created_at < $4)
            ORDER BY created_at DESC, id DESC
            LIMIT $5
            "#,
            CALL_REQUEST_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, CallRequestRow>(&query)
            .bind(filter.broadcaster_id)
            .bind(filter.caller_id)
            .bind(filter.status.map(|s| s.to_string()))
            .bind(filter.created_before)
            .bind(filter.limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing call requests: {}", e);
                store_error("Failed to list call requests", e)
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn transition_if_ringing(
        &self,
        id: Uuid,
        transition: CallTransition,
        at: DateTime<Utc>,
    ) -> AppResult<CallRequest> {
        let query = format!(
            r#"
            UPDATE call_requests
            SET status = $2,
                end_reason = $3,
                answered_at = CASE WHEN $4 THEN $6 ELSE answered_at END,
                ended_at = CASE WHEN $5 THEN $6 ELSE ended_at END
            WHERE id = $1 AND status = 'ringing'
            RETURNING {}
            "#,
            CALL_REQUEST_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallRequestRow>(&query)
            .bind(id)
            .bind(transition.target_status().to_string())
            .bind(transition.end_reason().to_string())
            .bind(transition.stamps_answered_at())
            .bind(transition.stamps_ended_at())
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error applying {} to call request {}: {}", transition, id, e);
                store_error("Failed to update call request", e)
            })?;

        if let Some(row) = row {
            let call: CallRequest = row.into();
            info!("Call request {} -> {}", id, call.status);
            return Ok(call);
        }

        // Lost the race or unknown id; find out which
        match self.find_by_id(id).await? {
            Some(current) => {
                debug!(
                    "Stale {} on call request {} (status: {})",
                    transition, id, current.status
                );
                Err(AppError::stale(id, current.status))
            }
            None => Err(AppError::CallRequestNotFound(id)),
        }
    }

    #[instrument(skip(self))]
    async fn find_accepted_without_session(&self, limit: i64) -> AppResult<Vec<CallRequest>> {
        let query = format!(
            r#"
            SELECT {}
            FROM call_requests c
            WHERE c.status = 'accepted'
                AND NOT EXISTS (SELECT 1 FROM sessions s WHERE s.call_request_id = c.id)
            ORDER BY c.answered_at ASC NULLS FIRST
            LIMIT $1
            "#,
            CALL_REQUEST_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, CallRequestRow>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding accepted calls without session: {}", e);
                store_error("Failed to find accepted call requests", e)
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CallRequestRow {
    id: Uuid,
    caller_id: Uuid,
    broadcaster_id: Uuid,
    call_type: String,
    duration_minutes: i32,
    total_price: Decimal,
    caller_name: String,
    caller_photo: Option<String>,
    status: String,
    end_reason: Option<String>,
    created_at: DateTime<Utc>,
    answered_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl From<CallRequestRow> for CallRequest {
    fn from(row: CallRequestRow) -> Self {
        Self {
            id: row.id,
            caller_id: row.caller_id,
            broadcaster_id: row.broadcaster_id,
            call_type: PgCallRequestRepository::parse_call_type(&row.call_type),
            duration_minutes: row.duration_minutes,
            total_price: row.total_price,
            caller_name: row.caller_name,
            caller_photo: row.caller_photo,
            status: PgCallRequestRepository::parse_status(&row.status),
            end_reason: row.end_reason.as_deref().and_then(EndReason::from_str),
            created_at: row.created_at,
            answered_at: row.answered_at,
            ended_at: row.ended_at,
        }
    }
}
