//! Moderation report repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ringline_core::{
    models::{Report, ReportStatus},
    traits::{ReportRepository, Repository},
    AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::store_error;

const REPORT_COLUMNS: &str = r#"
    id, reporter_id, reported_user_id, call_request_id,
    reason, description, status, created_at
"#;

/// PostgreSQL implementation of ReportRepository
pub struct PgReportRepository {
    pool: PgPool,
}

impl PgReportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<Report, Uuid> for PgReportRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Report>> {
        let query = format!("SELECT {} FROM reports WHERE id = $1", REPORT_COLUMNS);

        let row = sqlx::query_as::<sqlx::Postgres, ReportRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding report {}: {}", id, e);
                store_error("Failed to find report", e)
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, entity), fields(reported_user_id = %entity.reported_user_id))]
    async fn create(&self, entity: &Report) -> AppResult<Report> {
        debug!("Filing report {} by {}", entity.reason, entity.reporter_id);

        let query = format!(
            r#"
            INSERT INTO reports (
                id, reporter_id, reported_user_id, call_request_id,
                reason, description, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            REPORT_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, ReportRow>(&query)
            .bind(entity.id)
            .bind(entity.reporter_id)
            .bind(entity.reported_user_id)
            .bind(entity.call_request_id)
            .bind(&entity.reason)
            .bind(&entity.description)
            .bind(entity.status.to_string())
            .bind(entity.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error creating report: {}", e);
                store_error("Failed to create report", e)
            })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity), fields(id = %entity.id))]
    async fn update(&self, entity: &Report) -> AppResult<Report> {
        let query = format!(
            r#"
            UPDATE reports
            SET status = $2,
                description = $3
            WHERE id = $1
            RETURNING {}
            "#,
            REPORT_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, ReportRow>(&query)
            .bind(entity.id)
            .bind(entity.status.to_string())
            .bind(&entity.description)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error updating report {}: {}", entity.id, e);
                store_error("Failed to update report", e)
            })?;

        row.map(Into::into)
            .ok_or_else(|| AppError::NotFound(format!("Report {}", entity.id)))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM reports WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting report {}: {}", id, e);
                store_error("Failed to delete report", e)
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Report {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ReportRepository for PgReportRepository {
    #[instrument(skip(self))]
    async fn list_by_call_request(&self, call_request_id: Uuid) -> AppResult<Vec<Report>> {
        let query = format!(
            "SELECT {} FROM reports WHERE call_request_id = $1 ORDER BY created_at",
            REPORT_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, ReportRow>(&query)
            .bind(call_request_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing reports: {}", e);
                store_error("Failed to list reports", e)
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReportRow {
    id: Uuid,
    reporter_id: Uuid,
    reported_user_id: Uuid,
    call_request_id: Option<Uuid>,
    reason: String,
    description: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl From<ReportRow> for Report {
    fn from(row: ReportRow) -> Self {
        Self {
            id: row.id,
            reporter_id: row.reporter_id,
            reported_user_id: row.reported_user_id,
            call_request_id: row.call_request_id,
            reason: row.reason,
            description: row.description,
            status: ReportStatus::from_str(&row.status).unwrap_or_default(),
            created_at: row.created_at,
        }
    }
}
