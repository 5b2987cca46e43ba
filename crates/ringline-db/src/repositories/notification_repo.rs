//! Notification repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ringline_core::{
    models::{Notification, NotificationKind},
    traits::{NotificationRepository, Repository},
    AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use super::store_error;

const NOTIFICATION_COLUMNS: &str = r#"
    id, user_id, kind, title, message, call_request_id, is_read, created_at
"#;

/// PostgreSQL implementation of NotificationRepository
pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<Notification, Uuid> for PgNotificationRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Notification>> {
        let query = format!(
            "SELECT {} FROM notifications WHERE id = $1",
            NOTIFICATION_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, NotificationRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding notification {}: {}", id, e);
                store_error("Failed to find notification", e)
            })?;

        row.map(NotificationRow::try_into_model).transpose()
    }

    #[instrument(skip(self, entity), fields(user_id = %entity.user_id, kind = %entity.kind))]
    async fn create(&self, entity: &Notification) -> AppResult<Notification> {
        let query = format!(
            r#"
            INSERT INTO notifications (
                id, user_id, kind, title, message, call_request_id, is_read, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            NOTIFICATION_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, NotificationRow>(&query)
            .bind(entity.id)
            .bind(entity.user_id)
            .bind(entity.kind.to_string())
            .bind(&entity.title)
            .bind(&entity.message)
            .bind(entity.call_request_id)
            .bind(entity.is_read)
            .bind(entity.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error creating notification: {}", e);
                store_error("Failed to create notification", e)
            })?;

        row.try_into_model()
    }

    #[instrument(skip(self, entity), fields(id = %entity.id))]
    async fn update(&self, entity: &Notification) -> AppResult<Notification> {
        let query = format!(
            "UPDATE notifications SET is_read = $2 WHERE id = $1 RETURNING {}",
            NOTIFICATION_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, NotificationRow>(&query)
            .bind(entity.id)
            .bind(entity.is_read)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error updating notification {}: {}", entity.id, e);
                store_error("Failed to update notification", e)
            })?;

        row.ok_or_else(|| AppError::NotFound(format!("Notification {}", entity.id)))?
            .try_into_model()
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting notification {}: {}", id, e);
                store_error("Failed to delete notification", e)
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Notification {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    #[instrument(skip(self))]
    async fn list_for_user(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<Notification>> {
        let query = format!(
            r#"
            SELECT {}
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
            NOTIFICATION_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, NotificationRow>(&query)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing notifications: {}", e);
                store_error("Failed to list notifications", e)
            })?;

        // Rows of kinds this build does not know about are skipped
        Ok(rows
            .into_iter()
            .filter_map(|row| match row.try_into_model() {
                Ok(n) => Some(n),
                Err(e) => {
                    warn!("Skipping notification: {}", e);
                    None
                }
            })
            .collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    title: String,
    message: String,
    call_request_id: Option<Uuid>,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl NotificationRow {
    fn try_into_model(self) -> AppResult<Notification> {
        let kind = NotificationKind::from_str(&self.kind).ok_or_else(|| {
            AppError::Serialization(format!("Unknown notification kind: {}", self.kind))
        })?;

        Ok(Notification {
            id: self.id,
            user_id: self.user_id,
            kind,
            title: self.title,
            message: self.message,
            call_request_id: self.call_request_id,
            is_read: self.is_read,
            created_at: self.created_at,
        })
    }
}
