//! Broadcaster commission overrides

use async_trait::async_trait;
use ringline_core::{traits::CommissionRepository, AppResult};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{error, instrument};
use uuid::Uuid;

use super::store_error;

/// PostgreSQL implementation of CommissionRepository
pub struct PgCommissionRepository {
    pool: PgPool,
}

impl PgCommissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Set or replace a broadcaster's commission rate
    #[instrument(skip(self))]
    pub async fn set_commission_rate(&self, broadcaster_id: Uuid, rate: Decimal) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO broadcaster_commissions (broadcaster_id, commission_rate)
            VALUES ($1, $2)
            ON CONFLICT (broadcaster_id)
            DO UPDATE SET commission_rate = EXCLUDED.commission_rate, updated_at = NOW()
            "#,
        )
        .bind(broadcaster_id)
        .bind(rate)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error setting commission for {}: {}", broadcaster_id, e);
            store_error("Failed to set commission rate", e)
        })?;

        Ok(())
    }
}

#[async_trait]
impl CommissionRepository for PgCommissionRepository {
    #[instrument(skip(self))]
    async fn commission_rate(&self, broadcaster_id: Uuid) -> AppResult<Option<Decimal>> {
        let rate: Option<(Decimal,)> = sqlx::query_as(
            "SELECT commission_rate FROM broadcaster_commissions WHERE broadcaster_id = $1",
        )
        .bind(broadcaster_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error reading commission for {}: {}", broadcaster_id, e);
            store_error("Failed to read commission rate", e)
        })?;

        Ok(rate.map(|(r,)| r))
    }
}
