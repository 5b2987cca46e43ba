//! Commission-based earnings calculator
//!
//! The commission rate is the platform's share of a session price. A
//! broadcaster may have an override in the commission store; otherwise the
//! configured default applies.

use async_trait::async_trait;
use ringline_core::{
    traits::{CommissionRepository, EarningsCalculator},
    AppError, AppResult,
};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Billing collaborator backed by the commission store
pub struct CommissionEarningsCalculator {
    commissions: Arc<dyn CommissionRepository>,
    default_rate: Decimal,
}

impl CommissionEarningsCalculator {
    pub fn new(commissions: Arc<dyn CommissionRepository>, default_rate: Decimal) -> Self {
        Self {
            commissions,
            default_rate,
        }
    }

    /// `price × (1 − rate)` rounded half away from zero to cents
    pub fn earnings_for(total_price: Decimal, rate: Decimal) -> AppResult<Decimal> {
        if rate < Decimal::ZERO || rate > Decimal::ONE {
            return Err(AppError::Billing(format!(
                "Commission rate {} is outside 0..=1",
                rate
            )));
        }
        if total_price < Decimal::ZERO {
            return Err(AppError::Billing(format!(
                "Negative session price {}",
                total_price
            )));
        }

        Ok((total_price * (Decimal::ONE - rate))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }
}

#[async_trait]
impl EarningsCalculator for CommissionEarningsCalculator {
    #[instrument(skip(self))]
    async fn compute_earnings(
        &self,
        broadcaster_id: Uuid,
        total_price: Decimal,
    ) -> AppResult<Decimal> {
        let rate = match self.commissions.commission_rate(broadcaster_id).await? {
            Some(rate) => rate,
            None => {
                debug!("No commission override for {}, using default", broadcaster_id);
                self.default_rate
            }
        };

        Self::earnings_for(total_price, rate).map_err(|e| {
            warn!("Earnings computation failed for {}: {}", broadcaster_id, e);
            e
        })
    }
}
