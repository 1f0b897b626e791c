//! One participation per wallet per hour, weighted by token holdings

use super::types::{ParticipationRecord, HOURS_PER_DAY};
use crate::error::{validate_amount, validate_wallet, EngineError, Result};
use crate::store::{InsertOutcome, PersistenceStore};
use chrono::NaiveDate;
use std::sync::Arc;

pub const HOLDING_UNIT: f64 = 10_000.0;
pub const HOLDING_EXPONENT: f64 = 0.7;
pub const HOLDING_MIN: f64 = 0.2;
pub const HOLDING_MAX: f64 = 8.0;

/// `clamp(0.2 + (tokens / 10000)^0.7, 0.2, 8.0)`
pub fn holding_multiplier(tokens_held: f64) -> f64 {
    let tokens = if tokens_held.is_finite() { tokens_held.max(0.0) } else { 0.0 };
    (HOLDING_MIN + (tokens / HOLDING_UNIT).powf(HOLDING_EXPONENT)).clamp(HOLDING_MIN, HOLDING_MAX)
}

pub struct ParticipationRegistry {
    store: Arc<dyn PersistenceStore>,
}

impl ParticipationRegistry {
    pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
        Self { store }
    }

    /// Register `wallet` for `(date, hour)`.
    ///
    /// The active check, the insert and the participant count bump happen in
    /// one storage transaction, so two concurrent requests for the same hour
    /// cannot both succeed.
    pub async fn register(
        &self,
        wallet: &str,
        date: NaiveDate,
        hour: u8,
        base_points: f64,
        tokens_held: f64,
    ) -> Result<ParticipationRecord> {
        validate_wallet(wallet)?;
        validate_amount("base_points", base_points)?;
        validate_amount("tokens_held", tokens_held)?;
        if hour >= HOURS_PER_DAY {
            return Err(EngineError::Validation(format!("hour must be 0-23, got {}", hour)));
        }

        let multiplier = holding_multiplier(tokens_held);
        let record = ParticipationRecord {
            id: None,
            wallet: wallet.to_string(),
            date,
            hour,
            base_points,
            weighted_points: base_points * multiplier,
            multiplier,
            amount: 0.0,
            claimed: false,
            claimed_at: None,
            created_at: chrono::Utc::now().timestamp(),
        };

        match self.store.insert_participation(&record).await? {
            InsertOutcome::Inserted(inserted) => {
                log::info!(
                    "🎟️  {} joined {} hour {}: base={:.2} x{:.3} = {:.2}",
                    wallet,
                    date,
                    hour,
                    base_points,
                    multiplier,
                    inserted.weighted_points
                );
                Ok(inserted)
            }
            InsertOutcome::Duplicate => Err(EngineError::DuplicateParticipation {
                wallet: wallet.to_string(),
                date,
                hour,
            }),
            InsertOutcome::PoolNotActive => Err(EngineError::PoolNotActive { date, hour }),
        }
    }
}
