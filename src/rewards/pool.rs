//! Daily reward pools and their hourly lifecycle
//!
//! ```text
//! daily_rewards  = volume · 0.05
//! reserve        = daily_rewards · 0.10   → reserve fund
//! distributable  = daily_rewards − reserve
//! hourly_amount  = distributable / 24
//! ```
//!
//! Both entry points are safe to re-invoke: creating an existing date
//! returns the stored pool, advancing a distributed hour is a no-op.

use super::types::{HourlyPool, PoolStatus, RewardPool, HOURS_PER_DAY};
use crate::error::{validate_amount, EngineError, Result};
use crate::store::PersistenceStore;
use chrono::NaiveDate;
use std::sync::Arc;

/// Share of trading volume that funds rewards
pub const TAX_RATE: f64 = 0.05;

/// Share of daily rewards set aside in the reserve fund
pub const RESERVE_RATIO: f64 = 0.10;

/// Build the in-memory pool for `date`, with `current_hour` active.
pub fn build_daily_pool(date: NaiveDate, volume: f64, current_hour: u8) -> RewardPool {
    let total_daily_rewards = volume * TAX_RATE;
    let reserve_amount = total_daily_rewards * RESERVE_RATIO;
    let distributable = total_daily_rewards - reserve_amount;
    let hourly_amount = distributable / HOURS_PER_DAY as f64;

    let hourly_pools = (0..HOURS_PER_DAY)
        .map(|hour| HourlyPool {
            hour,
            pool_amount: hourly_amount,
            distributed_amount: 0.0,
            participants: 0,
            status: if hour == current_hour {
                PoolStatus::Active
            } else {
                PoolStatus::Pending
            },
        })
        .collect();

    RewardPool {
        date,
        total_daily_volume: volume,
        total_daily_rewards,
        reserve_amount,
        hourly_pools,
    }
}

/// Mark `hour` distributed and activate `hour + 1` if it is pending.
///
/// Only those two hours are touched, and `hour + 1` is left alone while some
/// other hour is still active so the day never has two. Returns `false` when
/// `hour` was already distributed, in which case the pool is untouched.
pub fn advance_hour_in(pool: &mut RewardPool, hour: u8) -> bool {
    match pool.hour_mut(hour) {
        Some(h) if h.status != PoolStatus::Distributed => h.status = PoolStatus::Distributed,
        _ => return false,
    }

    if pool.active_hour().is_none() {
        if let Some(next) = pool.hour_mut(hour + 1) {
            if next.status == PoolStatus::Pending {
                next.status = PoolStatus::Active;
            }
        }
    }
    true
}

pub struct RewardPoolManager {
    store: Arc<dyn PersistenceStore>,
}

impl RewardPoolManager {
    pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
        Self { store }
    }

    /// Create the pool for `date` from a volume sample.
    ///
    /// Idempotent: if the date already has a pool it is returned unchanged
    /// and the reserve fund is not incremented again.
    pub async fn create_daily_pool(
        &self,
        date: NaiveDate,
        volume: f64,
        current_hour: u8,
    ) -> Result<RewardPool> {
        if let Some(existing) = self.store.get_reward_pool(date).await? {
            log::debug!("Pool for {} already exists", date);
            return Ok(existing);
        }

        validate_amount("volume", volume)?;
        if current_hour >= HOURS_PER_DAY {
            return Err(EngineError::Validation(format!(
                "hour must be 0-23, got {}",
                current_hour
            )));
        }

        let pool = build_daily_pool(date, volume, current_hour);
        let inserted = self.store.create_reward_pool(&pool).await?;

        if !inserted {
            // Lost a race with another creator: theirs is authoritative
            return self
                .store
                .get_reward_pool(date)
                .await?
                .ok_or(EngineError::PoolNotFound(date));
        }

        log::info!(
            "🏦 Created reward pool {}: volume={:.4} rewards={:.4} reserve={:.4} hourly={:.6} (active hour {})",
            date,
            pool.total_daily_volume,
            pool.total_daily_rewards,
            pool.reserve_amount,
            pool.hourly_pools.first().map(|h| h.pool_amount).unwrap_or(0.0),
            current_hour
        );
        Ok(pool)
    }

    pub async fn get_pool(&self, date: NaiveDate) -> Result<RewardPool> {
        self.store
            .get_reward_pool(date)
            .await?
            .ok_or(EngineError::PoolNotFound(date))
    }

    /// `(date, hour)` of hours left active on days before `date`.
    pub async fn active_hours_before(&self, date: NaiveDate) -> Result<Vec<(NaiveDate, u8)>> {
        Ok(self.store.active_hours_before(date).await?)
    }

    /// Mark `hour` distributed and `hour + 1` active.
    ///
    /// This is the bare lifecycle move; payouts for an active hour are
    /// computed by `PayoutCalculator::distribute`, which the scheduler runs
    /// first.
    ///
    /// Refused while an earlier hour is still active: that hour has to be
    /// paid out first or its participants would never be.
    pub async fn advance_hour(&self, date: NaiveDate, hour: u8) -> Result<RewardPool> {
        let mut pool = self.get_pool(date).await?;
        if let Some(open) = pool.active_hour().filter(|open| *open < hour) {
            log::warn!(
                "⚠️  Not advancing {} past hour {}: hour {} is still active",
                date,
                hour,
                open
            );
            return Err(EngineError::PoolNotActive { date, hour: open });
        }
        if !advance_hour_in(&mut pool, hour) {
            log::debug!("Hour {} of {} already distributed", hour, date);
            return Ok(pool);
        }
        self.store.save_reward_pool(&pool).await?;
        log::info!(
            "⏭️  Advanced {} past hour {} (active: {:?})",
            date,
            hour,
            pool.active_hour()
        );
        Ok(pool)
    }
}
