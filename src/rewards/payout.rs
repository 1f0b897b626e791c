//! Weighted-share payouts for a finished hourly pool
//!
//! ```text
//! share  = weighted_points / Σ weighted_points
//! reward = clamp(share · pool_amount, 0.001, pool_amount · 0.05)
//! ```
//!
//! Zero-weight entries get nothing. If the 0.001 floor pushes the total over
//! the pool (many tiny shares), every reward is scaled down pro rata so the
//! hour never pays out more than it holds.

use super::types::{ParticipationRecord, PoolStatus, HOURS_PER_DAY};
use crate::error::{EngineError, Result};
use crate::store::{FinalizeOutcome, Payout, PersistenceStore, StorageError};
use chrono::NaiveDate;
use std::sync::Arc;

pub const MIN_REWARD: f64 = 0.001;

/// Largest share of an hourly pool one participant can take
pub const MAX_REWARD_SHARE: f64 = 0.05;

/// Recompute-and-swap rounds before giving up on a busy hour
const MAX_FINALIZE_ATTEMPTS: u32 = 5;

/// What happens to `pool_amount − Σ reward` after the cap bites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeftoverPolicy {
    /// Add it to the next hour's pool (hour 23 retains it)
    RollForward,
    /// Leave it undistributed
    Retain,
}

impl std::str::FromStr for LeftoverPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "roll_forward" | "rollforward" => Ok(LeftoverPolicy::RollForward),
            "retain" => Ok(LeftoverPolicy::Retain),
            other => Err(format!("unknown leftover policy: {}", other)),
        }
    }
}

/// Outcome of one `distribute` call
#[derive(Debug, Clone)]
pub struct Distribution {
    pub date: NaiveDate,
    pub hour: u8,
    pub pool_amount: f64,
    pub distributed_amount: f64,
    pub leftover: f64,
    pub rolled_over: f64,
    pub participations: Vec<ParticipationRecord>,
}

/// Reward per participation, in input order.
pub fn compute_rewards(pool_amount: f64, participations: &[ParticipationRecord]) -> Vec<f64> {
    let total_weighted: f64 = participations
        .iter()
        .map(|p| p.weighted_points.max(0.0))
        .sum();

    if pool_amount <= 0.0 || total_weighted <= 0.0 {
        return vec![0.0; participations.len()];
    }

    let cap = pool_amount * MAX_REWARD_SHARE;
    let mut rewards: Vec<f64> = participations
        .iter()
        .map(|p| {
            if p.weighted_points <= 0.0 {
                return 0.0;
            }
            let raw = p.weighted_points / total_weighted * pool_amount;
            raw.max(MIN_REWARD).min(cap)
        })
        .collect();

    let total: f64 = rewards.iter().sum();
    if total > pool_amount {
        let scale = pool_amount / total;
        for r in rewards.iter_mut() {
            *r *= scale;
        }
    }
    rewards
}

pub struct PayoutCalculator {
    store: Arc<dyn PersistenceStore>,
    leftover_policy: LeftoverPolicy,
}

impl PayoutCalculator {
    pub fn new(store: Arc<dyn PersistenceStore>, leftover_policy: LeftoverPolicy) -> Self {
        Self {
            store,
            leftover_policy,
        }
    }

    /// Pay out the active hour `(date, hour)` and close it.
    ///
    /// The status flip `active → distributed` is a compare-and-swap in the
    /// same transaction that writes the amounts, so at most one caller ever
    /// pays a given hour. Everyone else gets `PoolNotActive`. The swap also
    /// checks the participant count the payouts were computed from; if a
    /// registration slipped in after the read, the payouts are recomputed.
    pub async fn distribute(&self, date: NaiveDate, hour: u8) -> Result<Distribution> {
        if hour >= HOURS_PER_DAY {
            return Err(EngineError::Validation(format!("hour must be 0-23, got {}", hour)));
        }

        for attempt in 1..=MAX_FINALIZE_ATTEMPTS {
            let pool = self
                .store
                .get_reward_pool(date)
                .await?
                .ok_or(EngineError::PoolNotFound(date))?;
            let hourly = pool
                .hour(hour)
                .ok_or(EngineError::PoolNotActive { date, hour })?;
            if hourly.status != PoolStatus::Active {
                return Err(EngineError::PoolNotActive { date, hour });
            }
            let pool_amount = hourly.pool_amount;

            let mut participations = self.store.participations_for_hour(date, hour).await?;
            let rewards = compute_rewards(pool_amount, &participations);

            let mut payouts = Vec::with_capacity(participations.len());
            for (record, reward) in participations.iter_mut().zip(rewards.iter()) {
                record.amount = *reward;
                if let Some(id) = record.id {
                    payouts.push(Payout {
                        participation_id: id,
                        amount: *reward,
                    });
                }
            }

            let distributed_amount: f64 = rewards.iter().sum();
            let leftover = (pool_amount - distributed_amount).max(0.0);
            let rolled_over = match self.leftover_policy {
                LeftoverPolicy::RollForward if hour + 1 < HOURS_PER_DAY => leftover,
                _ => 0.0,
            };

            match self
                .store
                .finalize_hour(
                    date,
                    hour,
                    participations.len() as u32,
                    &payouts,
                    rolled_over,
                )
                .await?
            {
                FinalizeOutcome::Finalized => {}
                FinalizeOutcome::NotActive => {
                    log::debug!("Hour {} of {} was finalised concurrently", hour, date);
                    return Err(EngineError::PoolNotActive { date, hour });
                }
                FinalizeOutcome::Stale => {
                    log::debug!(
                        "🔄 Late registration in {} hour {}, recomputing (attempt {})",
                        date,
                        hour,
                        attempt
                    );
                    continue;
                }
            }

            log::info!(
                "💸 Distributed {} hour {}: {:.6} of {:.6} to {} participants (leftover {:.6}, rolled {:.6})",
                date,
                hour,
                distributed_amount,
                pool_amount,
                participations.len(),
                leftover,
                rolled_over
            );

            return Ok(Distribution {
                date,
                hour,
                pool_amount,
                distributed_amount,
                leftover,
                rolled_over,
                participations,
            });
        }

        log::warn!(
            "⚠️  {} hour {} kept changing during payout, leaving it active",
            date,
            hour
        );
        Err(EngineError::Storage(StorageError::Database(format!(
            "participation set for {} hour {} changed on every attempt",
            date, hour
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::participation::ParticipationRegistry;
    use crate::rewards::pool::RewardPoolManager;
    use crate::points::PointsAccount;
    use crate::rewards::types::{ClaimReceipt, RewardPool};
    use crate::store::{InsertOutcome, PetState, SqliteStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
    }

    fn entry(weighted: f64) -> ParticipationRecord {
        ParticipationRecord {
            id: None,
            wallet: "w".to_string(),
            date: date(),
            hour: 0,
            base_points: weighted,
            weighted_points: weighted,
            multiplier: 1.0,
            amount: 0.0,
            claimed: false,
            claimed_at: None,
            created_at: 0,
        }
    }

    fn wallet(n: usize) -> String {
        format!("{:A>44}", n)
    }

    #[test]
    fn test_two_equal_participants_hit_cap() {
        // raw share 5 each, capped at 5% of 10
        let rewards = compute_rewards(10.0, &[entry(100.0), entry(100.0)]);
        assert_eq!(rewards, vec![0.5, 0.5]);
    }

    #[test]
    fn test_many_participants_split_pool() {
        // 40 equal shares of 10 -> 0.25 each, under the 0.5 cap
        let entries: Vec<_> = (0..40).map(|_| entry(3.0)).collect();
        let rewards = compute_rewards(10.0, &entries);
        for r in &rewards {
            assert!((r - 0.25).abs() < 1e-12);
        }
        assert!((rewards.iter().sum::<f64>() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_floor_and_cap_bounds() {
        let mut entries = vec![entry(1_000_000.0)];
        entries.extend((0..50).map(|_| entry(0.001)));
        let rewards = compute_rewards(10.0, &entries);

        assert_eq!(rewards[0], 0.5);
        for r in &rewards[1..] {
            assert_eq!(*r, MIN_REWARD);
        }
        let total: f64 = rewards.iter().sum();
        assert!(total <= 10.0);
        assert!(rewards.iter().all(|r| *r <= 0.5 + 1e-12));
    }

    #[test]
    fn test_floor_never_overdraws_pool() {
        // 5000 tiny shares at the 0.001 floor would be 5.0 from a pool of 1.0
        let entries: Vec<_> = (0..5_000).map(|_| entry(1.0)).collect();
        let rewards = compute_rewards(1.0, &entries);
        let total: f64 = rewards.iter().sum();
        assert!(total <= 1.0 + 1e-9);
        assert!(rewards.iter().all(|r| *r <= 0.05));
    }

    #[test]
    fn test_zero_weight_and_empty() {
        assert!(compute_rewards(10.0, &[]).is_empty());
        assert_eq!(compute_rewards(10.0, &[entry(0.0), entry(0.0)]), vec![0.0, 0.0]);
        assert_eq!(compute_rewards(0.0, &[entry(5.0)]), vec![0.0]);
    }

    #[tokio::test]
    async fn test_distribute_once_and_roll_forward() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        // rewards 2400*0.05 = 120, reserve 12, hourly 108/24 = 4.5
        RewardPoolManager::new(store.clone())
            .create_daily_pool(date(), 2_400.0, 6)
            .await
            .unwrap();
        let registry = ParticipationRegistry::new(store.clone());
        for n in 0..3 {
            registry.register(&wallet(n), date(), 6, 10.0, 10_000.0).await.unwrap();
        }

        let calculator = PayoutCalculator::new(store.clone(), LeftoverPolicy::RollForward);
        let dist = calculator.distribute(date(), 6).await.unwrap();

        let cap = 4.5 * MAX_REWARD_SHARE;
        assert_eq!(dist.participations.len(), 3);
        for p in &dist.participations {
            assert!((p.amount - cap).abs() < 1e-12);
        }
        assert!((dist.distributed_amount - 3.0 * cap).abs() < 1e-9);
        assert!((dist.rolled_over - (4.5 - 3.0 * cap)).abs() < 1e-9);

        assert!(matches!(
            calculator.distribute(date(), 6).await,
            Err(EngineError::PoolNotActive { hour: 6, .. })
        ));

        let pool = store.get_reward_pool(date()).await.unwrap().unwrap();
        assert_eq!(pool.hour(6).unwrap().status, PoolStatus::Distributed);
        assert_eq!(pool.active_hour(), Some(7));
        assert!((pool.hour(7).unwrap().pool_amount - (4.5 + dist.rolled_over)).abs() < 1e-9);
    }

    /// Commits one extra registration right after the first participation
    /// read, the way a request racing the payout would.
    struct RegisterDuringRead {
        inner: Arc<SqliteStore>,
        late: ParticipationRecord,
        fired: AtomicBool,
    }

    #[async_trait]
    impl PersistenceStore for RegisterDuringRead {
        async fn get_pet_state(&self, wallet: &str) -> std::result::Result<Option<PetState>, StorageError> {
            self.inner.get_pet_state(wallet).await
        }
        async fn save_pet_state(&self, wallet: &str, state: &PetState) -> std::result::Result<(), StorageError> {
            self.inner.save_pet_state(wallet, state).await
        }
        async fn get_points_account(
            &self,
            wallet: &str,
        ) -> std::result::Result<Option<PointsAccount>, StorageError> {
            self.inner.get_points_account(wallet).await
        }
        async fn save_points_account(
            &self,
            wallet: &str,
            account: &PointsAccount,
        ) -> std::result::Result<(), StorageError> {
            self.inner.save_points_account(wallet, account).await
        }
        async fn get_reward_pool(&self, date: NaiveDate) -> std::result::Result<Option<RewardPool>, StorageError> {
            self.inner.get_reward_pool(date).await
        }
        async fn save_reward_pool(&self, pool: &RewardPool) -> std::result::Result<(), StorageError> {
            self.inner.save_reward_pool(pool).await
        }
        async fn create_reward_pool(&self, pool: &RewardPool) -> std::result::Result<bool, StorageError> {
            self.inner.create_reward_pool(pool).await
        }
        async fn increment_reserve(&self, amount: f64) -> std::result::Result<f64, StorageError> {
            self.inner.increment_reserve(amount).await
        }
        async fn reserve_balance(&self) -> std::result::Result<f64, StorageError> {
            self.inner.reserve_balance().await
        }
        async fn insert_participation(
            &self,
            record: &ParticipationRecord,
        ) -> std::result::Result<InsertOutcome, StorageError> {
            self.inner.insert_participation(record).await
        }
        async fn participations_for_hour(
            &self,
            date: NaiveDate,
            hour: u8,
        ) -> std::result::Result<Vec<ParticipationRecord>, StorageError> {
            let records = self.inner.participations_for_hour(date, hour).await?;
            if !self.fired.swap(true, Ordering::SeqCst) {
                self.inner.insert_participation(&self.late).await?;
            }
            Ok(records)
        }
        async fn finalize_hour(
            &self,
            date: NaiveDate,
            hour: u8,
            expected_participants: u32,
            payouts: &[Payout],
            rollover: f64,
        ) -> std::result::Result<FinalizeOutcome, StorageError> {
            self.inner
                .finalize_hour(date, hour, expected_participants, payouts, rollover)
                .await
        }
        async fn active_hours_before(
            &self,
            date: NaiveDate,
        ) -> std::result::Result<Vec<(NaiveDate, u8)>, StorageError> {
            self.inner.active_hours_before(date).await
        }
        async fn get_unclaimed_rewards(
            &self,
            wallet: &str,
        ) -> std::result::Result<Vec<ParticipationRecord>, StorageError> {
            self.inner.get_unclaimed_rewards(wallet).await
        }
        async fn mark_claimed(&self, ids: &[i64], claimed_at: i64) -> std::result::Result<usize, StorageError> {
            self.inner.mark_claimed(ids, claimed_at).await
        }
        async fn claim_rewards(
            &self,
            wallet: &str,
            claimed_at: i64,
        ) -> std::result::Result<Option<ClaimReceipt>, StorageError> {
            self.inner.claim_rewards(wallet, claimed_at).await
        }
        async fn token_balance(&self, wallet: &str) -> std::result::Result<f64, StorageError> {
            self.inner.token_balance(wallet).await
        }
    }

    #[tokio::test]
    async fn test_registration_during_payout_is_paid() {
        let inner = Arc::new(SqliteStore::open_in_memory().unwrap());
        RewardPoolManager::new(inner.clone())
            .create_daily_pool(date(), 2_400.0, 6)
            .await
            .unwrap();
        ParticipationRegistry::new(inner.clone())
            .register(&wallet(1), date(), 6, 10.0, 0.0)
            .await
            .unwrap();

        let mut late = entry(10.0);
        late.wallet = wallet(2);
        late.hour = 6;
        late.multiplier = 0.2;
        late.weighted_points = 2.0;
        let store = Arc::new(RegisterDuringRead {
            inner: inner.clone(),
            late,
            fired: AtomicBool::new(false),
        });

        let calculator = PayoutCalculator::new(store, LeftoverPolicy::Retain);
        let dist = calculator.distribute(date(), 6).await.unwrap();
        assert_eq!(dist.participations.len(), 2);

        let rows = inner.participations_for_hour(date(), 6).await.unwrap();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert!(row.amount > 0.0, "{} finalised at zero", row.wallet);
        }
        let pool = inner.get_reward_pool(date()).await.unwrap().unwrap();
        assert_eq!(pool.hour(6).unwrap().participants, 2);
        assert_eq!(pool.hour(6).unwrap().status, PoolStatus::Distributed);
    }

    #[tokio::test]
    async fn test_distribute_zero_participants() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        RewardPoolManager::new(store.clone())
            .create_daily_pool(date(), 2_400.0, 6)
            .await
            .unwrap();

        let calculator = PayoutCalculator::new(store.clone(), LeftoverPolicy::Retain);
        let dist = calculator.distribute(date(), 6).await.unwrap();
        assert_eq!(dist.distributed_amount, 0.0);
        assert_eq!(dist.rolled_over, 0.0);

        let pool = store.get_reward_pool(date()).await.unwrap().unwrap();
        assert_eq!(pool.hour(6).unwrap().status, PoolStatus::Distributed);
        assert_eq!(pool.hour(6).unwrap().distributed_amount, 0.0);
        assert!((pool.hour(7).unwrap().pool_amount - 4.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_distribute_pending_hour_refused() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        RewardPoolManager::new(store.clone())
            .create_daily_pool(date(), 2_400.0, 6)
            .await
            .unwrap();
        let calculator = PayoutCalculator::new(store, LeftoverPolicy::Retain);
        assert!(matches!(
            calculator.distribute(date(), 9).await,
            Err(EngineError::PoolNotActive { hour: 9, .. })
        ));
    }
}
