//! Server-side triggers for the daily and hourly pool lifecycle
//!
//! The runtime polls the wall clock and turns every boundary it crosses into
//! a [`Trigger`]. Triggers are idempotent, so a trigger that fails is kept at
//! the head of the queue and retried on the next tick instead of being lost.

use super::payout::{Distribution, PayoutCalculator};
use super::pool::RewardPoolManager;
use super::types::{RewardPool, HOURS_PER_DAY};
use super::volume::VolumeSource;
use crate::error::{EngineError, Result};
use crate::retry::ExponentialBackoff;
use chrono::{NaiveDate, Timelike, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// `(date, hour)` slot on the UTC clock
pub type Slot = (NaiveDate, u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// First tick after start: create today's pool and catch up missed hours
    Resume { date: NaiveDate, hour: u8 },
    /// A new UTC day started
    Daily { date: NaiveDate, hour: u8 },
    /// `hour` of `date` just ended
    Hourly { date: NaiveDate, hour: u8 },
}

pub fn current_slot() -> Slot {
    let now = Utc::now();
    (now.date_naive(), now.hour() as u8)
}

fn next_slot((date, hour): Slot) -> Option<Slot> {
    if hour + 1 < HOURS_PER_DAY {
        Some((date, hour + 1))
    } else {
        date.succ_opt().map(|d| (d, 0))
    }
}

/// Every boundary crossed moving from `from` to `to`, in order.
///
/// Each hour that ends yields `Hourly`; each midnight additionally yields
/// `Daily` for the new date, after the previous day's hour 23.
pub fn triggers_between(from: Slot, to: Slot) -> Vec<Trigger> {
    let mut out = Vec::new();
    let mut cursor = from;
    while cursor < to {
        out.push(Trigger::Hourly {
            date: cursor.0,
            hour: cursor.1,
        });
        let Some(next) = next_slot(cursor) else {
            break;
        };
        if next.0 != cursor.0 {
            out.push(Trigger::Daily {
                date: next.0,
                hour: next.1,
            });
        }
        cursor = next;
    }
    out
}

fn is_retryable(err: &EngineError) -> bool {
    matches!(err, EngineError::Storage(_) | EngineError::ExternalService(_))
}

pub struct EconomyScheduler {
    pools: RewardPoolManager,
    payouts: PayoutCalculator,
    volume: Arc<dyn VolumeSource>,
    backoff: ExponentialBackoff,
}

impl EconomyScheduler {
    pub fn new(
        pools: RewardPoolManager,
        payouts: PayoutCalculator,
        volume: Arc<dyn VolumeSource>,
    ) -> Self {
        Self {
            pools,
            payouts,
            volume,
            backoff: ExponentialBackoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sample the day's volume and create its pool with `hour` active.
    pub async fn on_daily_boundary(&self, date: NaiveDate, hour: u8) -> Result<RewardPool> {
        match self.pools.get_pool(date).await {
            Ok(existing) => return Ok(existing),
            Err(EngineError::PoolNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        let volume = self.volume.get_daily_volume(date).await?;
        log::info!("📊 Daily volume for {}: {:.4}", date, volume);
        self.pools.create_daily_pool(date, volume, hour).await
    }

    /// Pay out every hour of `date` that is still active up to and
    /// including `hour`, oldest first.
    ///
    /// Each payout closes its hour and opens the next one in the same
    /// transaction, so a trigger that arrives late (or skips ahead) walks the
    /// chain forward instead of closing an unpaid hour. Hours that are still
    /// pending, or already distributed, are left as they are. Safe to repeat.
    pub async fn on_hour_boundary(&self, date: NaiveDate, hour: u8) -> Result<Vec<Distribution>> {
        let mut paid = Vec::new();
        loop {
            let pool = match self.pools.get_pool(date).await {
                Ok(pool) => pool,
                Err(EngineError::PoolNotFound(_)) => {
                    log::warn!("⚠️  No pool for {}, skipping hour {}", date, hour);
                    return Ok(paid);
                }
                Err(e) => return Err(e),
            };
            let Some(open) = pool.active_hour().filter(|open| *open <= hour) else {
                break;
            };
            if open < hour {
                log::info!("🔁 Catching up {} hour {} before hour {}", date, open, hour);
            }
            match self.payouts.distribute(date, open).await {
                Ok(distribution) => paid.push(distribution),
                // finalised by someone else in the meantime: read again
                Err(EngineError::PoolNotActive { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(paid)
    }

    /// Pay out hours left active on earlier days, make sure today's pool
    /// exists, and catch up today's hours before `hour`.
    pub async fn resume(&self, date: NaiveDate, hour: u8) -> Result<()> {
        let mut stale_days: Vec<NaiveDate> = self
            .pools
            .active_hours_before(date)
            .await?
            .into_iter()
            .map(|(day, _)| day)
            .collect();
        stale_days.dedup();
        for day in stale_days {
            log::info!("🔁 Closing out {} left open across a restart", day);
            self.on_hour_boundary(day, HOURS_PER_DAY - 1).await?;
        }

        self.on_daily_boundary(date, hour).await?;
        if hour > 0 {
            self.on_hour_boundary(date, hour - 1).await?;
        }
        Ok(())
    }

    pub async fn fire(&self, trigger: Trigger) -> Result<()> {
        match trigger {
            Trigger::Resume { date, hour } => self.resume(date, hour).await,
            Trigger::Daily { date, hour } => self.on_daily_boundary(date, hour).await.map(|_| ()),
            Trigger::Hourly { date, hour } => self.on_hour_boundary(date, hour).await.map(|_| ()),
        }
    }

    async fn fire_with_retry(&self, trigger: Trigger) -> Result<()> {
        let mut backoff = self.backoff.clone();
        backoff.reset();
        loop {
            match self.fire(trigger).await {
                Ok(()) => return Ok(()),
                Err(e) if is_retryable(&e) => {
                    log::warn!("⚠️  {:?} failed: {}", trigger, e);
                    if backoff.sleep().await.is_err() {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Boundaries observed but not yet applied
#[derive(Debug, Default)]
pub struct TriggerQueue {
    last_seen: Option<Slot>,
    pending: VecDeque<Trigger>,
}

impl TriggerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the clock reading `slot`. A clock that moves backwards is ignored.
    pub fn observe(&mut self, slot: Slot) {
        match self.last_seen {
            None => self.pending.push_back(Trigger::Resume {
                date: slot.0,
                hour: slot.1,
            }),
            Some(prev) if prev < slot => self.pending.extend(triggers_between(prev, slot)),
            Some(_) => return,
        }
        self.last_seen = Some(slot);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Fire queued triggers in order.
    ///
    /// A trigger that still fails after retries stays queued and blocks the
    /// ones behind it, so hours are never finalised out of order. A trigger
    /// refused for a non-retryable reason is dropped.
    pub async fn drain(&mut self, scheduler: &EconomyScheduler) -> usize {
        let mut fired = 0;
        while let Some(trigger) = self.pending.front().copied() {
            match scheduler.fire_with_retry(trigger).await {
                Ok(()) => {
                    self.pending.pop_front();
                    fired += 1;
                }
                Err(e) if is_retryable(&e) => {
                    log::error!("❌ {:?} gave up after retries, will retry next tick: {}", trigger, e);
                    break;
                }
                Err(e) => {
                    log::error!("❌ {:?} refused, dropping: {}", trigger, e);
                    self.pending.pop_front();
                }
            }
        }
        fired
    }
}

/// Scheduler task - poll the clock and fire pool lifecycle triggers
///
/// Runs indefinitely until cancelled.
pub async fn scheduler_task(scheduler: Arc<EconomyScheduler>, tick_ms: u64) {
    log::info!("⏰ Starting economy scheduler (tick: {}ms)", tick_ms);

    let mut timer = interval(Duration::from_millis(tick_ms.max(1)));
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut queue = TriggerQueue::new();

    loop {
        timer.tick().await;
        queue.observe(current_slot());
        if queue.pending() == 0 {
            continue;
        }
        let fired = queue.drain(&scheduler).await;
        log::debug!("Scheduler fired {} triggers ({} pending)", fired, queue.pending());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::participation::ParticipationRegistry;
    use crate::rewards::payout::LeftoverPolicy;
    use crate::rewards::types::PoolStatus;
    use crate::rewards::volume::FixedVolumeSource;
    use crate::store::{PersistenceStore, SqliteStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    const WALLET: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
    }

    fn scheduler(store: Arc<SqliteStore>, volume: Arc<dyn VolumeSource>) -> EconomyScheduler {
        EconomyScheduler::new(
            RewardPoolManager::new(store.clone()),
            PayoutCalculator::new(store, LeftoverPolicy::RollForward),
            volume,
        )
        .with_backoff(ExponentialBackoff::new(10, 40, 2))
    }

    /// Fails the first `failures` calls
    struct FlakyVolume {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl VolumeSource for FlakyVolume {
        async fn get_daily_volume(&self, _date: NaiveDate) -> std::result::Result<f64, EngineError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                Err(EngineError::ExternalService("indexer down".to_string()))
            } else {
                Ok(2_400.0)
            }
        }
    }

    #[test]
    fn test_triggers_within_day() {
        let triggers = triggers_between((date(), 4), (date(), 6));
        assert_eq!(
            triggers,
            vec![
                Trigger::Hourly { date: date(), hour: 4 },
                Trigger::Hourly { date: date(), hour: 5 },
            ]
        );
        assert!(triggers_between((date(), 6), (date(), 6)).is_empty());
    }

    #[test]
    fn test_triggers_across_midnight() {
        let next = date().succ_opt().unwrap();
        let triggers = triggers_between((date(), 23), (next, 1));
        assert_eq!(
            triggers,
            vec![
                Trigger::Hourly { date: date(), hour: 23 },
                Trigger::Daily { date: next, hour: 0 },
                Trigger::Hourly { date: next, hour: 0 },
            ]
        );
    }

    #[test]
    fn test_queue_ignores_backwards_clock() {
        let mut queue = TriggerQueue::new();
        queue.observe((date(), 5));
        assert_eq!(queue.pending(), 1);
        queue.observe((date(), 3));
        assert_eq!(queue.pending(), 1);
        queue.observe((date(), 6));
        assert_eq!(queue.pending(), 2);
    }

    #[tokio::test]
    async fn test_hour_boundary_is_idempotent() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let scheduler = scheduler(store.clone(), Arc::new(FixedVolumeSource(2_400.0)));
        scheduler.on_daily_boundary(date(), 8).await.unwrap();
        ParticipationRegistry::new(store.clone())
            .register(WALLET, date(), 8, 10.0, 0.0)
            .await
            .unwrap();

        let first = scheduler.on_hour_boundary(date(), 8).await.unwrap();
        assert_eq!(first.len(), 1);
        let second = scheduler.on_hour_boundary(date(), 8).await.unwrap();
        assert!(second.is_empty());

        let pool = store.get_reward_pool(date()).await.unwrap().unwrap();
        assert_eq!(pool.hour(8).unwrap().status, PoolStatus::Distributed);
        assert_eq!(pool.active_hour(), Some(9));
        let records = store.participations_for_hour(date(), 8).await.unwrap();
        assert!((records[0].amount - first[0].participations[0].amount).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_skipped_hour_is_paid_before_later_boundary() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let scheduler = scheduler(store.clone(), Arc::new(FixedVolumeSource(2_400.0)));
        scheduler.on_daily_boundary(date(), 4).await.unwrap();
        ParticipationRegistry::new(store.clone())
            .register(WALLET, date(), 4, 10.0, 0.0)
            .await
            .unwrap();

        // the boundary for hour 4 never fired
        let paid = scheduler.on_hour_boundary(date(), 6).await.unwrap();
        assert_eq!(paid.iter().map(|d| d.hour).collect::<Vec<_>>(), vec![4, 5, 6]);

        let records = store.participations_for_hour(date(), 4).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].amount > 0.0);

        let pool = store.get_reward_pool(date()).await.unwrap().unwrap();
        let hour4 = pool.hour(4).unwrap();
        assert_eq!(hour4.status, PoolStatus::Distributed);
        assert!((hour4.distributed_amount - records[0].amount).abs() < 1e-9);
        for h in 5..=6 {
            assert_eq!(pool.hour(h).unwrap().status, PoolStatus::Distributed);
        }
        assert_eq!(pool.active_hour(), Some(7));
    }

    #[tokio::test]
    async fn test_hours_before_creation_stay_pending() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let scheduler = scheduler(store.clone(), Arc::new(FixedVolumeSource(2_400.0)));
        scheduler.on_daily_boundary(date(), 8).await.unwrap();

        assert!(scheduler.on_hour_boundary(date(), 3).await.unwrap().is_empty());

        let pool = store.get_reward_pool(date()).await.unwrap().unwrap();
        assert_eq!(pool.hour(3).unwrap().status, PoolStatus::Pending);
        assert_eq!(pool.active_hour(), Some(8));
    }

    #[tokio::test]
    async fn test_restart_after_midnight_pays_previous_day() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let scheduler = scheduler(store.clone(), Arc::new(FixedVolumeSource(2_400.0)));
        scheduler.on_daily_boundary(date(), 10).await.unwrap();
        ParticipationRegistry::new(store.clone())
            .register(WALLET, date(), 10, 10.0, 0.0)
            .await
            .unwrap();

        // process was down from hour 10 until 05:00 the next day
        let next = date().succ_opt().unwrap();
        let mut queue = TriggerQueue::new();
        queue.observe((next, 5));
        assert_eq!(queue.drain(&scheduler).await, 1);

        let previous = store.get_reward_pool(date()).await.unwrap().unwrap();
        assert_eq!(previous.active_hour(), None);
        assert_eq!(previous.hour(10).unwrap().status, PoolStatus::Distributed);
        let records = store.participations_for_hour(date(), 10).await.unwrap();
        assert!(records[0].amount > 0.0);
        assert!(store.active_hours_before(next).await.unwrap().is_empty());

        let today = store.get_reward_pool(next).await.unwrap().unwrap();
        assert_eq!(today.active_hour(), Some(5));
    }

    #[tokio::test]
    async fn test_daily_boundary_creates_once() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let volume = Arc::new(FlakyVolume {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let scheduler = scheduler(store.clone(), volume.clone());

        scheduler.on_daily_boundary(date(), 0).await.unwrap();
        scheduler.on_daily_boundary(date(), 3).await.unwrap();
        assert_eq!(volume.calls.load(Ordering::SeqCst), 1);
        assert!((store.reserve_balance().await.unwrap() - 12.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_resume_catches_up_missed_hours() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let scheduler = scheduler(store.clone(), Arc::new(FixedVolumeSource(2_400.0)));
        scheduler.on_daily_boundary(date(), 2).await.unwrap();

        scheduler.resume(date(), 5).await.unwrap();

        let pool = store.get_reward_pool(date()).await.unwrap().unwrap();
        for h in 2..5 {
            assert_eq!(pool.hour(h).unwrap().status, PoolStatus::Distributed);
        }
        assert_eq!(pool.active_hour(), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trigger_stays_queued() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        // initial attempt + 2 retries fail, the next tick succeeds
        let volume = Arc::new(FlakyVolume {
            failures: 3,
            calls: AtomicU32::new(0),
        });
        let scheduler = scheduler(store.clone(), volume);

        let mut queue = TriggerQueue::new();
        queue.observe((date(), 7));
        assert_eq!(queue.drain(&scheduler).await, 0);
        assert_eq!(queue.pending(), 1);
        assert!(store.get_reward_pool(date()).await.unwrap().is_none());

        queue.observe((date(), 8));
        assert_eq!(queue.drain(&scheduler).await, 2);
        assert_eq!(queue.pending(), 0);

        let pool = store.get_reward_pool(date()).await.unwrap().unwrap();
        assert_eq!(pool.hour(7).unwrap().status, PoolStatus::Distributed);
        assert_eq!(pool.active_hour(), Some(8));
    }
}
