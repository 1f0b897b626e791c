//! End-to-end reward economy: pool creation → participation → hourly
//! distribution → claim, against a SQLite file that is reopened between
//! steps.

#[cfg(test)]
mod economy_integration_tests {
    use chrono::NaiveDate;
    use gochi::error::EngineError;
    use gochi::rewards::{
        ClaimLedger, EconomyScheduler, FixedVolumeSource, LeftoverPolicy, ParticipationRegistry,
        PayoutCalculator, PoolStatus, RewardPoolManager,
    };
    use gochi::store::{PersistenceStore, SqliteStore};
    use std::sync::Arc;
    use tempfile::TempDir;

    const ALICE: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
    const BOB: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
    const CAROL: &str = "HN7cABqLq46Es1jh92dQQisAq662SmxELLLsHHe4YWrH";

    // volume 24k → rewards 1200, reserve 120, hourly 45, per-wallet cap 2.25
    const VOLUME: f64 = 24_000.0;
    const HOURLY: f64 = 45.0;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()
    }

    fn scheduler(store: Arc<SqliteStore>, policy: LeftoverPolicy) -> EconomyScheduler {
        EconomyScheduler::new(
            RewardPoolManager::new(store.clone()),
            PayoutCalculator::new(store, policy),
            Arc::new(FixedVolumeSource(VOLUME)),
        )
    }

    #[tokio::test]
    async fn test_full_day_flow_with_claims() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("gochi.db");

        {
            let store = Arc::new(SqliteStore::open(&db_path).unwrap());
            let scheduler = scheduler(store.clone(), LeftoverPolicy::RollForward);
            let registry = ParticipationRegistry::new(store.clone());

            let pool = scheduler.on_daily_boundary(date(), 0).await.unwrap();
            assert!((pool.total_daily_rewards - 1_200.0).abs() < 1e-9);
            assert!((store.reserve_balance().await.unwrap() - 120.0).abs() < 1e-9);

            registry.register(ALICE, date(), 0, 40.0, 50_000.0).await.unwrap();
            registry.register(BOB, date(), 0, 25.0, 1_000.0).await.unwrap();
            registry.register(CAROL, date(), 0, 10.0, 0.0).await.unwrap();

            let paid = scheduler.on_hour_boundary(date(), 0).await.unwrap();
            assert_eq!(paid.len(), 1);
            let dist = &paid[0];
            let cap = HOURLY * 0.05;
            for p in &dist.participations {
                assert!(p.amount > 0.0);
                assert!(p.amount <= cap + 1e-12);
            }
            assert!(dist.distributed_amount <= HOURLY);
            assert!((dist.rolled_over - (HOURLY - dist.distributed_amount)).abs() < 1e-9);

            registry.register(ALICE, date(), 1, 40.0, 50_000.0).await.unwrap();
            assert!(matches!(
                registry.register(ALICE, date(), 0, 40.0, 50_000.0).await,
                Err(EngineError::PoolNotActive { hour: 0, .. })
            ));
        }

        // Reopen: everything above must have been persisted
        let store = Arc::new(SqliteStore::open(&db_path).unwrap());
        let scheduler = scheduler(store.clone(), LeftoverPolicy::RollForward);
        let pool = store.get_reward_pool(date()).await.unwrap().unwrap();
        assert_eq!(pool.active_hour(), Some(1));
        assert!(pool.hour(1).unwrap().pool_amount > HOURLY);
        assert_eq!(pool.hour(1).unwrap().participants, 1);

        scheduler.on_hour_boundary(date(), 1).await.unwrap();

        let claims = ClaimLedger::new(store.clone());
        let alice_expected: f64 = claims
            .unclaimed(ALICE)
            .await
            .unwrap()
            .iter()
            .map(|r| r.amount)
            .sum();
        let receipt = claims.claim(ALICE).await.unwrap();
        assert_eq!(receipt.records, 2);
        assert!((receipt.amount - alice_expected).abs() < 1e-12);

        let bob = claims.claim(BOB).await.unwrap();
        assert_eq!(bob.records, 1);
        assert!(matches!(claims.claim(BOB).await, Err(EngineError::NothingToClaim(_))));

        // Distribution never touches the reserve
        assert!((store.reserve_balance().await.unwrap() - 120.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_day_never_pays_more_than_distributable() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let scheduler = scheduler(store.clone(), LeftoverPolicy::RollForward);
        let registry = ParticipationRegistry::new(store.clone());

        scheduler.on_daily_boundary(date(), 0).await.unwrap();
        for hour in 0..24u8 {
            if hour % 3 == 0 {
                registry.register(ALICE, date(), hour, 50.0, 20_000.0).await.unwrap();
                registry.register(BOB, date(), hour, 5.0, 0.0).await.unwrap();
            }
            scheduler.on_hour_boundary(date(), hour).await.unwrap();
        }

        let pool = store.get_reward_pool(date()).await.unwrap().unwrap();
        assert!(pool
            .hourly_pools
            .iter()
            .all(|h| h.status == PoolStatus::Distributed));
        assert_eq!(pool.active_hour(), None);

        let distributable = pool.total_daily_rewards - pool.reserve_amount;
        assert!(pool.total_distributed() <= distributable + 1e-9);
        for h in &pool.hourly_pools {
            assert!(h.distributed_amount <= h.pool_amount + 1e-9);
        }
        assert!((store.reserve_balance().await.unwrap() - 120.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_concurrent_distribute_pays_once() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        RewardPoolManager::new(store.clone())
            .create_daily_pool(date(), VOLUME, 12)
            .await
            .unwrap();
        ParticipationRegistry::new(store.clone())
            .register(CAROL, date(), 12, 30.0, 5_000.0)
            .await
            .unwrap();

        let calculator = Arc::new(PayoutCalculator::new(store.clone(), LeftoverPolicy::Retain));
        let mut handles = Vec::new();
        for _ in 0..5 {
            let calculator = calculator.clone();
            handles.push(tokio::spawn(async move { calculator.distribute(date(), 12).await }));
        }

        let mut paid = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => paid += 1,
                Err(EngineError::PoolNotActive { .. }) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(paid, 1);

        let receipt = ClaimLedger::new(store.clone()).claim(CAROL).await.unwrap();
        assert!((receipt.amount - HOURLY * 0.05).abs() < 1e-12);
    }
}
