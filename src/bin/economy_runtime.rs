//! Economy Runtime - reward pool scheduler
//!
//! - Opens the SQLite database (schema applied on open)
//! - Creates today's pool and catches up missed hours
//! - Fires daily/hourly pool triggers until CTRL+C
//!
//! Usage:
//!   cargo run --release --bin economy_runtime
//!
//! Environment variables:
//!   GOCHI_DB_PATH - SQLite database path (default: data/gochi.db)
//!   VOLUME_URL - Daily volume endpoint (default: unset)
//!   DAILY_VOLUME_FALLBACK - Volume when VOLUME_URL is unset (default: 0)
//!   SCHEDULER_TICK_MS - Clock poll interval (default: 30000)
//!   LEFTOVER_POLICY - roll_forward | retain (default: roll_forward)

use dotenv::dotenv;
use gochi::config::EngineConfig;
use gochi::rewards::{
    scheduler_task, EconomyScheduler, FixedVolumeSource, HttpVolumeSource, PayoutCalculator,
    RewardPoolManager, VolumeSource,
};
use gochi::store::{PersistenceStore, SqliteStore};
use log::{error, info};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("🚀 Economy Runtime");

    let config = EngineConfig::from_env();
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Scheduler tick: {}ms", config.scheduler_tick_ms);
    info!("   └─ Leftover policy: {:?}", config.leftover_policy);

    info!("🔧 Initializing database...");
    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    info!(
        "✅ Database initialized (reserve fund: {:.4})",
        store.reserve_balance().await?
    );

    let volume: Arc<dyn VolumeSource> = match &config.volume_url {
        Some(url) => {
            info!("📡 Volume source: {}", url);
            Arc::new(HttpVolumeSource::new(url.clone(), config.params_timeout())?)
        }
        None => {
            info!("📌 Volume source: fixed {:.4}", config.daily_volume_fallback);
            Arc::new(FixedVolumeSource(config.daily_volume_fallback))
        }
    };

    let scheduler = Arc::new(EconomyScheduler::new(
        RewardPoolManager::new(store.clone()),
        PayoutCalculator::new(store.clone(), config.leftover_policy),
        volume,
    ));

    let tick_ms = config.scheduler_tick_ms;
    let handle = tokio::spawn(scheduler_task(scheduler, tick_ms));
    info!("✅ Scheduler task spawned");
    info!("🔄 Press CTRL+C to shutdown gracefully");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("⚠️  Received CTRL+C, shutting down...");
        }
        Err(err) => {
            error!("❌ Failed to listen for CTRL+C: {}", err);
        }
    }

    handle.abort();
    info!("✅ Economy runtime stopped");
    Ok(())
}
