//! Pet Simulator - headless client session
//!
//! Loads (or hatches) a pet for one wallet and drives it with random care
//! actions, logging every outcome, until CTRL+C.
//!
//! Usage:
//!   cargo run --release --bin pet_sim -- <WALLET>
//!
//! Environment variables:
//!   GOCHI_DB_PATH - SQLite database path (default: data/gochi.db)
//!   PARAMS_URL - Advisory parameter endpoint (default: unset, defaults only)
//!   PARAMS_TIMEOUT_MS - Advisory fetch timeout (default: 3000)
//!   PET_SIM_INTERVAL_MS - Delay between actions (default: 5000)

use dotenv::dotenv;
use gochi::config::EngineConfig;
use gochi::params::http_source::HttpParameterSource;
use gochi::params::ParameterProvider;
use gochi::pet::{Action, InteractionRecord, PetSession, SessionCommand};
use gochi::points::SaveDebouncer;
use gochi::store::SqliteStore;
use log::{error, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use std::env;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, Duration};

const DEFAULT_WALLET: &str = "GochiSimWa11et1111111111111111111111111111";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let wallet = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_WALLET.to_string());
    gochi::error::validate_wallet(&wallet)?;

    let config = EngineConfig::from_env();
    let step_ms: u64 = env::var("PET_SIM_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5_000);

    info!("🐣 Pet Simulator");
    info!("   ├─ Wallet: {}", wallet);
    info!("   ├─ Database: {}", config.db_path);
    info!("   └─ Action interval: {}ms", step_ms);

    let store = Arc::new(SqliteStore::open(&config.db_path)?);

    let provider = match &config.params_url {
        Some(url) => {
            info!("📡 Parameter source: {}", url);
            let source = HttpParameterSource::new(url.clone(), config.params_timeout())?;
            ParameterProvider::new(Arc::new(source), config.params_timeout())
        }
        None => ParameterProvider::defaults_only(),
    };

    let (events_tx, mut events_rx) = mpsc::channel::<InteractionRecord>(64);
    let session = PetSession::load(
        wallet.clone(),
        store,
        provider,
        SaveDebouncer::new(config.persist_change_threshold, config.persist_min_interval()),
    )
    .await?
    .with_events(events_tx);

    let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCommand>(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let session_handle = tokio::spawn(session.run(cmd_rx, shutdown_rx));

    tokio::spawn(async move {
        while let Some(record) = events_rx.recv().await {
            info!(
                "📜 {} → +{:.2}pts (health={:.1})",
                record.action,
                record.points_granted,
                record.vitals.health()
            );
        }
    });

    let driver_tx = cmd_tx.clone();
    let driver = tokio::spawn(async move {
        let mut timer = interval(Duration::from_millis(step_ms.max(1)));
        loop {
            timer.tick().await;
            let (action, ai_bonus) = {
                let mut rng = rand::thread_rng();
                let action = *Action::ALL.choose(&mut rng).unwrap_or(&Action::Feed);
                let ai_bonus = if rng.gen_bool(0.1) { rng.gen_range(0.0..5.0) } else { 0.0 };
                (action, ai_bonus)
            };

            let (reply_tx, reply_rx) = oneshot::channel();
            let command = SessionCommand::Interact {
                action,
                ai_bonus,
                reply: reply_tx,
            };
            if driver_tx.send(command).await.is_err() {
                break;
            }
            match reply_rx.await {
                Ok(Ok(outcome)) => info!(
                    "🐾 {} ok: total={:.2} today={:.2}/{:.0}",
                    action,
                    outcome.account.total,
                    outcome.account.daily_earned,
                    outcome.account.daily_cap
                ),
                Ok(Err(gochi::EngineError::PetDead)) => {
                    warn!("💀 Pet is dead, reviving");
                    let (revive_tx, revive_rx) = oneshot::channel();
                    if driver_tx
                        .send(SessionCommand::Revive { reply: revive_tx })
                        .await
                        .is_err()
                    {
                        break;
                    }
                    let _ = revive_rx.await;
                }
                Ok(Err(e)) => info!("⏳ {} refused: {}", action, e),
                Err(_) => break,
            }
        }
    });

    info!("🔄 Press CTRL+C to stop");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
        Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
    }

    driver.abort();
    let _ = shutdown_tx.send(true);
    drop(cmd_tx);

    match session_handle.await {
        Ok(snapshot) => info!(
            "✅ Session saved: points={:.2} streak={} health={:.1}",
            snapshot.account.total,
            snapshot.account.consecutive_days,
            snapshot.vitals.health()
        ),
        Err(e) => error!("❌ Session task failed: {}", e),
    }
    Ok(())
}
