//! Per-wallet client session
//!
//! One task owns the pet's vitals, cooldowns and points account. Every
//! mutation happens inside `run`, so there is never more than one writer.
//!
//! ```text
//! every 1s   cooldown tick
//! every 60s  day rollover, decay, passive points, parameter refresh
//! command    interact / revive / snapshot / shutdown
//! ```
//!
//! Writes to the store go through the debouncer and run on their own task,
//! retried with backoff, so a slow or failing store never holds up ticks or
//! commands. At most one write is in flight; a state that could not be saved
//! stays dirty and is picked up by the next save. The final flush on shutdown
//! waits for the in-flight write and then writes inline.

use super::cooldown::CooldownState;
use super::interaction::{InteractionController, InteractionOutcome, InteractionRecord};
use super::vitals::{revive, tick_decay, PetVitals};
use super::Action;
use crate::error::Result;
use crate::params::{ParameterProvider, PetContext};
use crate::points::{award_passive, roll_day, PointsAccount, SaveDebouncer};
use crate::retry::{with_backoff, ExponentialBackoff};
use crate::store::{PersistenceStore, PetState, StorageError};
use chrono::{Timelike, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

const COOLDOWN_TICK: Duration = Duration::from_secs(1);
const DECAY_TICK: Duration = Duration::from_secs(60);
const ONE_HOUR: Duration = Duration::from_secs(3_600);

pub enum SessionCommand {
    Interact {
        action: Action,
        ai_bonus: f64,
        reply: oneshot::Sender<Result<InteractionOutcome>>,
    },
    Revive {
        reply: oneshot::Sender<PetVitals>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Shutdown,
}

/// One write of a session's state
struct SaveJob {
    wallet: String,
    state: PetState,
    account: PointsAccount,
    started: Instant,
}

/// Result of a [`SaveJob`], reported back to the session loop
struct SaveDone {
    vitals: PetVitals,
    account: PointsAccount,
    started: Instant,
    result: std::result::Result<(), StorageError>,
}

impl SaveJob {
    async fn write(self, store: Arc<dyn PersistenceStore>, backoff: ExponentialBackoff) -> SaveDone {
        let SaveJob {
            wallet,
            state,
            account,
            started,
        } = self;
        let result = with_backoff("save pet state", backoff, || {
            let store = store.clone();
            let wallet = wallet.clone();
            let state = state.clone();
            let account = account.clone();
            async move {
                store.save_pet_state(&wallet, &state).await?;
                store.save_points_account(&wallet, &account).await
            }
        })
        .await;
        SaveDone {
            vitals: state.vitals,
            account,
            started,
            result,
        }
    }
}

/// Point-in-time copy of a session's state
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub vitals: PetVitals,
    pub account: PointsAccount,
    pub cooldowns: CooldownState,
}

pub struct PetSession {
    wallet: String,
    vitals: PetVitals,
    account: PointsAccount,
    controller: InteractionController,
    provider: ParameterProvider,
    store: Arc<dyn PersistenceStore>,
    debouncer: SaveDebouncer,
    save_backoff: ExponentialBackoff,
    saving: bool,
    recent_interactions: VecDeque<Instant>,
}

impl PetSession {
    /// Load `wallet` from the store, or start a fresh pet.
    ///
    /// Time spent offline since the last save is applied as decay and
    /// cooldown progress before the session starts.
    pub async fn load(
        wallet: impl Into<String>,
        store: Arc<dyn PersistenceStore>,
        provider: ParameterProvider,
        debouncer: SaveDebouncer,
    ) -> Result<Self> {
        let wallet = wallet.into();
        let saved = store.get_pet_state(&wallet).await?;
        let account = store.get_points_account(&wallet).await?.unwrap_or_default();

        let mut session = Self {
            controller: InteractionController::new(wallet.clone(), Default::default()),
            wallet,
            vitals: PetVitals::default(),
            account,
            provider,
            store,
            debouncer,
            save_backoff: ExponentialBackoff::default(),
            saving: false,
            recent_interactions: VecDeque::new(),
        };
        session.refresh_params().await;

        match saved {
            Some(state) => {
                let offline_secs = (Utc::now().timestamp() - state.updated_at).max(0);
                let vitals = tick_decay(
                    &state.vitals,
                    &session.controller.params().decay_rates,
                    offline_secs as f64 / 60.0,
                );
                let mut cooldowns = state.cooldowns;
                cooldowns.tick((offline_secs as u64).saturating_mul(1_000));

                log::info!(
                    "📂 Loaded pet for {} ({}s offline, health={:.1}, points={:.2})",
                    session.wallet,
                    offline_secs,
                    vitals.health(),
                    session.account.total
                );
                session.vitals = vitals;
                session.controller = InteractionController::new(
                    session.wallet.clone(),
                    session.controller.params().clone(),
                )
                .with_cooldowns(cooldowns);
            }
            None => {
                log::info!("🥚 New pet for {}", session.wallet);
            }
        }

        Ok(session)
    }

    pub fn with_events(mut self, events_tx: mpsc::Sender<InteractionRecord>) -> Self {
        self.controller = self.controller.with_events(events_tx);
        self
    }

    pub fn with_save_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.save_backoff = backoff;
        self
    }

    pub fn wallet(&self) -> &str {
        &self.wallet
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            vitals: self.vitals,
            account: self.account.clone(),
            cooldowns: self.controller.cooldowns().clone(),
        }
    }

    /// Attempt an interaction and apply its outcome to the session.
    pub fn interact(&mut self, action: Action, ai_bonus: f64) -> Result<InteractionOutcome> {
        let now = Utc::now();
        let account = roll_day(&self.account, now.date_naive());
        let outcome = self
            .controller
            .attempt(action, &self.vitals, &account, ai_bonus, now.timestamp())?;

        self.vitals = outcome.vitals;
        self.account = outcome.account.clone();
        self.recent_interactions.push_back(Instant::now());
        Ok(outcome)
    }

    pub fn revive(&mut self) -> PetVitals {
        self.vitals = revive();
        self.vitals
    }

    /// Advance cooldown timers by `elapsed`.
    pub fn on_cooldown_tick(&mut self, elapsed: Duration) {
        self.controller.tick(elapsed.as_millis() as u64);
    }

    /// Minute-scale work: day rollover, decay, passive points, parameters.
    pub async fn on_decay_tick(&mut self, minutes: f64) {
        let today = Utc::now().date_naive();
        self.account = roll_day(&self.account, today);

        let params = self.controller.params().clone();
        let was_dead = self.vitals.is_dead();
        self.vitals = tick_decay(&self.vitals, &params.decay_rates, minutes);

        let (account, granted) =
            award_passive(&self.account, &self.vitals, minutes, params.point_multiplier);
        self.account = account;

        log::debug!(
            "⏱️  {} decayed {:.1}min: food={:.1} health={:.1} +{:.3}pts passive",
            self.wallet,
            minutes,
            self.vitals.food(),
            self.vitals.health(),
            granted
        );
        if self.vitals.is_dead() && !was_dead {
            log::warn!("💀 {}'s pet died", self.wallet);
        }

        self.refresh_params().await;
    }

    async fn refresh_params(&mut self) {
        let now = Instant::now();
        while let Some(front) = self.recent_interactions.front() {
            if now.saturating_duration_since(*front) > ONE_HOUR {
                self.recent_interactions.pop_front();
            } else {
                break;
            }
        }

        let context = PetContext {
            wallet: self.wallet.clone(),
            vitals: self.vitals,
            consecutive_days: self.account.consecutive_days,
            interactions_last_hour: self.recent_interactions.len() as u32,
            hour_of_day: Utc::now().hour() as u8,
        };
        let params = self.provider.resolve(&context).await;
        self.controller.set_params(params);
    }

    /// The write the debouncer lets through, if any. `force` skips the rate
    /// limit but still skips the write when nothing changed.
    fn save_job(&self, force: bool) -> Option<SaveJob> {
        let now = Instant::now();
        let wanted = if force {
            self.debouncer.is_dirty(&self.vitals, &self.account)
        } else {
            self.debouncer.should_save(&self.vitals, &self.account, now)
        };
        if !wanted {
            log::debug!("Save suppressed for {}", self.wallet);
            return None;
        }
        Some(SaveJob {
            wallet: self.wallet.clone(),
            state: PetState {
                vitals: self.vitals,
                cooldowns: self.controller.cooldowns().clone(),
                updated_at: Utc::now().timestamp(),
            },
            account: self.account.clone(),
            started: now,
        })
    }

    /// Start a background write if one is due and none is in flight.
    fn persist(&mut self, saved_tx: &mpsc::Sender<SaveDone>) {
        if self.saving {
            log::debug!("Save for {} still in flight", self.wallet);
            return;
        }
        let Some(job) = self.save_job(false) else {
            return;
        };
        self.saving = true;
        let store = self.store.clone();
        let backoff = self.save_backoff.clone();
        let saved_tx = saved_tx.clone();
        tokio::spawn(async move {
            let done = job.write(store, backoff).await;
            let _ = saved_tx.send(done).await;
        });
    }

    fn on_saved(&mut self, done: SaveDone) {
        self.saving = false;
        match done.result {
            Ok(()) => {
                self.debouncer.record_saved(&done.vitals, &done.account, done.started);
                log::debug!("💾 Saved state for {}", self.wallet);
            }
            Err(e) => {
                log::error!("❌ Failed to save state for {}: {}", self.wallet, e);
            }
        }
    }

    /// Drive the session until a `Shutdown` command, the shutdown signal, or
    /// the command channel closing. Pending changes are flushed before return.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) -> SessionSnapshot {
        log::info!("▶️  Session started for {}", self.wallet);

        let start = Instant::now();
        let mut cooldown_timer = interval_at(start + COOLDOWN_TICK, COOLDOWN_TICK);
        cooldown_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut decay_timer = interval_at(start + DECAY_TICK, DECAY_TICK);
        decay_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_cooldown = start;
        let mut last_decay = start;
        let (saved_tx, mut saved_rx) = mpsc::channel(1);

        loop {
            tokio::select! {
                tick = cooldown_timer.tick() => {
                    self.on_cooldown_tick(tick.saturating_duration_since(last_cooldown));
                    last_cooldown = tick;
                }
                tick = decay_timer.tick() => {
                    let minutes = tick.saturating_duration_since(last_decay).as_secs_f64() / 60.0;
                    last_decay = tick;
                    self.on_decay_tick(minutes).await;
                    self.persist(&saved_tx);
                }
                command = commands.recv() => {
                    match command {
                        Some(SessionCommand::Interact { action, ai_bonus, reply }) => {
                            let result = self.interact(action, ai_bonus);
                            if let Err(e) = &result {
                                log::debug!("🚫 {} {} refused: {}", self.wallet, action, e);
                            }
                            let _ = reply.send(result);
                            self.persist(&saved_tx);
                        }
                        Some(SessionCommand::Revive { reply }) => {
                            let _ = reply.send(self.revive());
                            self.persist(&saved_tx);
                        }
                        Some(SessionCommand::Snapshot { reply }) => {
                            let _ = reply.send(self.snapshot());
                        }
                        Some(SessionCommand::Shutdown) | None => break,
                    }
                }
                Some(done) = saved_rx.recv() => self.on_saved(done),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if self.saving {
            if let Some(done) = saved_rx.recv().await {
                self.on_saved(done);
            }
        }
        if let Some(job) = self.save_job(true) {
            let done = job.write(self.store.clone(), self.save_backoff.clone()).await;
            self.on_saved(done);
        }
        log::info!(
            "⏹️  Session stopped for {} (points={:.2})",
            self.wallet,
            self.account.total
        );
        self.snapshot()
    }
}
