//! Cooldown-gated interactions
//!
//! ```text
//! Ready ──attempt()──▶ OnCooldown ──tick() to 0──▶ Ready
//! ```
//!
//! A successful attempt starts the cooldown, applies the action's vitals
//! delta, and awards points for it. A refused attempt mutates nothing.

use super::cooldown::CooldownState;
use super::vitals::{apply_interaction, PetVitals};
use super::Action;
use crate::error::{EngineError, Result};
use crate::params::TunableParameters;
use crate::points::{award, PointsAccount};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Advisory record of a completed interaction (UI / activity log)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub wallet: String,
    pub action: Action,
    pub vitals: PetVitals,
    pub points_granted: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct InteractionOutcome {
    pub vitals: PetVitals,
    pub account: PointsAccount,
    pub points_granted: f64,
}

pub struct InteractionController {
    wallet: String,
    cooldowns: CooldownState,
    params: TunableParameters,
    /// Optional activity feed. Records are dropped when the channel is full.
    events_tx: Option<mpsc::Sender<InteractionRecord>>,
}

impl InteractionController {
    pub fn new(wallet: impl Into<String>, params: TunableParameters) -> Self {
        Self {
            wallet: wallet.into(),
            cooldowns: CooldownState::new(),
            params,
            events_tx: None,
        }
    }

    pub fn with_cooldowns(mut self, cooldowns: CooldownState) -> Self {
        self.cooldowns = cooldowns;
        self
    }

    pub fn with_events(mut self, events_tx: mpsc::Sender<InteractionRecord>) -> Self {
        self.events_tx = Some(events_tx);
        self
    }

    pub fn cooldowns(&self) -> &CooldownState {
        &self.cooldowns
    }

    pub fn params(&self) -> &TunableParameters {
        &self.params
    }

    pub fn set_params(&mut self, params: TunableParameters) {
        self.params = params;
    }

    /// Advance every cooldown timer.
    pub fn tick(&mut self, elapsed_ms: u64) {
        self.cooldowns.tick(elapsed_ms);
    }

    /// Try to perform `action`.
    ///
    /// Fails with `PetDead` when the pet is dead and `CooldownActive` while
    /// the action's timer is running; neither mutates anything.
    pub fn attempt(
        &mut self,
        action: Action,
        vitals: &PetVitals,
        account: &PointsAccount,
        ai_bonus: f64,
        timestamp: i64,
    ) -> Result<InteractionOutcome> {
        if vitals.is_dead() {
            return Err(EngineError::PetDead);
        }
        let remaining_ms = self.cooldowns.remaining_ms(action);
        if remaining_ms > 0 {
            return Err(EngineError::CooldownActive {
                action,
                remaining_ms,
            });
        }

        self.cooldowns
            .start(action, self.params.cooldowns.for_action(action));

        let next_vitals = apply_interaction(vitals, &action.delta());
        let (next_account, points_granted) = award(
            account,
            action.base_points(),
            &next_vitals,
            ai_bonus,
            self.params.point_multiplier,
        );

        log::debug!(
            "🐾 {} {}: food={:.1} happy={:.1} clean={:.1} energy={:.1} health={:.1} +{:.2}pts",
            self.wallet,
            action,
            next_vitals.food(),
            next_vitals.happiness(),
            next_vitals.cleanliness(),
            next_vitals.energy(),
            next_vitals.health(),
            points_granted
        );

        self.emit(InteractionRecord {
            wallet: self.wallet.clone(),
            action,
            vitals: next_vitals,
            points_granted,
            timestamp,
        });

        Ok(InteractionOutcome {
            vitals: next_vitals,
            account: next_account,
            points_granted,
        })
    }

    fn emit(&self, record: InteractionRecord) {
        if let Some(tx) = &self.events_tx {
            if let Err(e) = tx.try_send(record) {
                log::debug!("Interaction record dropped: {}", e);
            }
        }
    }
}
