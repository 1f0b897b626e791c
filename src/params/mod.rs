//! Tunable simulation parameters
//!
//! Decay rates, cooldown durations and the global point multiplier. Values
//! may come from an external advisory service, but every field is clamped to
//! a hard-coded `[min, max]` bound before it reaches a caller.
//!
//! ## Bounds
//!
//! | Field | Default | Min | Max |
//! |---|---|---|---|
//! | decay.food | 0.5/h | 0.05 | 5.0 |
//! | decay.happiness | 0.4/h | 0.05 | 5.0 |
//! | decay.cleanliness | 0.3/h | 0.05 | 5.0 |
//! | decay.energy | 0.4/h | 0.05 | 5.0 |
//! | decay.health | 0.2/h | 0.01 | 2.0 |
//! | cooldown.* | 10/15/20/30s | 5s | 30s |
//! | point_multiplier | 1.0 | 0.5 | 2.0 |

pub mod http_source;
pub mod provider;

use crate::pet::Action;
use crate::pet::PetVitals;
use serde::{Deserialize, Serialize};

pub use provider::{ParameterProvider, ParameterSource};

/// Inclusive bound for a single numeric parameter
#[derive(Debug, Clone, Copy)]
pub struct Bound {
    pub min: f64,
    pub max: f64,
}

impl Bound {
    const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamp `value`; non-finite values are replaced by `fallback` first.
    pub fn apply(&self, value: f64, fallback: f64) -> f64 {
        let value = if value.is_finite() { value } else { fallback };
        value.clamp(self.min, self.max)
    }
}

pub const DECAY_BOUND: Bound = Bound::new(0.05, 5.0);
pub const HEALTH_DECAY_BOUND: Bound = Bound::new(0.01, 2.0);
pub const COOLDOWN_BOUND_MS: Bound = Bound::new(5_000.0, 30_000.0);
pub const POINT_MULTIPLIER_BOUND: Bound = Bound::new(0.5, 2.0);

/// Per-hour decay rate for each vital
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayRates {
    pub food: f64,
    pub happiness: f64,
    pub cleanliness: f64,
    pub energy: f64,
    pub health: f64,
}

impl Default for DecayRates {
    fn default() -> Self {
        Self {
            food: 0.5,
            happiness: 0.4,
            cleanliness: 0.3,
            energy: 0.4,
            health: 0.2,
        }
    }
}

/// Cooldown duration per action, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownDurations {
    pub feed: f64,
    pub play: f64,
    pub clean: f64,
    pub heal: f64,
}

impl Default for CooldownDurations {
    fn default() -> Self {
        Self {
            feed: 10_000.0,
            play: 15_000.0,
            clean: 20_000.0,
            heal: 30_000.0,
        }
    }
}

impl CooldownDurations {
    pub fn for_action(&self, action: Action) -> u64 {
        let ms = match action {
            Action::Feed => self.feed,
            Action::Play => self.play,
            Action::Clean => self.clean,
            Action::Heal => self.heal,
        };
        ms.round() as u64
    }
}

/// Everything the simulation lets an external source tune
///
/// Deserialises from partial JSON: missing fields take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TunableParameters {
    pub decay_rates: DecayRates,
    pub cooldowns: CooldownDurations,
    pub point_multiplier: f64,
}

impl Default for TunableParameters {
    fn default() -> Self {
        Self {
            decay_rates: DecayRates::default(),
            cooldowns: CooldownDurations::default(),
            point_multiplier: 1.0,
        }
    }
}

impl TunableParameters {
    /// Clamp every field to its bound. Non-finite values become the default.
    pub fn clamped(&self) -> Self {
        let d = TunableParameters::default();
        Self {
            decay_rates: DecayRates {
                food: DECAY_BOUND.apply(self.decay_rates.food, d.decay_rates.food),
                happiness: DECAY_BOUND.apply(self.decay_rates.happiness, d.decay_rates.happiness),
                cleanliness: DECAY_BOUND
                    .apply(self.decay_rates.cleanliness, d.decay_rates.cleanliness),
                energy: DECAY_BOUND.apply(self.decay_rates.energy, d.decay_rates.energy),
                health: HEALTH_DECAY_BOUND.apply(self.decay_rates.health, d.decay_rates.health),
            },
            cooldowns: CooldownDurations {
                feed: COOLDOWN_BOUND_MS.apply(self.cooldowns.feed, d.cooldowns.feed),
                play: COOLDOWN_BOUND_MS.apply(self.cooldowns.play, d.cooldowns.play),
                clean: COOLDOWN_BOUND_MS.apply(self.cooldowns.clean, d.cooldowns.clean),
                heal: COOLDOWN_BOUND_MS.apply(self.cooldowns.heal, d.cooldowns.heal),
            },
            point_multiplier: POINT_MULTIPLIER_BOUND
                .apply(self.point_multiplier, d.point_multiplier),
        }
    }
}

/// What the advisory source gets to see about the pet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetContext {
    pub wallet: String,
    pub vitals: PetVitals,
    pub consecutive_days: u32,
    pub interactions_last_hour: u32,
    pub hour_of_day: u8,
}
