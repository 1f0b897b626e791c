//! Pet vitals and the stat engine
//!
//! All functions here are pure: they take a vitals snapshot and return the
//! next one. Callers decide when to persist.

use crate::params::DecayRates;
use serde::{Deserialize, Serialize};

/// Lower bound for every vital
pub const VITAL_MIN: f64 = 0.0;

/// Upper bound for every vital
pub const VITAL_MAX: f64 = 100.0;

/// Starting value for a freshly adopted (or revived) pet
pub const VITAL_START: f64 = 80.0;

/// The five bounded pet attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vital {
    Food,
    Happiness,
    Cleanliness,
    Energy,
    Health,
}

impl Vital {
    pub const ALL: [Vital; 5] = [
        Vital::Food,
        Vital::Happiness,
        Vital::Cleanliness,
        Vital::Energy,
        Vital::Health,
    ];
}

fn clamp_vital(value: f64) -> f64 {
    if value.is_nan() {
        return VITAL_MIN;
    }
    value.clamp(VITAL_MIN, VITAL_MAX)
}

/// Pet vitals snapshot
///
/// Fields are private so every write goes through a clamping setter.
/// Deserialised snapshots are clamped the same way.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawVitals")]
pub struct PetVitals {
    food: f64,
    happiness: f64,
    cleanliness: f64,
    energy: f64,
    health: f64,
    is_dead: bool,
}

/// Wire shape of [`PetVitals`] before clamping
#[derive(Deserialize)]
struct RawVitals {
    food: f64,
    happiness: f64,
    cleanliness: f64,
    energy: f64,
    health: f64,
    #[serde(default)]
    is_dead: bool,
}

impl From<RawVitals> for PetVitals {
    fn from(raw: RawVitals) -> Self {
        PetVitals::from_parts(
            raw.food,
            raw.happiness,
            raw.cleanliness,
            raw.energy,
            raw.health,
            raw.is_dead,
        )
    }
}

impl Default for PetVitals {
    fn default() -> Self {
        Self {
            food: VITAL_START,
            happiness: VITAL_START,
            cleanliness: VITAL_START,
            energy: VITAL_START,
            health: VITAL_START,
            is_dead: false,
        }
    }
}

impl PetVitals {
    /// Build a snapshot from raw values, clamping each to `[0, 100]`.
    pub fn from_parts(
        food: f64,
        happiness: f64,
        cleanliness: f64,
        energy: f64,
        health: f64,
        is_dead: bool,
    ) -> Self {
        Self {
            food: clamp_vital(food),
            happiness: clamp_vital(happiness),
            cleanliness: clamp_vital(cleanliness),
            energy: clamp_vital(energy),
            health: clamp_vital(health),
            is_dead,
        }
    }

    pub fn food(&self) -> f64 {
        self.food
    }

    pub fn happiness(&self) -> f64 {
        self.happiness
    }

    pub fn cleanliness(&self) -> f64 {
        self.cleanliness
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn health(&self) -> f64 {
        self.health
    }

    pub fn is_dead(&self) -> bool {
        self.is_dead
    }

    pub fn get(&self, vital: Vital) -> f64 {
        match vital {
            Vital::Food => self.food,
            Vital::Happiness => self.happiness,
            Vital::Cleanliness => self.cleanliness,
            Vital::Energy => self.energy,
            Vital::Health => self.health,
        }
    }

    pub fn set(&mut self, vital: Vital, value: f64) {
        let value = clamp_vital(value);
        match vital {
            Vital::Food => self.food = value,
            Vital::Happiness => self.happiness = value,
            Vital::Cleanliness => self.cleanliness = value,
            Vital::Energy => self.energy = value,
            Vital::Health => self.health = value,
        }
    }

    /// Largest absolute per-field difference between two snapshots.
    pub fn max_difference(&self, other: &PetVitals) -> f64 {
        Vital::ALL
            .iter()
            .map(|v| (self.get(*v) - other.get(*v)).abs())
            .fold(0.0, f64::max)
    }
}

/// Signed change to each vital
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VitalsDelta {
    pub food: f64,
    pub happiness: f64,
    pub cleanliness: f64,
    pub energy: f64,
    pub health: f64,
}

/// Weighted health from the other four vitals.
///
/// `0.4·food + 0.2·(happiness + cleanliness + energy)`, minus an overfeeding
/// penalty of `0.1·(food − 100)` when `food` exceeds 100. Food above 100 only
/// exists transiently, before a delta is clamped; see [`apply_interaction`].
pub fn compute_health(food: f64, happiness: f64, cleanliness: f64, energy: f64) -> f64 {
    let base = 0.4 * food.min(VITAL_MAX)
        + 0.2 * happiness.clamp(VITAL_MIN, VITAL_MAX)
        + 0.2 * cleanliness.clamp(VITAL_MIN, VITAL_MAX)
        + 0.2 * energy.clamp(VITAL_MIN, VITAL_MAX);
    let overfeed_penalty = if food > VITAL_MAX {
        0.1 * (food - VITAL_MAX)
    } else {
        0.0
    };
    clamp_vital(base - overfeed_penalty)
}

/// Death rule: health or food at zero.
pub fn check_death(vitals: &PetVitals) -> bool {
    vitals.health <= VITAL_MIN || vitals.food <= VITAL_MIN
}

/// Latch the death flag. Once dead, only [`revive`] clears it.
fn settle_death(mut vitals: PetVitals) -> PetVitals {
    if !vitals.is_dead && check_death(&vitals) {
        log::info!(
            "💀 Pet died (food={:.1}, health={:.1})",
            vitals.food,
            vitals.health
        );
        vitals.is_dead = true;
    }
    vitals
}

/// Apply a signed delta to each field, clamping to `[0, 100]`.
pub fn apply_delta(vitals: &PetVitals, delta: &VitalsDelta) -> PetVitals {
    let next = PetVitals::from_parts(
        vitals.food + delta.food,
        vitals.happiness + delta.happiness,
        vitals.cleanliness + delta.cleanliness,
        vitals.energy + delta.energy,
        vitals.health + delta.health,
        vitals.is_dead,
    );
    settle_death(next)
}

/// Apply an interaction delta and recompute health.
///
/// Health is derived from the other four vitals (using the unclamped food so
/// overfeeding is penalised) and the delta's own `health` term is added on
/// top, so `heal` still restores health directly.
pub fn apply_interaction(vitals: &PetVitals, delta: &VitalsDelta) -> PetVitals {
    let raw_food = vitals.food + delta.food;
    let raw_happiness = vitals.happiness + delta.happiness;
    let raw_cleanliness = vitals.cleanliness + delta.cleanliness;
    let raw_energy = vitals.energy + delta.energy;

    let health = compute_health(raw_food, raw_happiness, raw_cleanliness, raw_energy) + delta.health;

    let next = PetVitals::from_parts(
        raw_food,
        raw_happiness,
        raw_cleanliness,
        raw_energy,
        health,
        vitals.is_dead,
    );
    settle_death(next)
}

/// Subtract `rate · (minutes / 60)` from every field, floored at zero.
///
/// Zero, negative or non-finite elapsed time is a no-op.
pub fn tick_decay(vitals: &PetVitals, rates: &DecayRates, minutes_elapsed: f64) -> PetVitals {
    if !minutes_elapsed.is_finite() || minutes_elapsed <= 0.0 {
        return *vitals;
    }
    let hours = minutes_elapsed / 60.0;
    let delta = VitalsDelta {
        food: -rates.food * hours,
        happiness: -rates.happiness * hours,
        cleanliness: -rates.cleanliness * hours,
        energy: -rates.energy * hours,
        health: -rates.health * hours,
    };
    apply_delta(vitals, &delta)
}

/// Explicit reset: fresh vitals, death flag cleared.
pub fn revive() -> PetVitals {
    log::info!("✨ Pet revived");
    PetVitals::default()
}
