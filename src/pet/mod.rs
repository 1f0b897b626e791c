//! Client-side pet simulation
//!
//! - `vitals` - PetVitals and the pure stat engine (decay, deltas, death)
//! - `cooldown` - per-action cooldown timers
//! - `interaction` - cooldown-gated interactions that award points
//! - `session` - the per-wallet tick loop with debounced persistence

pub mod cooldown;
pub mod interaction;
pub mod session;
pub mod vitals;

use serde::{Deserialize, Serialize};
use std::fmt;
use vitals::VitalsDelta;

pub use cooldown::CooldownState;
pub use interaction::{InteractionController, InteractionOutcome, InteractionRecord};
pub use session::{PetSession, SessionCommand};
pub use vitals::{PetVitals, Vital};

/// Care actions a player can take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Feed,
    Play,
    Clean,
    Heal,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Feed, Action::Play, Action::Clean, Action::Heal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Feed => "feed",
            Action::Play => "play",
            Action::Clean => "clean",
            Action::Heal => "heal",
        }
    }

    /// Fixed vitals change applied when the action succeeds
    pub fn delta(&self) -> VitalsDelta {
        match self {
            Action::Feed => VitalsDelta {
                food: 30.0,
                happiness: 10.0,
                ..Default::default()
            },
            Action::Play => VitalsDelta {
                happiness: 35.0,
                energy: -20.0,
                ..Default::default()
            },
            Action::Clean => VitalsDelta {
                cleanliness: 40.0,
                happiness: 5.0,
                ..Default::default()
            },
            Action::Heal => VitalsDelta {
                health: 50.0,
                energy: 20.0,
                happiness: -5.0,
                ..Default::default()
            },
        }
    }

    /// Base points fed into the ledger formula for this interaction
    pub fn base_points(&self) -> f64 {
        match self {
            Action::Feed => 5.0,
            Action::Play => 8.0,
            Action::Clean => 6.0,
            Action::Heal => 10.0,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "feed" => Ok(Action::Feed),
            "play" => Ok(Action::Play),
            "clean" => Ok(Action::Clean),
            "heal" => Ok(Action::Heal),
            other => Err(format!("unknown action: {}", other)),
        }
    }
}
