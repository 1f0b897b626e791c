use super::Action;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Shortest cooldown any action may have, whatever the parameters say
pub const MIN_COOLDOWN_MS: u64 = 5_000;

/// Longest cooldown any action may have
pub const MAX_COOLDOWN_MS: u64 = 30_000;

/// Remaining cooldown per action, in milliseconds
///
/// An action is `Ready` when it has no entry (or a zero entry) and
/// `OnCooldown` otherwise. The session decrements all timers on a fixed tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CooldownState {
    remaining: HashMap<Action, u64>,
}

impl CooldownState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remaining_ms(&self, action: Action) -> u64 {
        self.remaining.get(&action).copied().unwrap_or(0)
    }

    pub fn is_ready(&self, action: Action) -> bool {
        self.remaining_ms(action) == 0
    }

    /// Start a cooldown, clamping the duration to `[5s, 30s]`.
    pub fn start(&mut self, action: Action, duration_ms: u64) {
        let duration = duration_ms.clamp(MIN_COOLDOWN_MS, MAX_COOLDOWN_MS);
        self.remaining.insert(action, duration);
    }

    /// Decrement every running timer, dropping the ones that expire.
    pub fn tick(&mut self, elapsed_ms: u64) {
        self.remaining.retain(|_, remaining| {
            *remaining = remaining.saturating_sub(elapsed_ms);
            *remaining > 0
        });
    }

    pub fn active_count(&self) -> usize {
        self.remaining.len()
    }
}
