//! Debounced persistence gate
//!
//! A write goes through only when something changed by more than the
//! threshold AND at least `min_interval` has passed since the last write.
//! Death state changes bypass the threshold but not the rate limit.

use crate::pet::PetVitals;
use crate::points::PointsAccount;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct SavedSnapshot {
    vitals: PetVitals,
    points_total: f64,
    at: Instant,
}

#[derive(Debug, Clone)]
pub struct SaveDebouncer {
    change_threshold: f64,
    min_interval: Duration,
    last_saved: Option<SavedSnapshot>,
}

impl SaveDebouncer {
    pub fn new(change_threshold: f64, min_interval: Duration) -> Self {
        Self {
            change_threshold,
            min_interval,
            last_saved: None,
        }
    }

    /// Whether the current state warrants a write at `now`.
    pub fn should_save(&self, vitals: &PetVitals, account: &PointsAccount, now: Instant) -> bool {
        let Some(last) = &self.last_saved else {
            return true;
        };

        if now.saturating_duration_since(last.at) < self.min_interval {
            return false;
        }

        vitals.is_dead() != last.vitals.is_dead()
            || vitals.max_difference(&last.vitals) > self.change_threshold
            || (account.total - last.points_total).abs() > self.change_threshold
    }

    /// Whether anything at all differs from the last write (used on shutdown).
    pub fn is_dirty(&self, vitals: &PetVitals, account: &PointsAccount) -> bool {
        match &self.last_saved {
            None => true,
            Some(last) => last.vitals != *vitals || last.points_total != account.total,
        }
    }

    pub fn record_saved(&mut self, vitals: &PetVitals, account: &PointsAccount, now: Instant) {
        self.last_saved = Some(SavedSnapshot {
            vitals: *vitals,
            points_total: account.total,
            at: now,
        });
    }
}
