//! Points accrual: quality × streak multipliers under a daily cap
//!
//! ```text
//! avg_vital   = mean(health, happiness, food, cleanliness)
//! quality     = clamp(avg_vital / 33.33, 0.5, 3.0)
//! streak      = clamp(1.0 + 0.05·consecutive_days, 1.0, 1.5)
//! raw         = (base · quality · streak + ai_bonus) · global_multiplier
//! daily_cap   = min(500, 200 + 20·consecutive_days)
//! granted     = max(0, min(raw, daily_cap − daily_earned))
//! ```
//!
//! The ledger never looks at the wall clock. Day boundaries are applied by
//! the caller through [`roll_day`].

use crate::pet::PetVitals;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const QUALITY_DIVISOR: f64 = 33.33;
pub const QUALITY_MIN: f64 = 0.5;
pub const QUALITY_MAX: f64 = 3.0;
pub const STREAK_STEP: f64 = 0.05;
pub const STREAK_MAX: f64 = 1.5;
pub const DAILY_CAP_BASE: f64 = 200.0;
pub const DAILY_CAP_STEP: f64 = 20.0;
pub const DAILY_CAP_MAX: f64 = 500.0;

/// Idle accrual baseline, prorated by elapsed minutes
pub const PASSIVE_POINTS_PER_HOUR: f64 = 10.0;

/// Per-wallet points balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsAccount {
    pub total: f64,
    pub daily_earned: f64,
    pub daily_cap: f64,
    pub consecutive_days: u32,
    /// Quality × streak multiplier applied by the most recent award
    pub multiplier: f64,
    /// Calendar day `daily_earned` belongs to
    pub last_active_date: Option<NaiveDate>,
}

impl Default for PointsAccount {
    fn default() -> Self {
        Self {
            total: 0.0,
            daily_earned: 0.0,
            daily_cap: daily_cap(0),
            consecutive_days: 0,
            multiplier: 1.0,
            last_active_date: None,
        }
    }
}

pub fn quality_multiplier(vitals: &PetVitals) -> f64 {
    let avg = (vitals.health() + vitals.happiness() + vitals.food() + vitals.cleanliness()) / 4.0;
    (avg / QUALITY_DIVISOR).clamp(QUALITY_MIN, QUALITY_MAX)
}

pub fn streak_multiplier(consecutive_days: u32) -> f64 {
    (1.0 + STREAK_STEP * consecutive_days as f64).clamp(1.0, STREAK_MAX)
}

pub fn daily_cap(consecutive_days: u32) -> f64 {
    (DAILY_CAP_BASE + DAILY_CAP_STEP * consecutive_days as f64).min(DAILY_CAP_MAX)
}

/// Award points for one activity.
///
/// Returns the updated account and the points actually granted. When nothing
/// is grantable the account comes back untouched.
pub fn award(
    account: &PointsAccount,
    base_points: f64,
    vitals: &PetVitals,
    ai_bonus: f64,
    global_multiplier: f64,
) -> (PointsAccount, f64) {
    let quality = quality_multiplier(vitals);
    let streak = streak_multiplier(account.consecutive_days);
    let raw = (base_points * quality * streak + ai_bonus) * global_multiplier;

    let cap = daily_cap(account.consecutive_days);
    let headroom = cap - account.daily_earned;
    let grantable = raw.min(headroom).max(0.0);

    if !grantable.is_finite() || grantable <= 0.0 {
        return (account.clone(), 0.0);
    }

    let mut next = account.clone();
    next.total += grantable;
    next.daily_earned += grantable;
    next.daily_cap = cap;
    next.multiplier = quality * streak;

    if grantable < raw {
        log::debug!(
            "🧢 Daily cap reached: granted {:.2} of {:.2} (cap {:.0})",
            grantable,
            raw,
            cap
        );
    }

    (next, grantable)
}

/// Idle accrual: the same formula with a base prorated from the hourly rate.
pub fn award_passive(
    account: &PointsAccount,
    vitals: &PetVitals,
    minutes_elapsed: f64,
    global_multiplier: f64,
) -> (PointsAccount, f64) {
    if !minutes_elapsed.is_finite() || minutes_elapsed <= 0.0 || vitals.is_dead() {
        return (account.clone(), 0.0);
    }
    let base = PASSIVE_POINTS_PER_HOUR * minutes_elapsed / 60.0;
    award(account, base, vitals, 0.0, global_multiplier)
}

/// Move the account onto `today`.
///
/// Same day: unchanged. Next calendar day: streak extends. Longer gap (or a
/// first ever activity): streak resets. Any change of day clears
/// `daily_earned` and recomputes the cap.
pub fn roll_day(account: &PointsAccount, today: NaiveDate) -> PointsAccount {
    let mut next = account.clone();
    match account.last_active_date {
        Some(last) if last == today => return next,
        Some(last) if last.succ_opt() == Some(today) => {
            next.consecutive_days = account.consecutive_days.saturating_add(1);
        }
        Some(last) if last > today => {
            log::warn!("⚠️  Clock went backwards ({} -> {}), keeping day", last, today);
            return next;
        }
        _ => {
            next.consecutive_days = 0;
        }
    }
    next.daily_earned = 0.0;
    next.daily_cap = daily_cap(next.consecutive_days);
    next.last_active_date = Some(today);
    next
}
