//! Points economy
//!
//! - `ledger` - accrual formula, daily cap and day rollover
//! - `debounce` - write gate that keeps per-tick saves from hammering storage

pub mod debounce;
pub mod ledger;

pub use debounce::SaveDebouncer;
pub use ledger::{award, award_passive, daily_cap, quality_multiplier, roll_day, streak_multiplier, PointsAccount};
