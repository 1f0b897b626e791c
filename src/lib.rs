//! Gochi - virtual pet economy engine
//!
//! Client-side pet simulation (vitals, cooldowns, points) and the
//! server-side reward economy (daily pools, hourly participation, payouts,
//! claims) behind one persistence boundary.

pub mod config;
pub mod error;
pub mod params;
pub mod pet;
pub mod points;
pub mod retry;
pub mod rewards;
pub mod store;

pub use error::{EngineError, Result};
