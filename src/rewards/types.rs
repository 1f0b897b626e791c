//! Reward pool data model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const HOURS_PER_DAY: u8 = 24;

/// Lifecycle of an hourly sub-pool. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    Pending,
    Active,
    Distributed,
}

impl PoolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolStatus::Pending => "pending",
            PoolStatus::Active => "active",
            PoolStatus::Distributed => "distributed",
        }
    }
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PoolStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PoolStatus::Pending),
            "active" => Ok(PoolStatus::Active),
            "distributed" => Ok(PoolStatus::Distributed),
            other => Err(format!("unknown pool status: {}", other)),
        }
    }
}

/// One of the 24 per-day sub-allocations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPool {
    pub hour: u8,
    pub pool_amount: f64,
    pub distributed_amount: f64,
    pub participants: u32,
    pub status: PoolStatus,
}

/// Daily reward pool built from trading volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardPool {
    pub date: NaiveDate,
    pub total_daily_volume: f64,
    pub total_daily_rewards: f64,
    pub reserve_amount: f64,
    pub hourly_pools: Vec<HourlyPool>,
}

impl RewardPool {
    pub fn hour(&self, hour: u8) -> Option<&HourlyPool> {
        self.hourly_pools.iter().find(|h| h.hour == hour)
    }

    pub fn hour_mut(&mut self, hour: u8) -> Option<&mut HourlyPool> {
        self.hourly_pools.iter_mut().find(|h| h.hour == hour)
    }

    pub fn active_hour(&self) -> Option<u8> {
        self.hourly_pools
            .iter()
            .find(|h| h.status == PoolStatus::Active)
            .map(|h| h.hour)
    }

    pub fn total_distributed(&self) -> f64 {
        self.hourly_pools.iter().map(|h| h.distributed_amount).sum()
    }
}

/// One wallet's entry into one hourly pool
///
/// Unique on `(wallet, date, hour)`. Only `amount`, `claimed` and
/// `claimed_at` change after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipationRecord {
    /// Storage row id; `None` until inserted
    pub id: Option<i64>,
    pub wallet: String,
    pub date: NaiveDate,
    pub hour: u8,
    pub base_points: f64,
    pub weighted_points: f64,
    pub multiplier: f64,
    pub amount: f64,
    pub claimed: bool,
    pub claimed_at: Option<i64>,
    pub created_at: i64,
}

/// Result of a successful claim
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimReceipt {
    pub wallet: String,
    pub amount: f64,
    pub records: usize,
    pub new_balance: f64,
    pub claimed_at: i64,
}
