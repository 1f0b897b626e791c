//! Server-side reward economy
//!
//! Daily pools funded from trading volume, hourly participation, weighted
//! payouts and claims.

pub mod claim;
pub mod participation;
pub mod payout;
pub mod pool;
pub mod scheduler;
pub mod types;
pub mod volume;

pub use claim::ClaimLedger;
pub use participation::{holding_multiplier, ParticipationRegistry};
pub use payout::{compute_rewards, Distribution, LeftoverPolicy, PayoutCalculator};
pub use pool::RewardPoolManager;
pub use scheduler::{scheduler_task, EconomyScheduler, Trigger, TriggerQueue};
pub use types::{ClaimReceipt, HourlyPool, ParticipationRecord, PoolStatus, RewardPool};
pub use volume::{FixedVolumeSource, HttpVolumeSource, VolumeSource};
