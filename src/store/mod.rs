//! Persistence boundary
//!
//! The engine only talks to storage through [`PersistenceStore`]. Methods
//! that must be atomic (pool creation, participation insert, hour
//! finalisation, claim) are single trait calls so an implementation can wrap
//! each in one transaction.

pub mod sqlite;

use crate::pet::{CooldownState, PetVitals};
use crate::points::PointsAccount;
use crate::rewards::types::{ClaimReceipt, ParticipationRecord, RewardPool};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use sqlite::SqliteStore;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Storage lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

/// Persisted client-side state for one wallet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PetState {
    pub vitals: PetVitals,
    pub cooldowns: CooldownState,
    pub updated_at: i64,
}

/// Result of an atomic participation insert
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(ParticipationRecord),
    Duplicate,
    PoolNotActive,
}

/// Per-participant payout written when an hour is finalised
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Payout {
    pub participation_id: i64,
    pub amount: f64,
}

/// Result of an atomic hour finalisation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FinalizeOutcome {
    /// Status flipped `active → distributed` by this call
    Finalized,
    /// Someone else got there first (or the hour was never active)
    NotActive,
    /// Still active, but a registration landed after the caller read the
    /// participation set. Nothing was written; read again and retry.
    Stale,
}

#[async_trait]
pub trait PersistenceStore: Send + Sync {
    // ── Client state ─────────────────────────────────────────────────────────
    async fn get_pet_state(&self, wallet: &str) -> Result<Option<PetState>, StorageError>;

    async fn save_pet_state(&self, wallet: &str, state: &PetState) -> Result<(), StorageError>;

    async fn get_points_account(&self, wallet: &str) -> Result<Option<PointsAccount>, StorageError>;

    async fn save_points_account(
        &self,
        wallet: &str,
        account: &PointsAccount,
    ) -> Result<(), StorageError>;

    // ── Reward pools ─────────────────────────────────────────────────────────
    async fn get_reward_pool(&self, date: NaiveDate) -> Result<Option<RewardPool>, StorageError>;

    /// Persist status transitions of an existing pool's hours.
    ///
    /// Statuses only move forward (`pending → active → distributed`); a stale
    /// copy can never roll an hour back. Amounts and participant counts are
    /// owned by the atomic operations below and are not written here.
    async fn save_reward_pool(&self, pool: &RewardPool) -> Result<(), StorageError>;

    /// Insert `pool` and add its `reserve_amount` to the reserve fund, as one
    /// unit. Returns `false` (and changes nothing) if the date already exists.
    async fn create_reward_pool(&self, pool: &RewardPool) -> Result<bool, StorageError>;

    async fn increment_reserve(&self, amount: f64) -> Result<f64, StorageError>;

    async fn reserve_balance(&self) -> Result<f64, StorageError>;

    // ── Participation / payout ───────────────────────────────────────────────
    /// Check the hour is active, insert, bump the participant count.
    async fn insert_participation(
        &self,
        record: &ParticipationRecord,
    ) -> Result<InsertOutcome, StorageError>;

    async fn participations_for_hour(
        &self,
        date: NaiveDate,
        hour: u8,
    ) -> Result<Vec<ParticipationRecord>, StorageError>;

    /// Compare-and-swap the hour `active → distributed`, writing payouts and
    /// the distributed total. The swap only happens while the hour still has
    /// `expected_participants`, so a registration that committed after the
    /// payouts were computed is never finalised at zero. `rollover` is added
    /// to hour+1's pool amount. Hour+1 is activated if it is still pending.
    async fn finalize_hour(
        &self,
        date: NaiveDate,
        hour: u8,
        expected_participants: u32,
        payouts: &[Payout],
        rollover: f64,
    ) -> Result<FinalizeOutcome, StorageError>;

    /// `(date, hour)` of every hour still active on a date before `date`.
    async fn active_hours_before(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<(NaiveDate, u8)>, StorageError>;

    // ── Claims ───────────────────────────────────────────────────────────────
    async fn get_unclaimed_rewards(
        &self,
        wallet: &str,
    ) -> Result<Vec<ParticipationRecord>, StorageError>;

    /// Flip still-unclaimed rows to claimed. Returns how many changed.
    async fn mark_claimed(&self, ids: &[i64], claimed_at: i64) -> Result<usize, StorageError>;

    /// Select unclaimed `amount > 0` rows, mark them claimed, credit the
    /// wallet balance; all or nothing. `None` when there was nothing to claim.
    async fn claim_rewards(
        &self,
        wallet: &str,
        claimed_at: i64,
    ) -> Result<Option<ClaimReceipt>, StorageError>;

    async fn token_balance(&self, wallet: &str) -> Result<f64, StorageError>;
}
