//! Engine error taxonomy
//!
//! Every refusal the engine can hand back to a caller. Storage failures are
//! wrapped so claim/registration callers can retry; parameter-source failures
//! are recovered inside `ParameterProvider` and never reach this far.

use crate::pet::Action;
use crate::store::StorageError;
use chrono::NaiveDate;

/// All errors returned by the economy engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // ── Input validation ─────────────────────────────────────────────────────
    /// Missing or malformed wallet/amount. Rejected before any state change.
    #[error("Validation error: {0}")]
    Validation(String),

    // ── Interactions ─────────────────────────────────────────────────────────
    #[error("{action} is on cooldown ({remaining_ms}ms remaining)")]
    CooldownActive { action: Action, remaining_ms: u64 },

    #[error("Pet is dead, revive it first")]
    PetDead,

    // ── Participation ────────────────────────────────────────────────────────
    #[error("Wallet {wallet} already participated in {date} hour {hour}")]
    DuplicateParticipation {
        wallet: String,
        date: NaiveDate,
        hour: u8,
    },

    #[error("Hourly pool {date} hour {hour} is not active")]
    PoolNotActive { date: NaiveDate, hour: u8 },

    #[error("No reward pool exists for {0}")]
    PoolNotFound(NaiveDate),

    // ── Claims ───────────────────────────────────────────────────────────────
    #[error("Nothing to claim for wallet {0}")]
    NothingToClaim(String),

    // ── Collaborators ────────────────────────────────────────────────────────
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("External service error: {0}")]
    ExternalService(String),
}

/// Convenience alias so every module can write `Result<T>`.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Reject empty or obviously malformed wallet addresses.
///
/// Wallets are base58 public keys (32-44 chars). Anything else is refused
/// before it can touch persisted state.
pub fn validate_wallet(wallet: &str) -> Result<()> {
    let len = wallet.len();
    if !(32..=44).contains(&len) {
        return Err(EngineError::Validation(format!(
            "wallet must be 32-44 characters, got {}",
            len
        )));
    }
    if !wallet.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(EngineError::Validation(format!(
            "wallet contains non-base58 characters: {}",
            wallet
        )));
    }
    Ok(())
}

/// Reject negative and non-finite amounts.
pub fn validate_amount(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(EngineError::Validation(format!(
            "{} must be a finite non-negative number, got {}",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_wallet() {
        assert!(validate_wallet("7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU").is_ok());
        assert!(validate_wallet("").is_err());
        assert!(validate_wallet("short").is_err());
        assert!(validate_wallet("7xKXtg2CW87d97TXJSDpbD5jBkheTqA8-TZRuJosgAsU").is_err());
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount("points", 0.0).is_ok());
        assert!(validate_amount("points", 12.5).is_ok());
        assert!(validate_amount("points", -1.0).is_err());
        assert!(validate_amount("points", f64::NAN).is_err());
        assert!(validate_amount("points", f64::INFINITY).is_err());
    }
}
