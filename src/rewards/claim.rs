//! Claiming distributed rewards into a wallet balance

use super::types::{ClaimReceipt, ParticipationRecord};
use crate::error::{validate_wallet, EngineError, Result};
use crate::store::PersistenceStore;
use std::sync::Arc;

pub struct ClaimLedger {
    store: Arc<dyn PersistenceStore>,
}

impl ClaimLedger {
    pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
        Self { store }
    }

    /// Records with a payout that have not been claimed yet.
    pub async fn unclaimed(&self, wallet: &str) -> Result<Vec<ParticipationRecord>> {
        validate_wallet(wallet)?;
        Ok(self.store.get_unclaimed_rewards(wallet).await?)
    }

    /// Claim everything outstanding for `wallet`.
    ///
    /// Select, mark and credit run as one storage transaction: two concurrent
    /// claims cannot both see the same unclaimed set.
    pub async fn claim(&self, wallet: &str) -> Result<ClaimReceipt> {
        validate_wallet(wallet)?;
        let now = chrono::Utc::now().timestamp();

        match self.store.claim_rewards(wallet, now).await {
            Ok(Some(receipt)) => {
                log::info!(
                    "💰 {} claimed {:.6} from {} records (balance {:.6})",
                    wallet,
                    receipt.amount,
                    receipt.records,
                    receipt.new_balance
                );
                Ok(receipt)
            }
            Ok(None) => Err(EngineError::NothingToClaim(wallet.to_string())),
            Err(e) => {
                log::error!("❌ Claim failed for {}: {}", wallet, e);
                Err(e.into())
            }
        }
    }
}
