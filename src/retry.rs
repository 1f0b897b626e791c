//! Exponential backoff for retryable storage writes

use crate::store::StorageError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay_ms: u64,
    max_delay_ms: u64,
    max_retries: u32,
    current_attempt: u32,
}

#[derive(Debug)]
pub struct MaxRetriesExceeded;

impl std::fmt::Display for MaxRetriesExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum retry attempts exceeded")
    }
}

impl std::error::Error for MaxRetriesExceeded {}

impl ExponentialBackoff {
    pub fn new(initial_ms: u64, max_ms: u64, retries: u32) -> Self {
        Self {
            initial_delay_ms: initial_ms,
            max_delay_ms: max_ms,
            max_retries: retries,
            current_attempt: 0,
        }
    }

    /// Delay the next attempt would wait, without consuming it.
    pub fn next_delay(&self) -> Duration {
        let factor = 2_u64.saturating_pow(self.current_attempt);
        Duration::from_millis(std::cmp::min(
            self.initial_delay_ms.saturating_mul(factor),
            self.max_delay_ms,
        ))
    }

    pub async fn sleep(&mut self) -> Result<(), MaxRetriesExceeded> {
        if self.current_attempt >= self.max_retries {
            return Err(MaxRetriesExceeded);
        }

        let delay = self.next_delay();

        log::warn!(
            "⏳ Retry attempt {} of {} in {}ms",
            self.current_attempt + 1,
            self.max_retries,
            delay.as_millis()
        );

        sleep(delay).await;
        self.current_attempt += 1;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

impl Default for ExponentialBackoff {
    /// 250ms, 500ms, 1s, capped at 4s, three retries
    fn default() -> Self {
        Self::new(250, 4_000, 3)
    }
}

/// Run `op` until it succeeds or the backoff budget is spent.
///
/// Returns the last storage error once retries are exhausted.
pub async fn with_backoff<T, F, Fut>(
    label: &str,
    mut backoff: ExponentialBackoff,
    mut op: F,
) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                log::warn!("⚠️  {} failed: {}", label, e);
                if backoff.sleep().await.is_err() {
                    log::error!("❌ {} gave up after retries: {}", label, e);
                    return Err(e);
                }
            }
        }
    }
}
