//! Engine configuration from environment variables

use crate::rewards::LeftoverPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the economy runtime and pet sessions
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Advisory parameter endpoint; `None` means defaults only
    pub params_url: Option<String>,

    pub params_timeout_ms: u64,

    /// Daily volume endpoint; `None` means `daily_volume_fallback` is used
    pub volume_url: Option<String>,

    pub daily_volume_fallback: f64,

    /// How often the scheduler checks the clock for boundaries
    pub scheduler_tick_ms: u64,

    pub persist_min_interval_secs: u64,

    pub persist_change_threshold: f64,

    pub leftover_policy: LeftoverPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: "data/gochi.db".to_string(),
            params_url: None,
            params_timeout_ms: 3_000,
            volume_url: None,
            daily_volume_fallback: 0.0,
            scheduler_tick_ms: 30_000,
            persist_min_interval_secs: 30,
            persist_change_threshold: 1.0,
            leftover_policy: LeftoverPolicy::RollForward,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("⚠️  Invalid {}={:?}, using default {:?}", key, raw, default);
                default
            }
        },
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `GOCHI_DB_PATH` (default: data/gochi.db)
    /// - `PARAMS_URL` (default: unset)
    /// - `PARAMS_TIMEOUT_MS` (default: 3000)
    /// - `VOLUME_URL` (default: unset)
    /// - `DAILY_VOLUME_FALLBACK` (default: 0)
    /// - `SCHEDULER_TICK_MS` (default: 30000)
    /// - `PERSIST_MIN_INTERVAL_SECS` (default: 30)
    /// - `PERSIST_CHANGE_THRESHOLD` (default: 1.0)
    /// - `LEFTOVER_POLICY` (default: roll_forward)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` with an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let mut daily_volume_fallback =
            parse_or(&lookup, "DAILY_VOLUME_FALLBACK", defaults.daily_volume_fallback);
        if !daily_volume_fallback.is_finite() || daily_volume_fallback < 0.0 {
            log::warn!(
                "⚠️  DAILY_VOLUME_FALLBACK must be finite and non-negative, using {}",
                defaults.daily_volume_fallback
            );
            daily_volume_fallback = defaults.daily_volume_fallback;
        }

        let mut persist_change_threshold = parse_or(
            &lookup,
            "PERSIST_CHANGE_THRESHOLD",
            defaults.persist_change_threshold,
        );
        if !persist_change_threshold.is_finite() || persist_change_threshold < 0.0 {
            log::warn!(
                "⚠️  PERSIST_CHANGE_THRESHOLD must be finite and non-negative, using {}",
                defaults.persist_change_threshold
            );
            persist_change_threshold = defaults.persist_change_threshold;
        }

        let leftover_policy = match lookup("LEFTOVER_POLICY") {
            None => defaults.leftover_policy,
            Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
                log::warn!("⚠️  {}, using roll_forward", e);
                defaults.leftover_policy
            }),
        };

        Self {
            db_path: non_empty(lookup("GOCHI_DB_PATH")).unwrap_or(defaults.db_path),
            params_url: non_empty(lookup("PARAMS_URL")),
            params_timeout_ms: parse_or(&lookup, "PARAMS_TIMEOUT_MS", defaults.params_timeout_ms),
            volume_url: non_empty(lookup("VOLUME_URL")),
            daily_volume_fallback,
            scheduler_tick_ms: parse_or(&lookup, "SCHEDULER_TICK_MS", defaults.scheduler_tick_ms)
                .max(1),
            persist_min_interval_secs: parse_or(
                &lookup,
                "PERSIST_MIN_INTERVAL_SECS",
                defaults.persist_min_interval_secs,
            ),
            persist_change_threshold,
            leftover_policy,
        }
    }

    pub fn params_timeout(&self) -> Duration {
        Duration::from_millis(self.params_timeout_ms)
    }

    pub fn persist_min_interval(&self) -> Duration {
        Duration::from_secs(self.persist_min_interval_secs)
    }
}
