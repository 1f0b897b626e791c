//! Parameter resolution with bounded external fetch and default fallback

use super::{PetContext, TunableParameters};
use crate::error::EngineError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// External advisory source for parameter overrides
#[async_trait]
pub trait ParameterSource: Send + Sync {
    async fn fetch_overrides(&self, context: &PetContext) -> Result<TunableParameters, EngineError>;

    /// Source name for logging
    fn source_name(&self) -> &'static str;
}

/// Resolves tunable parameters for a pet
///
/// Holds no hidden state beyond its injected source: every call resolves
/// from scratch for the given context. Whatever comes back (override or
/// default) is already clamped.
#[derive(Clone)]
pub struct ParameterProvider {
    source: Option<Arc<dyn ParameterSource>>,
    timeout: Duration,
}

impl ParameterProvider {
    pub fn new(source: Arc<dyn ParameterSource>, timeout: Duration) -> Self {
        Self {
            source: Some(source),
            timeout,
        }
    }

    /// Provider that always hands out the defaults
    pub fn defaults_only() -> Self {
        Self {
            source: None,
            timeout: Duration::ZERO,
        }
    }

    pub async fn resolve(&self, context: &PetContext) -> TunableParameters {
        let Some(source) = &self.source else {
            return TunableParameters::default();
        };

        let fetched = match tokio::time::timeout(self.timeout, source.fetch_overrides(context)).await
        {
            Ok(Ok(params)) => Ok(params),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EngineError::ExternalService(format!(
                "{} timed out after {}ms",
                source.source_name(),
                self.timeout.as_millis()
            ))),
        };

        match fetched {
            Ok(params) => {
                let clamped = params.clamped();
                if clamped != params {
                    log::debug!(
                        "🔧 Clamped out-of-bound overrides from {} for {}",
                        source.source_name(),
                        context.wallet
                    );
                }
                clamped
            }
            Err(e) => {
                log::warn!(
                    "⚠️  Parameter fetch failed for {}, using defaults: {}",
                    context.wallet,
                    e
                );
                TunableParameters::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pet::PetVitals;

    struct FixedSource(TunableParameters);

    #[async_trait]
    impl ParameterSource for FixedSource {
        async fn fetch_overrides(&self, _: &PetContext) -> Result<TunableParameters, EngineError> {
            Ok(self.0)
        }

        fn source_name(&self) -> &'static str {
            "fixed"
        }
    }

    struct FailingSource;

    #[async_trait]
    impl ParameterSource for FailingSource {
        async fn fetch_overrides(&self, _: &PetContext) -> Result<TunableParameters, EngineError> {
            Err(EngineError::ExternalService("503 Service Unavailable".to_string()))
        }

        fn source_name(&self) -> &'static str {
            "failing"
        }
    }

    struct SlowSource;

    #[async_trait]
    impl ParameterSource for SlowSource {
        async fn fetch_overrides(&self, _: &PetContext) -> Result<TunableParameters, EngineError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(TunableParameters {
                point_multiplier: 1.9,
                ..Default::default()
            })
        }

        fn source_name(&self) -> &'static str {
            "slow"
        }
    }

    fn context() -> PetContext {
        PetContext {
            wallet: "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU".to_string(),
            vitals: PetVitals::default(),
            consecutive_days: 3,
            interactions_last_hour: 2,
            hour_of_day: 14,
        }
    }

    #[tokio::test]
    async fn test_override_is_clamped() {
        let provider = ParameterProvider::new(
            Arc::new(FixedSource(TunableParameters {
                point_multiplier: 50.0,
                ..Default::default()
            })),
            Duration::from_millis(500),
        );
        let params = provider.resolve(&context()).await;
        assert_eq!(params.point_multiplier, 2.0);
    }

    #[tokio::test]
    async fn test_service_error_falls_back() {
        let provider = ParameterProvider::new(Arc::new(FailingSource), Duration::from_millis(500));
        assert_eq!(provider.resolve(&context()).await, TunableParameters::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back() {
        let provider = ParameterProvider::new(Arc::new(SlowSource), Duration::from_millis(200));
        assert_eq!(provider.resolve(&context()).await, TunableParameters::default());
    }

    #[tokio::test]
    async fn test_defaults_only() {
        let provider = ParameterProvider::defaults_only();
        assert_eq!(provider.resolve(&context()).await, TunableParameters::default());
    }
}
