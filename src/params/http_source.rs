//! Advisory parameter service over HTTP
//!
//! POSTs the pet context as JSON and expects a (possibly partial)
//! `TunableParameters` body back:
//!
//! ```json
//! { "decayRates": { "food": 0.6 }, "pointMultiplier": 1.2 }
//! ```

use super::provider::ParameterSource;
use super::{PetContext, TunableParameters};
use crate::error::EngineError;
use async_trait::async_trait;
use std::time::Duration;

pub struct HttpParameterSource {
    client: reqwest::Client,
    url: String,
}

impl HttpParameterSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::ExternalService(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

/// Parse a response body, rejecting anything that isn't a parameter object.
pub fn parse_overrides(body: &str) -> Result<TunableParameters, EngineError> {
    serde_json::from_str(body)
        .map_err(|e| EngineError::ExternalService(format!("malformed parameter payload: {}", e)))
}

#[async_trait]
impl ParameterSource for HttpParameterSource {
    async fn fetch_overrides(&self, context: &PetContext) -> Result<TunableParameters, EngineError> {
        let response = self
            .client
            .post(&self.url)
            .json(context)
            .send()
            .await
            .map_err(|e| EngineError::ExternalService(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::ExternalService(format!(
                "parameter API error: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| EngineError::ExternalService(e.to_string()))?;

        parse_overrides(&body)
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_payload() {
        let p = parse_overrides(r#"{"cooldowns": {"feed": 12000}}"#).unwrap();
        assert_eq!(p.cooldowns.feed, 12_000.0);
        assert_eq!(p.point_multiplier, 1.0);
    }

    #[test]
    fn test_parse_malformed_payload() {
        assert!(matches!(
            parse_overrides("<html>502 Bad Gateway</html>"),
            Err(EngineError::ExternalService(_))
        ));
        assert!(parse_overrides(r#"{"pointMultiplier": "lots"}"#).is_err());
    }
}
