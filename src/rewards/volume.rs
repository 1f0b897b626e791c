//! Daily trading volume samples
//!
//! The engine never computes volume itself; an exchange or indexer supplies
//! it and pool creation only consumes the sampled value.

use crate::error::EngineError;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait VolumeSource: Send + Sync {
    async fn get_daily_volume(&self, date: NaiveDate) -> Result<f64, EngineError>;
}

/// Constant volume (config fallback, tests)
pub struct FixedVolumeSource(pub f64);

#[async_trait]
impl VolumeSource for FixedVolumeSource {
    async fn get_daily_volume(&self, _date: NaiveDate) -> Result<f64, EngineError> {
        Ok(self.0)
    }
}

#[derive(Debug, Deserialize)]
struct VolumeResponse {
    volume: f64,
}

/// `GET {url}?date=YYYY-MM-DD` → `{ "volume": 1234.5 }`
pub struct HttpVolumeSource {
    client: reqwest::Client,
    url: String,
}

impl HttpVolumeSource {
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

#[async_trait]
impl VolumeSource for HttpVolumeSource {
    async fn get_daily_volume(&self, date: NaiveDate) -> Result<f64, EngineError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("date", date.format("%Y-%m-%d").to_string())])
            .send()
            .await
            .map_err(|e| EngineError::ExternalService(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::ExternalService(format!(
                "volume API error: {}",
                response.status()
            )));
        }

        let body: VolumeResponse = response
            .json()
            .await
            .map_err(|e| EngineError::ExternalService(format!("malformed volume payload: {}", e)))?;

        Ok(body.volume)
    }
}
