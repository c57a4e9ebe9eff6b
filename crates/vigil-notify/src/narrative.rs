//! LLM narrative generation over HTTP
//!
//! Turns the anomaly snapshot into a short operator-facing commentary.
//! Entirely optional: any failure here is absorbed by the dispatcher's
//! deterministic fallback summary.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use vigil_core::types::AnomalyResult;
use vigil_core::Narrator;

/// Narrative generator configuration
#[derive(Debug, Clone)]
pub struct NarrativeConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub timeout_seconds: u64,
}

impl NarrativeConfig {
    /// Build from environment; `None` when no API key is present
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("LLM_API_KEY").ok()?;
        Some(Self {
            api_key,
            model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            endpoint: std::env::var("LLM_ENDPOINT").unwrap_or_else(|_| {
                "https://generativelanguage.googleapis.com/v1beta/models".to_string()
            }),
            timeout_seconds: std::env::var("LLM_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
        })
    }
}

/// HTTP-backed narrator
pub struct HttpNarrator {
    config: NarrativeConfig,
    client: Client,
}

impl HttpNarrator {
    pub fn new(config: NarrativeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        info!(model = %config.model, "Narrative generator initialized");

        Ok(Self { config, client })
    }

    fn build_prompt(anomalies: &[AnomalyResult]) -> String {
        let mut lines = vec![
            "You are an industrial monitoring assistant. Summarise the following \
             sensor anomalies for a maintenance operator in 3-4 plain sentences: \
             what deviated, how severe it is, and what should be checked first."
                .to_string(),
            String::new(),
        ];

        for a in anomalies {
            lines.push(format!(
                "- sensor {} ({}): value {} {}, expected {:.2} +/- {:.2}, z-score {:.2}, severity {}",
                a.sensor_type,
                a.sensor_id,
                a.current_value,
                a.unit,
                a.mean,
                a.std_dev,
                a.z_score,
                a.severity.as_str()
            ));
        }

        lines.join("\n")
    }
}

#[async_trait]
impl Narrator for HttpNarrator {
    async fn summarize(&self, anomalies: &[AnomalyResult]) -> Result<String> {
        if anomalies.is_empty() {
            return Err(anyhow!("No anomalies to summarise"));
        }

        let url = format!(
            "{}/{}:generateContent?key={}",
            self.config.endpoint, self.config.model, self.config.api_key
        );

        let body = json!({
            "contents": [{
                "parts": [{ "text": Self::build_prompt(anomalies) }]
            }]
        });

        debug!(count = anomalies.len(), "Requesting narrative");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Narrative request failed")?
            .error_for_status()
            .context("Narrative request returned an error status")?;

        let payload: serde_json::Value = response
            .json()
            .await
            .context("Narrative response was not valid JSON")?;

        let text = payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| anyhow!("Narrative response missing text content"))?
            .trim()
            .to_string();

        if text.is_empty() {
            return Err(anyhow!("Narrative response was empty"));
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vigil_core::types::{Severity, SystemStatus};

    fn anomaly(sensor_type: &str, value: f64) -> AnomalyResult {
        AnomalyResult {
            sensor_id: "S7".to_string(),
            sensor_type: sensor_type.to_string(),
            current_value: value,
            unit: "bar".to_string(),
            mean: 6.0,
            std_dev: 0.2,
            z_score: 10.0,
            threshold: 2.0,
            timestamp: Utc::now(),
            is_anomaly: true,
            severity: Severity::High,
            system_status: SystemStatus::Active,
            window_size: 30,
            message: String::new(),
        }
    }

    #[test]
    fn prompt_lists_every_anomaly() {
        let anomalies = vec![anomaly("ejector_pressure", 8.0), anomaly("conveyor_speed", 0.1)];
        let prompt = HttpNarrator::build_prompt(&anomalies);
        assert!(prompt.contains("ejector_pressure"));
        assert!(prompt.contains("conveyor_speed"));
        assert!(prompt.contains("z-score 10.00"));
    }

    #[tokio::test]
    async fn empty_snapshot_is_an_error() {
        let narrator = HttpNarrator::new(NarrativeConfig {
            api_key: "test".to_string(),
            model: "test-model".to_string(),
            endpoint: "http://localhost:1".to_string(),
            timeout_seconds: 1,
        })
        .unwrap();

        assert!(narrator.summarize(&[]).await.is_err());
    }
}
