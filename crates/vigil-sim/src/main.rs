//! Sensor stream simulator
//!
//! Generates plausible industrial sensor readings (gaussian noise around a
//! per-sensor baseline, with occasional injected spikes) and posts them to
//! a running Vigil instance. Useful for demos and load-testing the ingest
//! path.
//!
//! Environment: VIGIL_URL (default http://localhost:8080),
//! SIM_INTERVAL_MS (default 500), SIM_SPIKE_CHANCE (default 0.02).

use rand::Rng;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

struct SensorProfile {
    sensor_id: &'static str,
    sensor_type: &'static str,
    unit: &'static str,
    mean: f64,
    std_dev: f64,
}

const PROFILES: [SensorProfile; 5] = [
    SensorProfile {
        sensor_id: "EJ-01",
        sensor_type: "ejector_pressure",
        unit: "bar",
        mean: 6.2,
        std_dev: 0.15,
    },
    SensorProfile {
        sensor_id: "CV-01",
        sensor_type: "conveyor_speed",
        unit: "m/s",
        mean: 1.5,
        std_dev: 0.05,
    },
    SensorProfile {
        sensor_id: "MT-01",
        sensor_type: "main_motor_load",
        unit: "%",
        mean: 65.0,
        std_dev: 4.0,
    },
    SensorProfile {
        sensor_id: "OS-01",
        sensor_type: "optical_sensor_temp",
        unit: "C",
        mean: 42.0,
        std_dev: 1.2,
    },
    SensorProfile {
        sensor_id: "VB-01",
        sensor_type: "vibration_bearing_x",
        unit: "mm/s",
        mean: 2.1,
        std_dev: 0.3,
    },
];

/// Box-Muller gaussian sample
fn gaussian(rng: &mut impl Rng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + z * std_dev
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let base_url =
        std::env::var("VIGIL_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let interval_ms: u64 = std::env::var("SIM_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(500);
    let spike_chance: f64 = std::env::var("SIM_SPIKE_CHANCE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.02);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let analyze_url = format!("{base_url}/analyze");

    info!(url = %analyze_url, interval_ms, spike_chance, "Sensor simulator started");

    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    loop {
        ticker.tick().await;

        for profile in &PROFILES {
            let (value, spiked) = {
                let mut rng = rand::thread_rng();
                let base = gaussian(&mut rng, profile.mean, profile.std_dev);
                if rng.gen_bool(spike_chance) {
                    (base * 3.0, true)
                } else {
                    (base, false)
                }
            };

            let body = json!({
                "sensor_id": profile.sensor_id,
                "sensor_type": profile.sensor_type,
                "value": value,
                "unit": profile.unit,
            });

            match client.post(&analyze_url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    let verdict: serde_json::Value = response.json().await.unwrap_or_default();
                    let is_anomaly = verdict["is_anomaly"].as_bool().unwrap_or(false);
                    if is_anomaly || spiked {
                        info!(
                            sensor = profile.sensor_type,
                            value = format!("{value:.2}"),
                            spiked,
                            is_anomaly,
                            "Reading analyzed"
                        );
                    }
                }
                Ok(response) => {
                    warn!(
                        sensor = profile.sensor_type,
                        status = %response.status(),
                        "Analyze request rejected"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Analyze request failed");
                }
            }
        }
    }
}
