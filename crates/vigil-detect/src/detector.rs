use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use vigil_core::types::{AnomalyResult, Reading, Severity, SystemStatus};
use vigil_core::DetectorConfig;

use crate::window::RollingWindow;

/// Streaming z-score anomaly detector
///
/// Keeps one rolling window per `sensor_type` and classifies every reading
/// against the statistics of its own window. The reading is appended only
/// after the verdict is computed so the current value never biases its own
/// baseline.
///
/// Status gating: with `n` prior samples, a reading is `Initializing` while
/// `n + 1 < min_data_points`, `Learning` while `n + 1 < min_training_size`
/// (z computed for observability, anomalies suppressed), and `Active`
/// afterwards.
pub struct Detector {
    config: DetectorConfig,
    windows: HashMap<String, RollingWindow>,
}

/// Per-sensor rollup for the stats endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SensorStats {
    pub data_points: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub latest: f64,
}

/// Summary across all sensors
#[derive(Debug, Clone, Serialize)]
pub struct DetectorStats {
    pub total_sensors: usize,
    pub sensors: HashMap<String, SensorStats>,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
        }
    }

    /// Number of sensor types with at least one sample
    pub fn active_sensors(&self) -> usize {
        self.windows.len()
    }

    /// Evaluate a reading and fold it into the sensor's window
    pub fn evaluate(&mut self, reading: &Reading) -> AnomalyResult {
        let threshold = self.config.threshold_for(&reading.sensor_type);
        let min_training_size = self.config.training_size_for(&reading.sensor_type);
        let min_data_points = self.config.min_data_points;
        let capacity = self.config.window_size;

        let window = self
            .windows
            .entry(reading.sensor_type.clone())
            .or_insert_with(|| RollingWindow::new(capacity));

        let prior = window.len();
        let seen = prior + 1;

        let (system_status, mean, std_dev, z_score, is_anomaly, severity) =
            if seen < min_data_points {
                (
                    SystemStatus::Initializing,
                    reading.value,
                    0.0,
                    0.0,
                    false,
                    Severity::Normal,
                )
            } else {
                let mean = window.mean();
                let std_dev = window.std_dev();
                let z = (reading.value - mean) / std_dev;

                if seen < min_training_size {
                    (SystemStatus::Learning, mean, std_dev, z, false, Severity::Normal)
                } else {
                    let is_anomaly = z.abs() > threshold;
                    let severity = if !is_anomaly {
                        Severity::Normal
                    } else if z.abs() > threshold * 1.5 {
                        Severity::High
                    } else {
                        Severity::Medium
                    };
                    (SystemStatus::Active, mean, std_dev, z, is_anomaly, severity)
                }
            };

        let mut result = AnomalyResult {
            sensor_id: reading.sensor_id.clone(),
            sensor_type: reading.sensor_type.clone(),
            current_value: reading.value,
            unit: reading.unit.clone(),
            mean,
            std_dev,
            z_score,
            threshold,
            timestamp: reading.timestamp,
            is_anomaly,
            severity,
            system_status,
            window_size: prior,
            message: String::new(),
        };
        result.message = result.build_message(min_data_points);

        window.push(reading.value);

        if is_anomaly {
            debug!(
                sensor_type = %reading.sensor_type,
                z_score = z_score,
                threshold = threshold,
                "Anomaly detected"
            );
            metrics::counter!(
                "vigil_anomalies_detected_total",
                "severity" => severity.as_str()
            )
            .increment(1);
        }

        result
    }

    /// Stats rollup across every sensor with data
    pub fn stats_summary(&self) -> DetectorStats {
        let mut sensors = HashMap::new();
        for (sensor_type, window) in &self.windows {
            if window.is_empty() {
                continue;
            }
            sensors.insert(
                sensor_type.clone(),
                SensorStats {
                    data_points: window.len(),
                    mean: window.mean(),
                    std_dev: window.variance().sqrt(),
                    min: window.min().unwrap_or(0.0),
                    max: window.max().unwrap_or(0.0),
                    latest: window.latest().unwrap_or(0.0),
                },
            );
        }
        DetectorStats {
            total_sensors: sensors.len(),
            sensors,
        }
    }

    /// Drop every window
    pub fn clear(&mut self) {
        self.windows.clear();
    }

    /// Rebuild under a new configuration, migrating each window value by
    /// value into the new capacity (oldest dropped when shrinking)
    pub fn migrate(&self, config: DetectorConfig) -> Detector {
        let windows = self
            .windows
            .iter()
            .map(|(k, w)| (k.clone(), w.resized(config.window_size)))
            .collect();
        Detector { config, windows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vigil_core::SensorOverride;

    fn reading(sensor_type: &str, value: f64) -> Reading {
        Reading {
            sensor_id: "S1".to_string(),
            sensor_type: sensor_type.to_string(),
            value,
            unit: "u".to_string(),
            timestamp: Utc::now(),
        }
    }

    fn config(window: usize, min_points: usize, training: usize, threshold: f64) -> DetectorConfig {
        DetectorConfig {
            window_size: window,
            min_data_points: min_points,
            min_training_size: training,
            z_score_threshold: threshold,
            sensors: HashMap::new(),
        }
    }

    #[test]
    fn warm_up_suppresses_anomalies() {
        let mut detector = Detector::new(config(20, 5, 10, 2.0));

        let mut results = Vec::new();
        for _ in 0..4 {
            results.push(detector.evaluate(&reading("t", 10.0)));
        }
        results.push(detector.evaluate(&reading("t", 1000.0)));

        assert!(results.iter().all(|r| !r.is_anomaly));
        for r in &results[..4] {
            assert_eq!(r.system_status, SystemStatus::Initializing);
            assert_eq!(r.z_score, 0.0);
        }
        let fifth = &results[4];
        assert_eq!(fifth.system_status, SystemStatus::Learning);
        assert_eq!(fifth.severity, Severity::Normal);
        // z is computed for observability even while learning
        assert!(fifth.z_score.abs() > 0.0);
    }

    #[test]
    fn clear_anomaly_after_training() {
        let mut detector = Detector::new(config(20, 5, 10, 2.0));

        for _ in 0..4 {
            detector.evaluate(&reading("t", 10.0));
        }
        detector.evaluate(&reading("t", 1000.0));
        for _ in 0..20 {
            let r = detector.evaluate(&reading("t", 10.0));
            assert!(!r.is_anomaly);
        }

        // The spike has been evicted; a modest deviation now stands out
        let result = detector.evaluate(&reading("t", 25.0));
        assert_eq!(result.system_status, SystemStatus::Active);
        assert!(result.is_anomaly);
        assert!(matches!(result.severity, Severity::Medium | Severity::High));
        assert!(result.z_score.abs() > result.threshold);
    }

    #[test]
    fn status_flips_at_min_data_points() {
        let mut detector = Detector::new(config(10, 5, 5, 2.0));

        for _ in 0..4 {
            let r = detector.evaluate(&reading("t", 1.0));
            assert_eq!(r.system_status, SystemStatus::Initializing);
        }
        // With min_training_size == min_data_points the flip goes straight
        // to Active
        let r = detector.evaluate(&reading("t", 1.0));
        assert_eq!(r.system_status, SystemStatus::Active);
    }

    #[test]
    fn constant_baseline_never_divides_by_zero() {
        let mut detector = Detector::new(config(50, 2, 2, 2.0));
        for _ in 0..10 {
            detector.evaluate(&reading("t", 5.0));
        }
        let result = detector.evaluate(&reading("t", 6.0));
        assert!(result.std_dev > 0.0);
        assert!(result.z_score.is_finite());
        assert!(result.is_anomaly);
    }

    #[test]
    fn negative_values_are_allowed() {
        let mut detector = Detector::new(config(50, 2, 2, 2.0));
        for v in [-10.0, -12.0, -11.0, -10.5, -11.5] {
            detector.evaluate(&reading("t", v));
        }
        let result = detector.evaluate(&reading("t", -11.0));
        assert_eq!(result.system_status, SystemStatus::Active);
        assert!(!result.is_anomaly);
    }

    #[test]
    fn windows_partition_by_sensor_type() {
        let mut detector = Detector::new(config(50, 2, 2, 2.0));
        for _ in 0..5 {
            detector.evaluate(&reading("a", 10.0));
        }
        // A fresh sensor type starts from Initializing regardless of "a"
        let r = detector.evaluate(&reading("b", 10.0));
        assert_eq!(r.system_status, SystemStatus::Initializing);
        assert_eq!(detector.active_sensors(), 2);
    }

    #[test]
    fn per_sensor_threshold_override_applies() {
        let mut cfg = config(50, 2, 2, 2.0);
        cfg.sensors.insert(
            "loose".to_string(),
            SensorOverride {
                threshold: Some(10.0),
                min_training_size: None,
            },
        );
        let mut detector = Detector::new(cfg);

        for v in [10.0, 11.0, 9.0, 10.5, 9.5] {
            detector.evaluate(&reading("loose", v));
        }
        let result = detector.evaluate(&reading("loose", 14.0));
        assert_eq!(result.threshold, 10.0);
        assert!(!result.is_anomaly);
    }

    #[test]
    fn severity_scales_with_z_score() {
        // Baseline mean 10, std ~0.8165 over [9,10,11] repeated
        let mut detector = Detector::new(config(50, 2, 2, 2.0));
        for _ in 0..4 {
            for v in [9.0, 10.0, 11.0] {
                detector.evaluate(&reading("t", v));
            }
        }
        let medium = detector.evaluate(&reading("t", 12.0));
        assert!(medium.is_anomaly);
        assert_eq!(medium.severity, Severity::Medium);

        let mut detector = Detector::new(config(50, 2, 2, 2.0));
        for _ in 0..4 {
            for v in [9.0, 10.0, 11.0] {
                detector.evaluate(&reading("t", v));
            }
        }
        let high = detector.evaluate(&reading("t", 20.0));
        assert!(high.is_anomaly);
        assert_eq!(high.severity, Severity::High);
    }

    #[test]
    fn clear_then_replay_is_deterministic() {
        let stream: Vec<f64> = (0..30).map(|i| 10.0 + (i % 3) as f64).collect();

        let mut detector = Detector::new(config(20, 5, 10, 2.0));
        let first: Vec<String> = stream
            .iter()
            .map(|v| serde_json::to_string(&detector.evaluate(&Reading {
                timestamp: chrono::DateTime::UNIX_EPOCH,
                ..reading("t", *v)
            }))
            .unwrap())
            .collect();

        detector.clear();
        let second: Vec<String> = stream
            .iter()
            .map(|v| serde_json::to_string(&detector.evaluate(&Reading {
                timestamp: chrono::DateTime::UNIX_EPOCH,
                ..reading("t", *v)
            }))
            .unwrap())
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn migrate_shrinks_windows_oldest_first() {
        let mut detector = Detector::new(config(10, 2, 2, 2.0));
        for v in 0..10 {
            detector.evaluate(&reading("t", v as f64));
        }

        let migrated = detector.migrate(config(3, 2, 2, 2.0));
        let stats = migrated.stats_summary();
        let t = &stats.sensors["t"];
        assert_eq!(t.data_points, 3);
        // Last three values survive: 7, 8, 9
        assert_eq!(t.min, 7.0);
        assert_eq!(t.latest, 9.0);
    }
}
