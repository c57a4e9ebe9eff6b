use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Result, VigilError};

/// Main configuration for the Vigil service
///
/// Every section is individually defaultable so a partial YAML file
/// (or no file at all) yields a fully working configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Detector tunables
    #[serde(default)]
    pub anomaly: DetectorConfig,

    /// Auto-reporter tunables
    #[serde(default)]
    pub auto_reporting: ReportingConfig,

    /// API server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Log store settings
    #[serde(default)]
    pub logging: LogConfig,
}

/// Z-score detector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Rolling window capacity per sensor type
    pub window_size: usize,

    /// Minimum samples before any statistics are trusted
    pub min_data_points: usize,

    /// Minimum samples before anomalies are reported (learning phase)
    pub min_training_size: usize,

    /// Global z-score threshold
    pub z_score_threshold: f64,

    /// Per-sensor-type overrides
    pub sensors: HashMap<String, SensorOverride>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            min_data_points: 7,
            min_training_size: 20,
            z_score_threshold: 2.0,
            sensors: HashMap::new(),
        }
    }
}

/// Partial per-sensor override of the detector settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorOverride {
    pub threshold: Option<f64>,
    pub min_training_size: Option<usize>,
}

/// Leaky bucket accumulator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeakyBucketConfig {
    /// Points added per anomaly, by risk bucket
    pub critical_points: f64,
    pub high_points: f64,
    pub medium_points: f64,
    pub low_points: f64,

    /// Points leaked per minute
    pub decay_rate: f64,

    /// Minimum interval between decay applications
    pub decay_interval_seconds: f64,

    /// Score ceiling
    pub max_bucket_capacity: f64,
}

impl Default for LeakyBucketConfig {
    fn default() -> Self {
        Self {
            critical_points: 15.0,
            high_points: 8.0,
            medium_points: 3.0,
            low_points: 1.0,
            decay_rate: 5.0,
            decay_interval_seconds: 10.0,
            max_bucket_capacity: 100.0,
        }
    }
}

/// Adaptive threshold settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveThresholdConfig {
    pub base_warning_threshold: f64,
    pub base_critical_threshold: f64,

    /// Only bucket scores within this window feed adaptation
    pub adaptation_window_minutes: i64,
    pub min_samples_for_adaptation: usize,

    /// Bounds on the adaptation factor
    pub min_threshold_multiplier: f64,
    pub max_threshold_multiplier: f64,

    /// Scaling coefficient applied to the mean score ratio
    pub adaptation_gain: f64,

    /// Asymmetric exit margin for state transitions
    pub hysteresis_margin: f64,
}

impl Default for AdaptiveThresholdConfig {
    fn default() -> Self {
        Self {
            base_warning_threshold: 20.0,
            base_critical_threshold: 40.0,
            adaptation_window_minutes: 30,
            min_samples_for_adaptation: 10,
            min_threshold_multiplier: 0.5,
            max_threshold_multiplier: 2.0,
            adaptation_gain: 0.3,
            hysteresis_margin: 0.2,
        }
    }
}

/// State machine transition and cooldown settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateTransitionConfig {
    pub report_on_warning_entry: bool,
    pub report_on_critical_entry: bool,
    pub report_on_critical_exit: bool,
    pub report_on_normal_return: bool,

    /// Minimum interval between reports, per state
    pub normal_cooldown_minutes: i64,
    pub warning_cooldown_minutes: i64,
    pub critical_cooldown_minutes: i64,

    /// A pending state must hold this long before committing
    pub state_confirmation_seconds: i64,
}

impl Default for StateTransitionConfig {
    fn default() -> Self {
        Self {
            report_on_warning_entry: true,
            report_on_critical_entry: true,
            report_on_critical_exit: true,
            report_on_normal_return: false,
            normal_cooldown_minutes: 60,
            warning_cooldown_minutes: 15,
            critical_cooldown_minutes: 5,
            state_confirmation_seconds: 30,
        }
    }
}

/// Auto-reporter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub enabled: bool,

    pub leaky_bucket: LeakyBucketConfig,
    pub adaptive_threshold: AdaptiveThresholdConfig,
    pub state_transition: StateTransitionConfig,

    /// Look-back window for the anomaly snapshot in reports
    pub anomaly_window_minutes: i64,

    /// Distinct sensor types in the window that force CRITICAL
    pub multi_sensor_threshold: usize,

    /// Optional working-hours gate, hours in [start, end)
    pub working_hours_only: bool,
    pub working_hours_start: u32,
    pub working_hours_end: u32,

    /// Dispatch queue capacity; oldest decisions dropped on overflow
    pub dispatch_queue_capacity: usize,

    /// Deadline for a single report dispatch
    pub dispatch_timeout_seconds: u64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            leaky_bucket: LeakyBucketConfig::default(),
            adaptive_threshold: AdaptiveThresholdConfig::default(),
            state_transition: StateTransitionConfig::default(),
            anomaly_window_minutes: 10,
            multi_sensor_threshold: 3,
            working_hours_only: false,
            working_hours_start: 8,
            working_hours_end: 18,
            dispatch_queue_capacity: 64,
            dispatch_timeout_seconds: 30,
        }
    }
}

/// API server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,

    /// Per-request ingest deadline
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_ms: 2000,
        }
    }
}

/// Log store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub log_dir: String,
    pub max_memory_logs: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            max_memory_logs: 1000,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            anomaly: DetectorConfig::default(),
            auto_reporting: ReportingConfig::default(),
            server: ServerConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("VIGIL_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Ok(port) = std::env::var("VIGIL_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(dir) = std::env::var("VIGIL_LOG_DIR") {
            self.logging.log_dir = dir;
        }
        if let Ok(size) = std::env::var("ANOMALY_WINDOW_SIZE") {
            if let Ok(s) = size.parse() {
                self.anomaly.window_size = s;
            }
        }
        if let Ok(threshold) = std::env::var("ANOMALY_Z_THRESHOLD") {
            if let Ok(t) = threshold.parse() {
                self.anomaly.z_score_threshold = t;
            }
        }
        if let Ok(points) = std::env::var("ANOMALY_MIN_POINTS") {
            if let Ok(p) = points.parse() {
                self.anomaly.min_data_points = p;
            }
        }
    }

    /// Load from file when present, fall back to defaults, then apply
    /// environment overrides and validate
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) if std::path::Path::new(p).exists() => Self::from_file(p)?,
            _ => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Validate all tunables; returns the first violation found
    pub fn validate(&self) -> Result<()> {
        self.anomaly.validate()?;
        self.auto_reporting.validate()?;
        Ok(())
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_size < 1 {
            return Err(VigilError::Validation(
                "window_size must be at least 1".into(),
            ));
        }
        if self.min_data_points < 2 {
            return Err(VigilError::Validation(
                "min_data_points must be at least 2".into(),
            ));
        }
        if self.min_training_size < self.min_data_points {
            return Err(VigilError::Validation(
                "min_training_size cannot be below min_data_points".into(),
            ));
        }
        if self.min_data_points > self.window_size {
            return Err(VigilError::Validation(
                "min_data_points cannot exceed window_size".into(),
            ));
        }
        if self.z_score_threshold <= 0.0 {
            return Err(VigilError::Validation(
                "z_score_threshold must be positive".into(),
            ));
        }
        for (sensor, over) in &self.sensors {
            if let Some(t) = over.threshold {
                if t <= 0.0 {
                    return Err(VigilError::Validation(format!(
                        "threshold override for '{sensor}' must be positive"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Effective z-score threshold for a sensor type
    pub fn threshold_for(&self, sensor_type: &str) -> f64 {
        self.sensors
            .get(sensor_type)
            .and_then(|s| s.threshold)
            .unwrap_or(self.z_score_threshold)
    }

    /// Effective training size for a sensor type
    pub fn training_size_for(&self, sensor_type: &str) -> usize {
        self.sensors
            .get(sensor_type)
            .and_then(|s| s.min_training_size)
            .unwrap_or(self.min_training_size)
    }
}

impl ReportingConfig {
    pub fn validate(&self) -> Result<()> {
        let lb = &self.leaky_bucket;
        if lb.max_bucket_capacity <= 0.0 {
            return Err(VigilError::Validation(
                "max_bucket_capacity must be positive".into(),
            ));
        }
        if lb.decay_rate < 0.0 {
            return Err(VigilError::Validation(
                "decay_rate cannot be negative".into(),
            ));
        }
        if lb.decay_interval_seconds <= 0.0 {
            return Err(VigilError::Validation(
                "decay_interval_seconds must be positive".into(),
            ));
        }
        for (name, points) in [
            ("critical_points", lb.critical_points),
            ("high_points", lb.high_points),
            ("medium_points", lb.medium_points),
            ("low_points", lb.low_points),
        ] {
            if points < 0.0 {
                return Err(VigilError::Validation(format!(
                    "{name} cannot be negative"
                )));
            }
        }

        let at = &self.adaptive_threshold;
        if at.base_warning_threshold <= 0.0 || at.base_critical_threshold <= 0.0 {
            return Err(VigilError::Validation(
                "base thresholds must be positive".into(),
            ));
        }
        if at.base_warning_threshold >= at.base_critical_threshold {
            return Err(VigilError::Validation(
                "base_warning_threshold must be below base_critical_threshold".into(),
            ));
        }
        if at.min_threshold_multiplier <= 0.0
            || at.min_threshold_multiplier > at.max_threshold_multiplier
        {
            return Err(VigilError::Validation(
                "threshold multipliers must satisfy 0 < min <= max".into(),
            ));
        }
        if !(0.0..1.0).contains(&at.hysteresis_margin) {
            return Err(VigilError::Validation(
                "hysteresis_margin must be in [0, 1)".into(),
            ));
        }
        if at.adaptation_gain < 0.0 {
            return Err(VigilError::Validation(
                "adaptation_gain cannot be negative".into(),
            ));
        }

        let st = &self.state_transition;
        if st.normal_cooldown_minutes < 0
            || st.warning_cooldown_minutes < 0
            || st.critical_cooldown_minutes < 0
        {
            return Err(VigilError::Validation(
                "cooldown minutes cannot be negative".into(),
            ));
        }
        if st.state_confirmation_seconds < 0 {
            return Err(VigilError::Validation(
                "state_confirmation_seconds cannot be negative".into(),
            ));
        }

        if self.anomaly_window_minutes < 1 {
            return Err(VigilError::Validation(
                "anomaly_window_minutes must be at least 1".into(),
            ));
        }
        if self.multi_sensor_threshold < 1 {
            return Err(VigilError::Validation(
                "multi_sensor_threshold must be at least 1".into(),
            ));
        }
        if self.working_hours_start >= 24
            || self.working_hours_end > 24
            || self.working_hours_start >= self.working_hours_end
        {
            return Err(VigilError::Validation(
                "working hours must satisfy 0 <= start < end <= 24".into(),
            ));
        }
        if self.dispatch_queue_capacity < 1 {
            return Err(VigilError::Validation(
                "dispatch_queue_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_small_min_data_points() {
        let mut config = AppConfig::default();
        config.anomaly.min_data_points = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_training_below_min_points() {
        let mut config = AppConfig::default();
        config.anomaly.min_data_points = 10;
        config.anomaly.min_training_size = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_min_points_above_window() {
        let mut config = AppConfig::default();
        config.anomaly.window_size = 5;
        config.anomaly.min_data_points = 6;
        config.anomaly.min_training_size = 6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_warning_at_or_above_critical() {
        let mut config = AppConfig::default();
        config.auto_reporting.adaptive_threshold.base_warning_threshold = 40.0;
        config.auto_reporting.adaptive_threshold.base_critical_threshold = 40.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_nonpositive_z_threshold() {
        let mut config = AppConfig::default();
        config.anomaly.z_score_threshold = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn per_sensor_override_wins() {
        let mut config = DetectorConfig::default();
        config.sensors.insert(
            "vibration".to_string(),
            SensorOverride {
                threshold: Some(3.5),
                min_training_size: Some(40),
            },
        );
        assert_eq!(config.threshold_for("vibration"), 3.5);
        assert_eq!(config.training_size_for("vibration"), 40);
        assert_eq!(config.threshold_for("temperature"), 2.0);
        assert_eq!(config.training_size_for("temperature"), 20);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "anomaly:\n  window_size: 50\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.anomaly.window_size, 50);
        assert_eq!(config.anomaly.min_data_points, 7);
        assert_eq!(config.server.port, 8080);
        assert!(config.auto_reporting.enabled);
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let config = AppConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config, back);
    }
}
