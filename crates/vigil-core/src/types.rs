use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sensor data point entering the pipeline
///
/// `sensor_type` is the partition key for the detector baseline;
/// `sensor_id` is opaque to the core and only carried through for logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: String,
    pub sensor_type: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

/// Anomaly severity assigned by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Normal,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "Normal",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }

    /// Rank for comparisons, lowest to highest
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Normal => 0,
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
        }
    }
}

/// Per-sensor warm-up phase of the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemStatus {
    Initializing,
    Learning,
    Active,
}

impl SystemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemStatus::Initializing => "Initializing",
            SystemStatus::Learning => "Learning",
            SystemStatus::Active => "Active",
        }
    }
}

/// The detector's verdict for a single reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub sensor_id: String,
    pub sensor_type: String,
    pub current_value: f64,
    pub unit: String,
    pub mean: f64,
    pub std_dev: f64,
    pub z_score: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
    pub is_anomaly: bool,
    pub severity: Severity,
    pub system_status: SystemStatus,
    pub window_size: usize,
    pub message: String,
}

impl AnomalyResult {
    /// Human-readable summary used by the log store and notifiers
    pub fn build_message(&self, min_data_points: usize) -> String {
        match self.system_status {
            SystemStatus::Initializing => format!(
                "Collecting baseline [{}]: {}/{} samples",
                self.sensor_type, self.window_size, min_data_points
            ),
            SystemStatus::Learning => format!(
                "Learning baseline [{}]: value {}",
                self.sensor_type, self.current_value
            ),
            SystemStatus::Active if self.is_anomaly => format!(
                "ANOMALY DETECTED [{}]: value {}, expected {:.2} +/- {:.2}, z-score {:.2}",
                self.sensor_type, self.current_value, self.mean, self.std_dev, self.z_score
            ),
            SystemStatus::Active => format!(
                "Normal behaviour [{}]: value {}, z-score {:.2}",
                self.sensor_type, self.current_value, self.z_score
            ),
        }
    }
}

/// Overall system state driven by the leaky-bucket score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SystemState {
    Normal,
    Warning,
    Critical,
}

impl SystemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemState::Normal => "NORMAL",
            SystemState::Warning => "WARNING",
            SystemState::Critical => "CRITICAL",
        }
    }

    /// Total order by severity, lowest to highest
    pub fn severity_order(&self) -> u8 {
        match self {
            SystemState::Normal => 0,
            SystemState::Warning => 1,
            SystemState::Critical => 2,
        }
    }
}

impl std::fmt::Display for SystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk classification carried by report decisions and payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
            RiskLevel::Critical => 3,
        }
    }

    /// Highest of two risk levels
    pub fn max(self, other: RiskLevel) -> RiskLevel {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

impl From<Severity> for RiskLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Normal | Severity::Low => RiskLevel::Low,
            Severity::Medium => RiskLevel::Medium,
            Severity::High => RiskLevel::High,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which state-machine edge produced a report decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    CriticalEntry,
    WarningEntry,
    CriticalExit,
    NormalReturn,
    MultiSensor,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::CriticalEntry => "critical_entry",
            TriggerType::WarningEntry => "warning_entry",
            TriggerType::CriticalExit => "critical_exit",
            TriggerType::NormalReturn => "normal_return",
            TriggerType::MultiSensor => "multi_sensor",
        }
    }
}

/// One committed state-machine transition, kept in a bounded history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: SystemState,
    pub to_state: SystemState,
    pub at: DateTime<Utc>,
    pub bucket_score: f64,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    pub trigger_reason: String,
    pub anomaly_count: usize,
    pub affected_sensors: Vec<String>,
}

/// Output of the auto-reporter instructing the dispatcher to send a report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDecision {
    pub should_report: bool,
    pub reason: String,
    pub risk_level: RiskLevel,
    pub trigger_type: TriggerType,
    pub current_state: SystemState,
    pub previous_state: SystemState,
    pub bucket_score: f64,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    pub anomaly_count: usize,
    pub affected_sensors: Vec<String>,
    /// Snapshot of the anomaly buffer within the reporting window
    pub anomalies: Vec<AnomalyResult>,
}

/// Assembled report handed to the mail adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPayload {
    pub report_id: String,
    pub generated_at: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_anomalies: usize,
    pub anomalies: Vec<AnomalyResult>,
    pub affected_sensors: Vec<String>,
    pub risk_level: RiskLevel,
    pub reason: String,
    pub trigger_type: TriggerType,
    /// LLM commentary, or the deterministic fallback summary
    pub narrative: String,
    /// One-line group-by-sensor digest
    pub summary: String,
}

impl ReportPayload {
    /// Timestamp-derived report identifier
    pub fn make_report_id(at: DateTime<Utc>) -> String {
        format!("RPT-{}", at.format("%Y%m%d%H%M%S"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ranks_are_ordered() {
        assert!(Severity::High.rank() > Severity::Medium.rank());
        assert!(Severity::Medium.rank() > Severity::Low.rank());
        assert!(Severity::Low.rank() > Severity::Normal.rank());
    }

    #[test]
    fn risk_level_max_picks_higher() {
        assert_eq!(RiskLevel::Low.max(RiskLevel::Critical), RiskLevel::Critical);
        assert_eq!(RiskLevel::High.max(RiskLevel::Medium), RiskLevel::High);
    }

    #[test]
    fn system_state_serializes_uppercase() {
        let json = serde_json::to_string(&SystemState::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
    }

    #[test]
    fn trigger_type_serializes_snake_case() {
        let json = serde_json::to_string(&TriggerType::CriticalEntry).unwrap();
        assert_eq!(json, "\"critical_entry\"");
    }

    #[test]
    fn report_id_is_timestamp_derived() {
        let at = DateTime::parse_from_rfc3339("2024-03-01T12:30:45Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(ReportPayload::make_report_id(at), "RPT-20240301123045");
    }
}
