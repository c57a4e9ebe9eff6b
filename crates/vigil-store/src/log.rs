use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

use vigil_core::types::AnomalyResult;
use vigil_core::{Result, VigilError};

const READINGS_FILE: &str = "all_readings.csv";
const ANOMALIES_FILE: &str = "anomalies.csv";

const READINGS_HEADER: [&str; 11] = [
    "timestamp",
    "sensor_id",
    "sensor_type",
    "value",
    "unit",
    "mean",
    "std_dev",
    "z_score",
    "threshold",
    "is_anomaly",
    "severity",
];

const ANOMALIES_HEADER: [&str; 11] = [
    "timestamp",
    "sensor_id",
    "sensor_type",
    "value",
    "unit",
    "mean",
    "std_dev",
    "z_score",
    "threshold",
    "severity",
    "message",
];

/// Persistent + in-memory store for detector results
///
/// Ring buffers hold the last `max_memory_logs` results (all and
/// anomalies-only); file handles stay open for the process lifetime and
/// every append is flushed. Persistence failures surface as
/// `Unavailable` and are swallowed by the ingest path.
pub struct LogStore {
    inner: Mutex<Inner>,
    readings_path: PathBuf,
    anomalies_path: PathBuf,
}

struct Inner {
    recent: VecDeque<AnomalyResult>,
    anomalies: VecDeque<AnomalyResult>,
    max_memory: usize,
    readings_writer: csv::Writer<File>,
    anomalies_writer: csv::Writer<File>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogStats {
    pub total_readings_in_memory: usize,
    pub total_anomalies_in_memory: usize,
    pub anomaly_rate: f64,
    pub readings_file: String,
    pub anomalies_file: String,
}

#[derive(Serialize)]
struct ReadingRow<'a> {
    timestamp: String,
    sensor_id: &'a str,
    sensor_type: &'a str,
    value: f64,
    unit: &'a str,
    mean: f64,
    std_dev: f64,
    z_score: f64,
    threshold: f64,
    is_anomaly: bool,
    severity: &'a str,
}

#[derive(Serialize)]
struct AnomalyRow<'a> {
    timestamp: String,
    sensor_id: &'a str,
    sensor_type: &'a str,
    value: f64,
    unit: &'a str,
    mean: f64,
    std_dev: f64,
    z_score: f64,
    threshold: f64,
    severity: &'a str,
    message: &'a str,
}

impl LogStore {
    /// Open (or create) the log directory and both CSV files
    pub fn new(log_dir: impl AsRef<Path>, max_memory: usize) -> anyhow::Result<Self> {
        let log_dir = log_dir.as_ref();
        std::fs::create_dir_all(log_dir)?;

        let readings_path = log_dir.join(READINGS_FILE);
        let anomalies_path = log_dir.join(ANOMALIES_FILE);

        let readings_writer = Self::open_csv(&readings_path, &READINGS_HEADER)?;
        let anomalies_writer = Self::open_csv(&anomalies_path, &ANOMALIES_HEADER)?;

        info!(dir = %log_dir.display(), "Log store opened");

        Ok(Self {
            inner: Mutex::new(Inner {
                recent: VecDeque::with_capacity(max_memory),
                anomalies: VecDeque::with_capacity(max_memory),
                max_memory,
                readings_writer,
                anomalies_writer,
            }),
            readings_path,
            anomalies_path,
        })
    }

    fn open_csv(path: &Path, header: &[&str]) -> anyhow::Result<csv::Writer<File>> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_new = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(header)?;
            writer.flush()?;
        }
        Ok(writer)
    }

    /// Append one result to memory and disk, flushing the file
    pub async fn log(&self, result: &AnomalyResult) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if inner.recent.len() >= inner.max_memory {
            inner.recent.pop_front();
        }
        inner.recent.push_back(result.clone());

        if result.is_anomaly {
            if inner.anomalies.len() >= inner.max_memory {
                inner.anomalies.pop_front();
            }
            inner.anomalies.push_back(result.clone());
        }

        inner.write_reading(result)?;
        if result.is_anomaly {
            inner.write_anomaly(result)?;
        }
        Ok(())
    }

    /// Last `limit` results, oldest first
    pub async fn recent(&self, limit: usize) -> Vec<AnomalyResult> {
        let inner = self.inner.lock().await;
        let skip = inner.recent.len().saturating_sub(limit);
        inner.recent.iter().skip(skip).cloned().collect()
    }

    /// Last `limit` anomalies, oldest first
    pub async fn anomalies(&self, limit: usize) -> Vec<AnomalyResult> {
        let inner = self.inner.lock().await;
        let skip = inner.anomalies.len().saturating_sub(limit);
        inner.anomalies.iter().skip(skip).cloned().collect()
    }

    /// Last `limit` results grouped by sensor type
    pub async fn recent_grouped(&self, limit: usize) -> HashMap<String, Vec<AnomalyResult>> {
        let mut grouped: HashMap<String, Vec<AnomalyResult>> = HashMap::new();
        for result in self.recent(limit).await {
            grouped
                .entry(result.sensor_type.clone())
                .or_default()
                .push(result);
        }
        grouped
    }

    pub async fn stats(&self) -> LogStats {
        let inner = self.inner.lock().await;
        let total = inner.recent.len();
        let anomalies = inner.anomalies.len();
        LogStats {
            total_readings_in_memory: total,
            total_anomalies_in_memory: anomalies,
            anomaly_rate: if total > 0 {
                anomalies as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            readings_file: self.readings_path.display().to_string(),
            anomalies_file: self.anomalies_path.display().to_string(),
        }
    }

    /// Drop the in-memory buffers; files are untouched
    pub async fn clear_memory(&self) {
        let mut inner = self.inner.lock().await;
        inner.recent.clear();
        inner.anomalies.clear();
    }
}

impl Inner {
    fn write_reading(&mut self, result: &AnomalyResult) -> Result<()> {
        let row = ReadingRow {
            timestamp: result.timestamp.to_rfc3339(),
            sensor_id: &result.sensor_id,
            sensor_type: &result.sensor_type,
            value: result.current_value,
            unit: &result.unit,
            mean: result.mean,
            std_dev: result.std_dev,
            z_score: result.z_score,
            threshold: result.threshold,
            is_anomaly: result.is_anomaly,
            severity: result.severity.as_str(),
        };
        self.readings_writer
            .serialize(row)
            .and_then(|_| self.readings_writer.flush().map_err(csv::Error::from))
            .map_err(|e| VigilError::Unavailable(format!("readings log write failed: {e}")))
    }

    fn write_anomaly(&mut self, result: &AnomalyResult) -> Result<()> {
        let row = AnomalyRow {
            timestamp: result.timestamp.to_rfc3339(),
            sensor_id: &result.sensor_id,
            sensor_type: &result.sensor_type,
            value: result.current_value,
            unit: &result.unit,
            mean: result.mean,
            std_dev: result.std_dev,
            z_score: result.z_score,
            threshold: result.threshold,
            severity: result.severity.as_str(),
            message: &result.message,
        };
        self.anomalies_writer
            .serialize(row)
            .and_then(|_| self.anomalies_writer.flush().map_err(csv::Error::from))
            .map_err(|e| VigilError::Unavailable(format!("anomaly log write failed: {e}")))
    }
}
