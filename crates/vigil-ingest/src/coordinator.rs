use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use vigil_core::types::{AnomalyResult, Reading};
use vigil_core::{AppConfig, BroadcastHub, ReportingConfig, Result, VigilError};
use vigil_detect::{Detector, DetectorStats};
use vigil_report::{AutoReporter, ReporterStatus};
use vigil_store::{LogStats, LogStore};

use crate::dispatch::{DispatchCounters, DispatchQueue, DispatchSnapshot};

/// Shared read-mostly configuration snapshot
pub type ConfigHandle = Arc<RwLock<Arc<AppConfig>>>;

/// Health summary for the transport adapter
#[derive(Debug, Clone, Serialize)]
pub struct HealthInfo {
    pub status: &'static str,
    pub active_sensors: usize,
}

/// Reporter status extended with dispatch counters
#[derive(Debug, Clone, Serialize)]
pub struct AutoReportStatus {
    #[serde(flatten)]
    pub reporter: ReporterStatus,
    pub dispatch: DispatchSnapshot,
}

/// Single entry point of the core pipeline
///
/// Owns the detector, auto-reporter, log store, broadcast hub and the
/// dispatch queue. The mutable detector and reporter paths are each
/// serialised behind one mutex; readings for the same sensor type are
/// therefore processed in arrival order with linearised effects.
pub struct IngestCoordinator {
    config: ConfigHandle,
    detector: Mutex<Detector>,
    reporter: Arc<Mutex<AutoReporter>>,
    log: Arc<LogStore>,
    hub: Arc<BroadcastHub>,
    dispatch_queue: Arc<DispatchQueue>,
    dispatch_counters: Arc<DispatchCounters>,
}

impl IngestCoordinator {
    pub fn new(config: AppConfig, log: Arc<LogStore>) -> Self {
        let detector = Detector::new(config.anomaly.clone());
        let reporter = AutoReporter::new(config.auto_reporting.clone());
        let dispatch_queue = Arc::new(DispatchQueue::new(
            config.auto_reporting.dispatch_queue_capacity,
        ));

        Self {
            config: Arc::new(RwLock::new(Arc::new(config))),
            detector: Mutex::new(detector),
            reporter: Arc::new(Mutex::new(reporter)),
            log,
            hub: Arc::new(BroadcastHub::new()),
            dispatch_queue,
            dispatch_counters: Arc::new(DispatchCounters::default()),
        }
    }

    pub fn config_handle(&self) -> ConfigHandle {
        self.config.clone()
    }

    pub fn reporter_handle(&self) -> Arc<Mutex<AutoReporter>> {
        self.reporter.clone()
    }

    pub fn dispatch_queue(&self) -> Arc<DispatchQueue> {
        self.dispatch_queue.clone()
    }

    pub fn dispatch_counters(&self) -> Arc<DispatchCounters> {
        self.dispatch_counters.clone()
    }

    /// Ingest without a deadline
    pub async fn ingest(&self, reading: Reading) -> Result<AnomalyResult> {
        self.ingest_with_deadline(reading, None).await
    }

    /// Validate, evaluate, log, broadcast, observe; strict order
    ///
    /// A missed deadline aborts before persistence with a timeout error;
    /// the window mutation from evaluation is not rolled back.
    pub async fn ingest_with_deadline(
        &self,
        reading: Reading,
        deadline: Option<Instant>,
    ) -> Result<AnomalyResult> {
        Self::validate(&reading)?;

        let result = {
            let mut detector = self.detector.lock().await;
            detector.evaluate(&reading)
        };
        metrics::counter!("vigil_ingest_readings_total").increment(1);

        if let Some(deadline) = deadline {
            if Instant::now() > deadline {
                metrics::counter!("vigil_ingest_timeouts_total").increment(1);
                return Err(VigilError::Timeout(
                    "ingest deadline exceeded after evaluation".into(),
                ));
            }
        }

        // Best effort: persistence failures never fail the ingest
        if let Err(e) = self.log.log(&result).await {
            warn!(error = %e, "Failed to persist result");
            metrics::counter!("vigil_log_write_errors_total").increment(1);
        }

        self.hub.broadcast(&result).await;

        if result.is_anomaly {
            let decision = {
                let mut reporter = self.reporter.lock().await;
                reporter.observe(&result)
            };
            if let Some(decision) = decision {
                debug!(trigger = decision.trigger_type.as_str(), "Queueing report decision");
                self.dispatch_queue.push(decision).await;
            }
        }

        Ok(result)
    }

    fn validate(reading: &Reading) -> Result<()> {
        if reading.sensor_type.trim().is_empty() {
            metrics::counter!("vigil_ingest_validation_errors_total").increment(1);
            return Err(VigilError::Validation("sensor_type must not be empty".into()));
        }
        if !reading.value.is_finite() {
            metrics::counter!("vigil_ingest_validation_errors_total").increment(1);
            return Err(VigilError::Validation("value must be finite".into()));
        }
        Ok(())
    }

    /// Per-sensor statistics rollup
    pub async fn stats(&self) -> DetectorStats {
        self.detector.lock().await.stats_summary()
    }

    /// Last-N readings grouped by sensor type
    pub async fn history(&self, limit: usize) -> HashMap<String, Vec<AnomalyResult>> {
        self.log.recent_grouped(limit).await
    }

    /// Recent anomalies from the log buffer
    pub async fn recent_anomalies(&self, limit: usize) -> Vec<AnomalyResult> {
        self.log.anomalies(limit).await
    }

    pub async fn log_stats(&self) -> LogStats {
        self.log.stats().await
    }

    /// Current configuration snapshot
    pub async fn config(&self) -> Arc<AppConfig> {
        self.config.read().await.clone()
    }

    /// Validate and apply a full configuration atomically
    ///
    /// A changed `anomaly` section migrates the detector windows into the
    /// new capacity; a changed `auto_reporting` section is applied with
    /// the reporter's structural-reset rule.
    pub async fn update_config(&self, new: AppConfig) -> Result<()> {
        new.validate()?;
        let current = self.config.read().await.clone();

        if new.anomaly != current.anomaly {
            let mut detector = self.detector.lock().await;
            *detector = detector.migrate(new.anomaly.clone());
        }
        if new.auto_reporting != current.auto_reporting {
            let mut reporter = self.reporter.lock().await;
            reporter.apply_config(new.auto_reporting.clone());
        }

        *self.config.write().await = Arc::new(new);
        Ok(())
    }

    /// Validate and apply only the reporting section
    pub async fn update_reporting(&self, reporting: ReportingConfig) -> Result<()> {
        reporting.validate()?;

        {
            let mut reporter = self.reporter.lock().await;
            reporter.apply_config(reporting.clone());
        }

        let mut config = self.config.write().await;
        let mut updated = (**config).clone();
        updated.auto_reporting = reporting;
        *config = Arc::new(updated);
        Ok(())
    }

    /// Clear all windows and the anomaly buffer; reset the leaky bucket
    /// and state machine. Persisted files are untouched.
    pub async fn reset(&self) {
        self.detector.lock().await.clear();
        self.reporter.lock().await.reset();
    }

    pub async fn auto_report_status(&self) -> AutoReportStatus {
        let reporter = self.reporter.lock().await.status();
        AutoReportStatus {
            reporter,
            dispatch: self.dispatch_counters.snapshot(&self.dispatch_queue),
        }
    }

    pub async fn clear_reporter_buffer(&self) {
        self.reporter.lock().await.clear_buffer();
    }

    /// Register a real-time subscriber
    pub async fn subscribe(&self) -> (Uuid, mpsc::Receiver<AnomalyResult>) {
        self.hub.subscribe().await
    }

    pub async fn unsubscribe(&self, id: Uuid) {
        self.hub.unsubscribe(id).await
    }

    pub async fn health(&self) -> HealthInfo {
        HealthInfo {
            status: "healthy",
            active_sensors: self.detector.lock().await.active_sensors(),
        }
    }
}
