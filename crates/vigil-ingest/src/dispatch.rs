use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{info, warn};

use vigil_core::types::{AnomalyResult, ReportDecision, ReportPayload};
use vigil_core::{MailSender, Narrator};
use vigil_report::AutoReporter;

use crate::coordinator::ConfigHandle;

/// Bounded decision queue with drop-oldest overflow
///
/// The ingest path pushes without ever blocking; the dispatcher task is
/// the single consumer. Overflow is counted but never surfaced to ingest
/// callers.
pub struct DispatchQueue {
    inner: Mutex<VecDeque<ReportDecision>>,
    notify: Notify,
    capacity: usize,
    overflow: AtomicU64,
}

impl DispatchQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            overflow: AtomicU64::new(0),
        }
    }

    /// Enqueue a decision, evicting the oldest entry when full
    pub async fn push(&self, decision: ReportDecision) {
        {
            let mut queue = self.inner.lock().await;
            if queue.len() >= self.capacity {
                queue.pop_front();
                self.overflow.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("vigil_dispatch_overflow_total").increment(1);
                warn!("Dispatch queue full, dropped oldest decision");
            }
            queue.push_back(decision);
        }
        self.notify.notify_one();
    }

    /// Wait for the next decision
    pub async fn pop(&self) -> ReportDecision {
        loop {
            if let Some(decision) = self.inner.lock().await.pop_front() {
                return decision;
            }
            self.notify.notified().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }
}

/// Dispatch outcome counters, surfaced through the status endpoint
#[derive(Debug, Default)]
pub struct DispatchCounters {
    pub dispatched: AtomicU64,
    pub failed: AtomicU64,
}

/// Serializable view of the counters
#[derive(Debug, Clone, Serialize)]
pub struct DispatchSnapshot {
    pub reports_dispatched: u64,
    pub reports_failed: u64,
    pub queue_overflow: u64,
}

impl DispatchCounters {
    pub fn snapshot(&self, queue: &DispatchQueue) -> DispatchSnapshot {
        DispatchSnapshot {
            reports_dispatched: self.dispatched.load(Ordering::Relaxed),
            reports_failed: self.failed.load(Ordering::Relaxed),
            queue_overflow: queue.overflow_count(),
        }
    }
}

/// Deterministic group-by-sensor digest, used when no narrative
/// generator is configured or it fails
pub fn fallback_summary(anomalies: &[AnomalyResult]) -> String {
    if anomalies.is_empty() {
        return "No anomalies in the reporting window.".to_string();
    }

    let mut order: Vec<String> = Vec::new();
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for a in anomalies {
        if !counts.contains_key(&a.sensor_type) {
            order.push(a.sensor_type.clone());
        }
        *counts.entry(a.sensor_type.clone()).or_insert(0) += 1;
    }

    let per_sensor: Vec<String> = order
        .iter()
        .map(|s| format!("{} ({})", s, counts[s]))
        .collect();

    format!(
        "{} anomalies across {} sensors: {}",
        anomalies.len(),
        order.len(),
        per_sensor.join(", ")
    )
}

/// Consumes decisions one at a time and hands assembled reports to the
/// mail adapter
///
/// Success marks the report triggered on the reporter; failure or a
/// dispatch timeout clears the in-flight flag so future decisions can
/// re-trigger naturally. No automatic retry.
pub struct ReportDispatcher {
    config: ConfigHandle,
    queue: Arc<DispatchQueue>,
    reporter: Arc<Mutex<AutoReporter>>,
    mailer: Arc<dyn MailSender>,
    narrator: Option<Arc<dyn Narrator>>,
    counters: Arc<DispatchCounters>,
}

impl ReportDispatcher {
    pub fn new(
        config: ConfigHandle,
        queue: Arc<DispatchQueue>,
        reporter: Arc<Mutex<AutoReporter>>,
        mailer: Arc<dyn MailSender>,
        narrator: Option<Arc<dyn Narrator>>,
        counters: Arc<DispatchCounters>,
    ) -> Self {
        Self {
            config,
            queue,
            reporter,
            mailer,
            narrator,
            counters,
        }
    }

    /// Run the dispatch loop; intended for `tokio::spawn`
    pub async fn run(self) {
        info!("Report dispatcher started");
        loop {
            let decision = self.queue.pop().await;
            self.handle(decision).await;
        }
    }

    async fn handle(&self, decision: ReportDecision) {
        let timeout_secs = {
            let config = self.config.read().await;
            config.auto_reporting.dispatch_timeout_seconds
        };

        let outcome = tokio::time::timeout(Duration::from_secs(timeout_secs), async {
            let payload = self.assemble(&decision).await;
            self.mailer.send(&payload).await
        })
        .await;

        match outcome {
            Ok(Ok(())) => {
                self.reporter.lock().await.mark_report_triggered(&decision);
                self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("vigil_reports_dispatched_total").increment(1);
                info!(trigger = decision.trigger_type.as_str(), "Report dispatched");
            }
            Ok(Err(e)) => {
                self.reporter.lock().await.clear_report_pending();
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("vigil_reports_failed_total").increment(1);
                warn!(error = %e, "Report dispatch failed");
            }
            Err(_) => {
                self.reporter.lock().await.clear_report_pending();
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("vigil_reports_failed_total").increment(1);
                warn!(timeout_secs, "Report dispatch timed out");
            }
        }
    }

    async fn assemble(&self, decision: &ReportDecision) -> ReportPayload {
        let now = Utc::now();
        let window_minutes = {
            let config = self.config.read().await;
            config.auto_reporting.anomaly_window_minutes
        };

        let anomalies = decision.anomalies.clone();
        let summary = fallback_summary(&anomalies);

        let narrative = match &self.narrator {
            Some(narrator) => match narrator.summarize(&anomalies).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Narrative generation failed, using fallback summary");
                    summary.clone()
                }
            },
            None => summary.clone(),
        };

        ReportPayload {
            report_id: ReportPayload::make_report_id(now),
            generated_at: now,
            period_start: now - ChronoDuration::minutes(window_minutes),
            period_end: now,
            total_anomalies: anomalies.len(),
            anomalies,
            affected_sensors: decision.affected_sensors.clone(),
            risk_level: decision.risk_level,
            reason: decision.reason.clone(),
            trigger_type: decision.trigger_type,
            narrative,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vigil_core::types::{Severity, SystemStatus};

    fn anomaly(sensor_type: &str) -> AnomalyResult {
        AnomalyResult {
            sensor_id: "S1".to_string(),
            sensor_type: sensor_type.to_string(),
            current_value: 1.0,
            unit: "u".to_string(),
            mean: 0.0,
            std_dev: 1.0,
            z_score: 4.0,
            threshold: 2.0,
            timestamp: Utc::now(),
            is_anomaly: true,
            severity: Severity::High,
            system_status: SystemStatus::Active,
            window_size: 10,
            message: String::new(),
        }
    }

    fn decision(n: usize) -> ReportDecision {
        ReportDecision {
            should_report: true,
            reason: format!("decision {n}"),
            risk_level: vigil_core::types::RiskLevel::Critical,
            trigger_type: vigil_core::types::TriggerType::CriticalEntry,
            current_state: vigil_core::types::SystemState::Critical,
            previous_state: vigil_core::types::SystemState::Normal,
            bucket_score: 30.0,
            warning_threshold: 20.0,
            critical_threshold: 30.0,
            anomaly_count: 1,
            affected_sensors: vec!["t".to_string()],
            anomalies: vec![anomaly("t")],
        }
    }

    #[test]
    fn fallback_summary_groups_by_sensor() {
        let anomalies = vec![anomaly("temp"), anomaly("temp"), anomaly("pressure")];
        let summary = fallback_summary(&anomalies);
        assert_eq!(
            summary,
            "3 anomalies across 2 sensors: temp (2), pressure (1)"
        );
    }

    #[test]
    fn fallback_summary_handles_empty_window() {
        assert_eq!(
            fallback_summary(&[]),
            "No anomalies in the reporting window."
        );
    }

    #[tokio::test]
    async fn queue_drops_oldest_on_overflow() {
        let queue = DispatchQueue::new(2);
        queue.push(decision(1)).await;
        queue.push(decision(2)).await;
        queue.push(decision(3)).await;

        assert_eq!(queue.len().await, 2);
        assert_eq!(queue.overflow_count(), 1);
        assert_eq!(queue.pop().await.reason, "decision 2");
        assert_eq!(queue.pop().await.reason, "decision 3");
    }

    #[tokio::test]
    async fn queue_pop_waits_for_push() {
        let queue = Arc::new(DispatchQueue::new(4));

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(decision(7)).await;

        let popped = consumer.await.unwrap();
        assert_eq!(popped.reason, "decision 7");
    }
}
