use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use vigil_core::types::{
    AnomalyResult, ReportDecision, RiskLevel, StateTransition, SystemState, TriggerType,
};
use vigil_core::ReportingConfig;

use crate::bucket::{BucketStatus, LeakyBucket};
use crate::state::{StateInput, StateMachine};
use crate::threshold::{AdaptiveThreshold, ThresholdStatus};

/// Anomaly ring buffer capacity
const ANOMALY_BUFFER_CAP: usize = 1000;

/// State-based auto-reporter
///
/// Every anomalous detector result adds to the leaky bucket; the score
/// drives the state machine through adaptive, hysteresis-guarded
/// thresholds. Reports are emitted only on configured state-transition
/// edges, then filtered through per-state cooldowns, the optional
/// working-hours gate and single-in-flight duplicate suppression.
pub struct AutoReporter {
    config: ReportingConfig,
    bucket: LeakyBucket,
    thresholds: AdaptiveThreshold,
    state: StateMachine,
    buffer: VecDeque<BufferedAnomaly>,
    last_report_times: Vec<(SystemState, DateTime<Utc>)>,
    report_pending: bool,
    stats: ReporterStats,
}

#[derive(Debug, Clone)]
struct BufferedAnomaly {
    result: AnomalyResult,
    added_at: DateTime<Utc>,
}

/// Counters kept for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ReporterStats {
    pub total_anomalies_processed: u64,
    pub reports_sent: u64,
    pub reports_skipped_cooldown: u64,
    pub state_transitions: u64,
    pub last_report_sent: Option<DateTime<Utc>>,
    pub last_state_change: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
}

/// Full status snapshot for the reporter surface
#[derive(Debug, Clone, Serialize)]
pub struct ReporterStatus {
    pub enabled: bool,
    pub current_state: SystemState,
    pub pending_state: Option<SystemState>,
    pub bucket: BucketStatus,
    pub thresholds: ThresholdStatus,
    pub buffer_size: usize,
    pub report_pending: bool,
    #[serde(flatten)]
    pub stats: ReporterStats,
}

impl AutoReporter {
    pub fn new(config: ReportingConfig) -> Self {
        let bucket = LeakyBucket::new(config.leaky_bucket.clone());
        let thresholds = AdaptiveThreshold::new(config.adaptive_threshold.clone());
        let state = StateMachine::new(config.state_transition.clone());

        info!(
            warning = config.adaptive_threshold.base_warning_threshold,
            critical = config.adaptive_threshold.base_critical_threshold,
            decay_per_minute = config.leaky_bucket.decay_rate,
            "Auto-reporter started"
        );

        Self {
            config,
            bucket,
            thresholds,
            state,
            buffer: VecDeque::with_capacity(ANOMALY_BUFFER_CAP),
            last_report_times: Vec::new(),
            report_pending: false,
            stats: ReporterStats {
                total_anomalies_processed: 0,
                reports_sent: 0,
                reports_skipped_cooldown: 0,
                state_transitions: 0,
                last_report_sent: None,
                last_state_change: None,
                started_at: Utc::now(),
            },
        }
    }

    pub fn current_state(&self) -> SystemState {
        self.state.current()
    }

    pub fn bucket_score(&mut self) -> f64 {
        self.bucket.score()
    }

    /// Evaluate an anomalous result against the reporting policy
    ///
    /// Returns a decision when a report should go out; the caller owns
    /// dispatch and must call [`mark_report_triggered`] (or
    /// [`clear_report_pending`] on failure) afterwards.
    ///
    /// [`mark_report_triggered`]: AutoReporter::mark_report_triggered
    /// [`clear_report_pending`]: AutoReporter::clear_report_pending
    pub fn observe(&mut self, result: &AnomalyResult) -> Option<ReportDecision> {
        self.observe_at(result, Utc::now())
    }

    pub(crate) fn observe_at(
        &mut self,
        result: &AnomalyResult,
        now: DateTime<Utc>,
    ) -> Option<ReportDecision> {
        if !result.is_anomaly || !self.config.enabled {
            return None;
        }

        self.stats.total_anomalies_processed += 1;

        if self.buffer.len() >= ANOMALY_BUFFER_CAP {
            self.buffer.pop_front();
        }
        self.buffer.push_back(BufferedAnomaly {
            result: result.clone(),
            added_at: now,
        });

        let risk = Self::classify_risk(result);
        self.bucket.add_at(risk, now);
        let score = self.bucket.score_at(now);
        self.thresholds.record_score_at(score, now);

        let recent = self.recent_anomalies_at(now);
        let affected = Self::distinct_sensors(&recent);

        let (warning_th, critical_th) = self.thresholds.thresholds_for(self.state.current());
        let transition = self.state.drive_at(
            StateInput {
                score,
                warning_threshold: warning_th,
                critical_threshold: critical_th,
                anomaly_count: recent.len(),
                affected_sensors: affected.clone(),
                multi_sensor: affected.len() >= self.config.multi_sensor_threshold,
            },
            now,
        )?;

        self.stats.state_transitions += 1;
        self.stats.last_state_change = Some(now);

        let decision = self.decision_for(&transition, recent)?;

        if self.in_cooldown(decision.current_state, now) {
            self.stats.reports_skipped_cooldown += 1;
            metrics::counter!("vigil_reports_skipped_cooldown_total").increment(1);
            info!(state = %decision.current_state, "Report suppressed by cooldown");
            return None;
        }

        if !self.working_hours_ok(now) {
            info!("Report suppressed outside working hours");
            return None;
        }

        if self.report_pending {
            debug!("Report already in flight, suppressing duplicate");
            return None;
        }
        self.report_pending = true;

        warn!(
            reason = %decision.reason,
            from = %decision.previous_state,
            to = %decision.current_state,
            score = decision.bucket_score,
            "Report decision emitted"
        );

        Some(decision)
    }

    /// Bucket severity derived from |z|, lifted to the result's own
    /// severity when that is higher
    fn classify_risk(result: &AnomalyResult) -> RiskLevel {
        let z = result.z_score.abs();
        let from_z = if z > 4.0 {
            RiskLevel::Critical
        } else if z > 3.5 {
            RiskLevel::High
        } else if z > 2.5 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };
        from_z.max(RiskLevel::from(result.severity))
    }

    fn decision_for(
        &self,
        transition: &StateTransition,
        recent: Vec<AnomalyResult>,
    ) -> Option<ReportDecision> {
        let st = &self.config.state_transition;
        let from = transition.from_state;
        let to = transition.to_state;

        let (trigger_type, reason) = if to == SystemState::Critical && from != SystemState::Critical
        {
            if !st.report_on_critical_entry {
                return None;
            }
            (
                TriggerType::CriticalEntry,
                format!(
                    "Entered CRITICAL: score {:.1} >= {:.1}",
                    transition.bucket_score, transition.critical_threshold
                ),
            )
        } else if to == SystemState::Warning && from == SystemState::Normal {
            if !st.report_on_warning_entry {
                return None;
            }
            (
                TriggerType::WarningEntry,
                format!(
                    "Entered WARNING: score {:.1} >= {:.1}",
                    transition.bucket_score, transition.warning_threshold
                ),
            )
        } else if from == SystemState::Critical && to != SystemState::Critical {
            if !st.report_on_critical_exit {
                return None;
            }
            (
                TriggerType::CriticalExit,
                format!("Left CRITICAL ({} -> {})", from, to),
            )
        } else if to == SystemState::Normal && from != SystemState::Normal {
            if !st.report_on_normal_return {
                return None;
            }
            (
                TriggerType::NormalReturn,
                format!("Returned to NORMAL ({} -> {})", from, to),
            )
        } else {
            return None;
        };

        let risk_level = match to {
            SystemState::Critical => RiskLevel::Critical,
            SystemState::Warning => RiskLevel::High,
            SystemState::Normal => RiskLevel::Low,
        };

        Some(ReportDecision {
            should_report: true,
            reason,
            risk_level,
            trigger_type,
            current_state: to,
            previous_state: from,
            bucket_score: transition.bucket_score,
            warning_threshold: transition.warning_threshold,
            critical_threshold: transition.critical_threshold,
            anomaly_count: recent.len(),
            affected_sensors: transition.affected_sensors.clone(),
            anomalies: recent,
        })
    }

    fn cooldown_minutes(&self, state: SystemState) -> i64 {
        let st = &self.config.state_transition;
        match state {
            SystemState::Normal => st.normal_cooldown_minutes,
            SystemState::Warning => st.warning_cooldown_minutes,
            SystemState::Critical => st.critical_cooldown_minutes,
        }
    }

    fn in_cooldown(&self, state: SystemState, now: DateTime<Utc>) -> bool {
        let Some((_, last)) = self.last_report_times.iter().find(|(s, _)| *s == state) else {
            return false;
        };
        now - *last < Duration::minutes(self.cooldown_minutes(state))
    }

    fn working_hours_ok(&self, now: DateTime<Utc>) -> bool {
        if !self.config.working_hours_only {
            return true;
        }
        let hour = now.hour();
        self.config.working_hours_start <= hour && hour < self.config.working_hours_end
    }

    /// Anomalies whose arrival falls within the reporting window
    fn recent_anomalies_at(&self, now: DateTime<Utc>) -> Vec<AnomalyResult> {
        let window_start = now - Duration::minutes(self.config.anomaly_window_minutes);
        self.buffer
            .iter()
            .filter(|b| b.added_at >= window_start)
            .map(|b| b.result.clone())
            .collect()
    }

    fn distinct_sensors(anomalies: &[AnomalyResult]) -> Vec<String> {
        let mut sensors: Vec<String> = Vec::new();
        for a in anomalies {
            if !sensors.contains(&a.sensor_type) {
                sensors.push(a.sensor_type.clone());
            }
        }
        sensors
    }

    /// Record a successfully dispatched report
    pub fn mark_report_triggered(&mut self, decision: &ReportDecision) {
        self.mark_report_triggered_at(decision, Utc::now());
    }

    pub(crate) fn mark_report_triggered_at(
        &mut self,
        decision: &ReportDecision,
        now: DateTime<Utc>,
    ) {
        self.last_report_times
            .retain(|(s, _)| *s != decision.current_state);
        self.last_report_times.push((decision.current_state, now));

        self.stats.reports_sent += 1;
        self.stats.last_report_sent = Some(now);
        self.report_pending = false;

        info!(
            trigger = decision.trigger_type.as_str(),
            state = %decision.current_state,
            "Report marked as sent"
        );
    }

    /// Release the in-flight slot after a failed dispatch
    pub fn clear_report_pending(&mut self) {
        self.report_pending = false;
    }

    pub fn report_pending(&self) -> bool {
        self.report_pending
    }

    pub fn stats(&self) -> &ReporterStats {
        &self.stats
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn status(&mut self) -> ReporterStatus {
        ReporterStatus {
            enabled: self.config.enabled,
            current_state: self.state.current(),
            pending_state: self.state.pending(),
            bucket: self.bucket.status(),
            thresholds: self.thresholds.status(),
            buffer_size: self.buffer.len(),
            report_pending: self.report_pending,
            stats: self.stats.clone(),
        }
    }

    /// Drop the anomaly buffer, everything else untouched
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
        info!("Anomaly buffer cleared");
    }

    /// Apply a new configuration
    ///
    /// A changed leaky-bucket section is structural: the bucket and state
    /// machine restart from zero. Threshold, cooldown and flag changes
    /// preserve runtime state.
    pub fn apply_config(&mut self, config: ReportingConfig) {
        if config.leaky_bucket != self.config.leaky_bucket {
            self.bucket = LeakyBucket::new(config.leaky_bucket.clone());
            self.state = StateMachine::new(config.state_transition.clone());
        } else {
            self.state.set_config(config.state_transition.clone());
        }
        self.thresholds.set_config(config.adaptive_threshold.clone());
        self.config = config;
        info!(enabled = self.config.enabled, "Auto-reporter configuration updated");
    }

    /// Full reset: buffer, bucket, state machine and counters
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.bucket.reset();
        self.state.reset();
        self.last_report_times.clear();
        self.report_pending = false;
        self.stats = ReporterStats {
            total_anomalies_processed: 0,
            reports_sent: 0,
            reports_skipped_cooldown: 0,
            state_transitions: 0,
            last_report_sent: None,
            last_state_change: None,
            started_at: Utc::now(),
        };
        info!("Auto-reporter reset");
    }
}
