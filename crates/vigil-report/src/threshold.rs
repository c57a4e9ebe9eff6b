use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use vigil_core::types::SystemState;
use vigil_core::AdaptiveThresholdConfig;

/// Bounded history of bucket-score observations
const SCORE_HISTORY_CAP: usize = 1000;

/// Warning/critical threshold pair that adapts to recent bucket scores
///
/// Sustained high scores raise the thresholds (up to `max_threshold_multiplier`),
/// quiet periods lower them again. `thresholds_for` applies the hysteresis
/// margin so leaving a state is easier than re-entering it.
#[derive(Debug)]
pub struct AdaptiveThreshold {
    config: AdaptiveThresholdConfig,
    history: VecDeque<(DateTime<Utc>, f64)>,
    current_warning: f64,
    current_critical: f64,
}

/// Snapshot for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdStatus {
    pub base_warning_threshold: f64,
    pub base_critical_threshold: f64,
    pub current_warning_threshold: f64,
    pub current_critical_threshold: f64,
    pub adaptation_factor: f64,
    pub samples_in_window: usize,
}

impl AdaptiveThreshold {
    pub fn new(config: AdaptiveThresholdConfig) -> Self {
        let current_warning = config.base_warning_threshold;
        let current_critical = config.base_critical_threshold;
        Self {
            config,
            history: VecDeque::with_capacity(SCORE_HISTORY_CAP),
            current_warning,
            current_critical,
        }
    }

    /// Record a bucket score observation and recompute the thresholds
    pub fn record_score(&mut self, score: f64) {
        self.record_score_at(score, Utc::now());
    }

    pub(crate) fn record_score_at(&mut self, score: f64, now: DateTime<Utc>) {
        if self.history.len() >= SCORE_HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back((now, score));
        self.recalculate(now);
    }

    fn recalculate(&mut self, now: DateTime<Utc>) {
        let window_start = now - Duration::minutes(self.config.adaptation_window_minutes);
        let recent: Vec<f64> = self
            .history
            .iter()
            .filter(|(ts, _)| *ts >= window_start)
            .map(|(_, s)| *s)
            .collect();

        if recent.len() < self.config.min_samples_for_adaptation {
            // Not enough fresh evidence to adapt
            self.current_warning = self.config.base_warning_threshold;
            self.current_critical = self.config.base_critical_threshold;
            return;
        }

        let avg = recent.iter().sum::<f64>() / recent.len() as f64;

        let factor = (1.0 + self.config.adaptation_gain * avg / self.config.base_critical_threshold)
            .clamp(
                self.config.min_threshold_multiplier,
                self.config.max_threshold_multiplier,
            );

        self.current_warning = self.config.base_warning_threshold * factor;
        self.current_critical = self.config.base_critical_threshold * factor;
    }

    /// Effective thresholds for the given state, hysteresis applied
    ///
    /// In CRITICAL the critical threshold is lowered so the state is easier
    /// to leave than to re-enter; in WARNING the warning threshold is
    /// lowered the same way towards NORMAL.
    pub fn thresholds_for(&self, state: SystemState) -> (f64, f64) {
        let margin = self.config.hysteresis_margin;
        match state {
            SystemState::Critical => (self.current_warning, self.current_critical * (1.0 - margin)),
            SystemState::Warning => (self.current_warning * (1.0 - margin), self.current_critical),
            SystemState::Normal => (self.current_warning, self.current_critical),
        }
    }

    /// Swap in new tunables; thresholds return to the new base values and
    /// re-adapt as fresh scores arrive
    pub fn set_config(&mut self, config: AdaptiveThresholdConfig) {
        self.current_warning = config.base_warning_threshold;
        self.current_critical = config.base_critical_threshold;
        self.config = config;
    }

    /// Current adapted thresholds, no hysteresis
    pub fn current_thresholds(&self) -> (f64, f64) {
        (self.current_warning, self.current_critical)
    }

    pub fn status(&self) -> ThresholdStatus {
        ThresholdStatus {
            base_warning_threshold: self.config.base_warning_threshold,
            base_critical_threshold: self.config.base_critical_threshold,
            current_warning_threshold: self.current_warning,
            current_critical_threshold: self.current_critical,
            adaptation_factor: if self.config.base_warning_threshold > 0.0 {
                self.current_warning / self.config.base_warning_threshold
            } else {
                1.0
            },
            samples_in_window: self.history.len(),
        }
    }
}
