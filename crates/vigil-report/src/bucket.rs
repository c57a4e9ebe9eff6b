use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use vigil_core::types::RiskLevel;
use vigil_core::LeakyBucketConfig;

/// Time-decaying risk score accumulator
///
/// Anomalies add points by risk bucket; the score leaks linearly with time
/// and is clamped to `[0, max_bucket_capacity]`. Every read applies decay
/// first, so a quiet system drains back to zero on its own.
#[derive(Debug)]
pub struct LeakyBucket {
    config: LeakyBucketConfig,
    score: f64,
    last_decay: DateTime<Utc>,
}

/// Snapshot for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct BucketStatus {
    pub score: f64,
    pub max_capacity: f64,
    pub fill_percentage: f64,
    pub decay_rate_per_minute: f64,
}

impl LeakyBucket {
    pub fn new(config: LeakyBucketConfig) -> Self {
        Self {
            config,
            score: 0.0,
            last_decay: Utc::now(),
        }
    }

    /// Add points for an anomaly of the given risk bucket, returns the
    /// amount actually added after clamping
    pub fn add(&mut self, risk: RiskLevel) -> f64 {
        self.add_at(risk, Utc::now())
    }

    pub(crate) fn add_at(&mut self, risk: RiskLevel, now: DateTime<Utc>) -> f64 {
        self.apply_decay(now);

        let points = match risk {
            RiskLevel::Critical => self.config.critical_points,
            RiskLevel::High => self.config.high_points,
            RiskLevel::Medium => self.config.medium_points,
            RiskLevel::Low => self.config.low_points,
        };

        let old = self.score;
        self.score = (self.score + points).min(self.config.max_bucket_capacity);
        let added = self.score - old;

        debug!(
            added = added,
            total = self.score,
            risk = risk.as_str(),
            "Leaky bucket points added"
        );
        added
    }

    /// Current score with decay applied
    pub fn score(&mut self) -> f64 {
        self.score_at(Utc::now())
    }

    pub(crate) fn score_at(&mut self, now: DateTime<Utc>) -> f64 {
        self.apply_decay(now);
        self.score
    }

    fn apply_decay(&mut self, now: DateTime<Utc>) {
        let elapsed = (now - self.last_decay).num_milliseconds() as f64 / 1000.0;
        if elapsed >= self.config.decay_interval_seconds {
            let decay = self.config.decay_rate * (elapsed / 60.0);
            self.score = (self.score - decay).max(0.0);
            self.last_decay = now;
        }
    }

    pub fn reset(&mut self) {
        self.reset_at(Utc::now());
    }

    pub(crate) fn reset_at(&mut self, now: DateTime<Utc>) {
        self.score = 0.0;
        self.last_decay = now;
    }

    pub fn status(&mut self) -> BucketStatus {
        let score = self.score();
        BucketStatus {
            score,
            max_capacity: self.config.max_bucket_capacity,
            fill_percentage: score / self.config.max_bucket_capacity * 100.0,
            decay_rate_per_minute: self.config.decay_rate,
        }
    }
}
