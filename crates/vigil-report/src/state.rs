use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::{debug, warn};

use vigil_core::types::{StateTransition, SystemState};
use vigil_core::StateTransitionConfig;

/// Bounded transition history length
const TRANSITION_HISTORY_CAP: usize = 100;

/// One bucket-score observation fed into the state machine
#[derive(Debug, Clone)]
pub struct StateInput {
    pub score: f64,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    pub anomaly_count: usize,
    pub affected_sensors: Vec<String>,
    /// Distinct-sensor count reached `multi_sensor_threshold`
    pub multi_sensor: bool,
}

/// NORMAL/WARNING/CRITICAL state machine with pending confirmation
///
/// A proposed target state must hold for `state_confirmation_seconds`
/// before it commits; a changed target restarts the timer. The caller
/// supplies hysteresis-adjusted thresholds, so flapping at a boundary is
/// absorbed by both the margin and the confirmation delay.
#[derive(Debug)]
pub struct StateMachine {
    config: StateTransitionConfig,
    current: SystemState,
    pending: Option<(SystemState, DateTime<Utc>)>,
    history: VecDeque<StateTransition>,
}

impl StateMachine {
    pub fn new(config: StateTransitionConfig) -> Self {
        Self {
            config,
            current: SystemState::Normal,
            pending: None,
            history: VecDeque::with_capacity(TRANSITION_HISTORY_CAP),
        }
    }

    pub fn current(&self) -> SystemState {
        self.current
    }

    pub fn pending(&self) -> Option<SystemState> {
        self.pending.map(|(state, _)| state)
    }

    pub fn history(&self) -> impl Iterator<Item = &StateTransition> {
        self.history.iter()
    }

    /// Feed a score observation; returns the committed transition, if any
    pub fn drive(&mut self, input: StateInput) -> Option<StateTransition> {
        self.drive_at(input, Utc::now())
    }

    pub(crate) fn drive_at(
        &mut self,
        input: StateInput,
        now: DateTime<Utc>,
    ) -> Option<StateTransition> {
        let mut target = if input.score >= input.critical_threshold {
            SystemState::Critical
        } else if input.score >= input.warning_threshold {
            SystemState::Warning
        } else {
            SystemState::Normal
        };

        let escalated = input.multi_sensor && target != SystemState::Critical;
        if escalated {
            warn!(
                sensors = input.affected_sensors.len(),
                "Multi-sensor correlation, escalating target to CRITICAL"
            );
            target = SystemState::Critical;
        }

        if target == self.current {
            return None;
        }

        // Start or continue the pending transition; a changed target
        // restarts the confirmation timer
        let since = match self.pending {
            Some((pending, since)) if pending == target => since,
            _ => {
                self.pending = Some((target, now));
                now
            }
        };

        let elapsed = (now - since).num_seconds();
        if elapsed < self.config.state_confirmation_seconds {
            debug!(
                target = %target,
                elapsed_seconds = elapsed,
                "State transition awaiting confirmation"
            );
            return None;
        }

        let previous = self.current;
        self.current = target;
        self.pending = None;

        let trigger_reason = if escalated {
            format!(
                "Multi-sensor escalation: {} sensors affected",
                input.affected_sensors.len()
            )
        } else {
            format!(
                "Bucket score {:.1} against thresholds {:.1}/{:.1}",
                input.score, input.warning_threshold, input.critical_threshold
            )
        };

        warn!(from = %previous, to = %target, score = input.score, "State transition committed");
        metrics::counter!(
            "vigil_state_transitions_total",
            "to" => target.as_str()
        )
        .increment(1);

        let transition = StateTransition {
            from_state: previous,
            to_state: target,
            at: now,
            bucket_score: input.score,
            warning_threshold: input.warning_threshold,
            critical_threshold: input.critical_threshold,
            trigger_reason,
            anomaly_count: input.anomaly_count,
            affected_sensors: input.affected_sensors,
        };

        if self.history.len() >= TRANSITION_HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back(transition.clone());

        Some(transition)
    }

    /// Swap in new transition tunables without losing the current state
    pub fn set_config(&mut self, config: StateTransitionConfig) {
        self.config = config;
    }

    /// Return to NORMAL and drop any pending transition
    pub fn reset(&mut self) {
        self.current = SystemState::Normal;
        self.pending = None;
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn machine(confirmation_seconds: i64) -> StateMachine {
        StateMachine::new(StateTransitionConfig {
            state_confirmation_seconds: confirmation_seconds,
            ..StateTransitionConfig::default()
        })
    }

    fn input(score: f64, warning: f64, critical: f64) -> StateInput {
        StateInput {
            score,
            warning_threshold: warning,
            critical_threshold: critical,
            anomaly_count: 1,
            affected_sensors: vec!["t".to_string()],
            multi_sensor: false,
        }
    }

    #[test]
    fn zero_confirmation_commits_immediately() {
        let now = Utc::now();
        let mut sm = machine(0);

        let transition = sm.drive_at(input(45.0, 20.0, 40.0), now).unwrap();
        assert_eq!(transition.from_state, SystemState::Normal);
        assert_eq!(transition.to_state, SystemState::Critical);
        assert_eq!(sm.current(), SystemState::Critical);
    }

    #[test]
    fn confirmation_delay_rejects_transient_spikes() {
        let now = Utc::now();
        let mut sm = machine(30);

        assert!(sm.drive_at(input(45.0, 20.0, 40.0), now).is_none());
        assert_eq!(sm.current(), SystemState::Normal);
        assert_eq!(sm.pending(), Some(SystemState::Critical));

        // Still within the confirmation window
        let later = now + Duration::seconds(20);
        assert!(sm.drive_at(input(45.0, 20.0, 40.0), later).is_none());

        // Confirmed after the delay
        let committed = now + Duration::seconds(30);
        let transition = sm.drive_at(input(45.0, 20.0, 40.0), committed).unwrap();
        assert_eq!(transition.to_state, SystemState::Critical);
    }

    #[test]
    fn changed_target_restarts_the_timer() {
        let now = Utc::now();
        let mut sm = machine(30);

        assert!(sm.drive_at(input(45.0, 20.0, 40.0), now).is_none());

        // Score drops into the warning band before confirmation
        let later = now + Duration::seconds(20);
        assert!(sm.drive_at(input(25.0, 20.0, 40.0), later).is_none());
        assert_eq!(sm.pending(), Some(SystemState::Warning));

        // The original critical timer does not carry over
        let after_first_window = now + Duration::seconds(35);
        assert!(sm
            .drive_at(input(25.0, 20.0, 40.0), after_first_window)
            .is_none());

        let confirmed = later + Duration::seconds(30);
        let transition = sm.drive_at(input(25.0, 20.0, 40.0), confirmed).unwrap();
        assert_eq!(transition.to_state, SystemState::Warning);
    }

    #[test]
    fn hysteresis_holds_critical_until_exit_threshold() {
        let now = Utc::now();
        let mut sm = machine(0);

        // Enter CRITICAL at score 40 (critical = 40)
        sm.drive_at(input(40.0, 20.0, 40.0), now).unwrap();
        assert_eq!(sm.current(), SystemState::Critical);

        // Margin 0.2 puts the exit threshold at 32: score 35 stays CRITICAL
        assert!(sm.drive_at(input(35.0, 20.0, 32.0), now).is_none());
        assert_eq!(sm.current(), SystemState::Critical);

        // Score 30 is below the exit threshold: fall back to WARNING
        let transition = sm.drive_at(input(30.0, 20.0, 32.0), now).unwrap();
        assert_eq!(transition.from_state, SystemState::Critical);
        assert_eq!(transition.to_state, SystemState::Warning);
    }

    #[test]
    fn multi_sensor_forces_critical() {
        let now = Utc::now();
        let mut sm = machine(0);

        let mut i = input(25.0, 20.0, 40.0);
        i.multi_sensor = true;
        i.affected_sensors = vec!["a".to_string(), "b".to_string()];

        let transition = sm.drive_at(i, now).unwrap();
        assert_eq!(transition.to_state, SystemState::Critical);
        assert!(transition.trigger_reason.contains("Multi-sensor"));
    }

    #[test]
    fn no_change_returns_none() {
        let now = Utc::now();
        let mut sm = machine(0);
        assert!(sm.drive_at(input(5.0, 20.0, 40.0), now).is_none());
        assert!(sm.history().next().is_none());
    }

    #[test]
    fn history_is_bounded() {
        let now = Utc::now();
        let mut sm = machine(0);
        for i in 0..250 {
            let score = if i % 2 == 0 { 45.0 } else { 5.0 };
            sm.drive_at(input(score, 20.0, 40.0), now);
        }
        assert!(sm.history().count() <= TRANSITION_HISTORY_CAP);
    }
}
