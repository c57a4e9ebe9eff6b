//! Vigil core library
//!
//! Shared data model, error types, configuration and the real-time
//! broadcast hub used by every other Vigil crate.

pub mod adapter;
pub mod config;
pub mod error;
pub mod hub;
pub mod types;

pub use adapter::{MailSender, Narrator};
pub use config::{
    AdaptiveThresholdConfig, AppConfig, DetectorConfig, LeakyBucketConfig, LogConfig,
    ReportingConfig, SensorOverride, ServerConfig, StateTransitionConfig,
};
pub use error::{Result, VigilError};
pub use hub::BroadcastHub;
pub use types::{
    AnomalyResult, Reading, ReportDecision, ReportPayload, RiskLevel, Severity, StateTransition,
    SystemState, SystemStatus, TriggerType,
};
