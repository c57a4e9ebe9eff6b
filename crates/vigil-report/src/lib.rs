//! Vigil auto-reporting library
//!
//! Couples the leaky-bucket risk accumulator, adaptive thresholds and the
//! hysteresis-guarded state machine into the auto-reporter that decides
//! when a consolidated alert report should go out.

pub mod bucket;
pub mod reporter;
pub mod state;
pub mod threshold;

pub use bucket::{BucketStatus, LeakyBucket};
pub use reporter::{AutoReporter, ReporterStats, ReporterStatus};
pub use state::{StateInput, StateMachine};
pub use threshold::{AdaptiveThreshold, ThresholdStatus};
