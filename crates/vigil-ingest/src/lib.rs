//! Vigil ingest pipeline
//!
//! The ingest coordinator is the single entry point of the core: it
//! validates readings, runs the detector, logs, broadcasts and feeds the
//! auto-reporter. Report decisions flow through a bounded drop-oldest
//! queue into the dispatcher task, which assembles payloads and hands
//! them to the mail adapter off the ingest path.

pub mod coordinator;
pub mod dispatch;

pub use coordinator::{AutoReportStatus, ConfigHandle, HealthInfo, IngestCoordinator};
pub use dispatch::{
    fallback_summary, DispatchCounters, DispatchQueue, DispatchSnapshot, ReportDispatcher,
};
