//! Vigil log store
//!
//! Bounded in-memory ring buffers plus two append-only CSV files: every
//! ingested result lands in `all_readings.csv`, anomalies additionally in
//! `anomalies.csv` with the human-readable message column.

pub mod log;

pub use log::{LogStats, LogStore};
