use async_trait::async_trait;

use crate::types::{AnomalyResult, ReportPayload};

/// Narrow interface to the external mail collaborator
///
/// The dispatcher hands over an assembled payload; the adapter owns its
/// recipient list and transport details.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, payload: &ReportPayload) -> anyhow::Result<()>;
}

/// Narrow interface to the optional narrative generator
///
/// Failures are tolerated: the dispatcher falls back to a deterministic
/// summary.
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn summarize(&self, anomalies: &[AnomalyResult]) -> anyhow::Result<String>;
}
