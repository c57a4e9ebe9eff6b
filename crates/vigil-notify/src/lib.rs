//! Vigil notification adapters
//!
//! External collaborators of the core pipeline:
//! - SMTP report delivery (lettre) with per-risk recipient filtering
//! - LLM narrative generation over HTTP, tolerated to fail

pub mod email;
pub mod narrative;

pub use email::{LogMailer, Recipient, SmtpConfig, SmtpMailer};
pub use narrative::{HttpNarrator, NarrativeConfig};
