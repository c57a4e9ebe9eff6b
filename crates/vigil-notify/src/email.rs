//! SMTP report delivery

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use tracing::{info, warn};

use vigil_core::types::{ReportPayload, RiskLevel};
use vigil_core::MailSender;

/// SMTP transport configuration
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
    pub from_name: String,
    pub use_tls: bool,
}

impl SmtpConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: std::env::var("SMTP_HOST").context("SMTP_HOST not set")?,
            port: std::env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()
                .context("Invalid SMTP_PORT")?,
            username: std::env::var("SMTP_USERNAME").context("SMTP_USERNAME not set")?,
            password: std::env::var("SMTP_PASSWORD").context("SMTP_PASSWORD not set")?,
            from_address: std::env::var("SMTP_FROM_ADDRESS")
                .context("SMTP_FROM_ADDRESS not set")?,
            from_name: std::env::var("SMTP_FROM_NAME")
                .unwrap_or_else(|_| "Vigil Alerts".to_string()),
            use_tls: std::env::var("SMTP_USE_TLS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        })
    }
}

/// One report recipient with per-risk-level opt-in
#[derive(Debug, Clone)]
pub struct Recipient {
    pub email: String,
    pub name: String,
    pub notify_on_critical: bool,
    pub notify_on_high: bool,
    pub notify_on_medium: bool,
    pub notify_on_low: bool,
}

impl Recipient {
    /// Recipient with the default policy: critical and high only
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: String::new(),
            notify_on_critical: true,
            notify_on_high: true,
            notify_on_medium: false,
            notify_on_low: false,
        }
    }

    pub fn should_notify(&self, risk: RiskLevel) -> bool {
        match risk {
            RiskLevel::Critical => self.notify_on_critical,
            RiskLevel::High => self.notify_on_high,
            RiskLevel::Medium => self.notify_on_medium,
            RiskLevel::Low => self.notify_on_low,
        }
    }

    /// Parse a comma-separated recipient list (SMTP_RECIPIENTS)
    pub fn list_from_env() -> Vec<Recipient> {
        std::env::var("SMTP_RECIPIENTS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(Recipient::new)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// SMTP mailer for assembled reports
pub struct SmtpMailer {
    config: SmtpConfig,
    recipients: Vec<Recipient>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig, recipients: Vec<Recipient>) -> Result<Self> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let transport = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
                .port(config.port)
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port)
                .credentials(creds)
                .build()
        };

        info!(host = %config.host, port = config.port, "SMTP mailer initialized");

        Ok(Self {
            config,
            recipients,
            transport,
        })
    }

    fn subject(payload: &ReportPayload) -> String {
        format!(
            "[{}] Vigil anomaly report {} ({} anomalies)",
            payload.risk_level, payload.report_id, payload.total_anomalies
        )
    }

    fn build_html_body(payload: &ReportPayload) -> String {
        let risk_color = match payload.risk_level {
            RiskLevel::Critical => "#ff3366",
            RiskLevel::High => "#ff9933",
            RiskLevel::Medium => "#33ccff",
            RiskLevel::Low => "#66ff99",
        };

        let anomaly_rows: Vec<String> = payload
            .anomalies
            .iter()
            .map(|a| {
                format!(
                    "<tr><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.2}</td><td>{}</td></tr>",
                    a.sensor_type,
                    a.current_value,
                    a.mean,
                    a.z_score,
                    a.severity.as_str()
                )
            })
            .collect();

        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>{title}</title></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, sans-serif; background-color: #0a0a0a; color: #e0e0e0; margin: 0; padding: 20px;">
    <div style="max-width: 640px; margin: 0 auto; background-color: #141414; border-radius: 8px; overflow: hidden; border: 1px solid #1f1f1f;">
        <div style="background-color: {color}; padding: 20px; color: #000;">
            <h1 style="margin: 0; font-size: 22px;">{title}</h1>
            <p style="margin: 5px 0 0 0; font-size: 14px; opacity: 0.8;">Risk: {risk} | Trigger: {trigger}</p>
        </div>
        <div style="padding: 24px;">
            <p style="font-size: 15px; line-height: 1.6;">{reason}</p>
            <p style="font-size: 14px; line-height: 1.6;">{narrative}</p>
            <table style="width: 100%; border-collapse: collapse; margin-top: 16px; font-size: 13px;">
                <tr style="text-align: left; border-bottom: 1px solid #333;">
                    <th>Sensor</th><th>Value</th><th>Expected</th><th>Z</th><th>Severity</th>
                </tr>
                {rows}
            </table>
            <div style="margin-top: 24px; padding-top: 16px; border-top: 1px solid #1f1f1f; font-size: 12px; color: #666;">
                <p>Affected sensors: {sensors}</p>
                <p>Report {id} | Period {start} to {end}</p>
            </div>
        </div>
    </div>
</body>
</html>"#,
            title = Self::subject(payload),
            color = risk_color,
            risk = payload.risk_level,
            trigger = payload.trigger_type.as_str(),
            reason = payload.reason,
            narrative = payload.narrative,
            rows = anomaly_rows.join("\n                "),
            sensors = payload.affected_sensors.join(", "),
            id = payload.report_id,
            start = payload.period_start.format("%Y-%m-%d %H:%M:%S UTC"),
            end = payload.period_end.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }

    fn build_text_body(payload: &ReportPayload) -> String {
        let anomaly_lines: Vec<String> = payload
            .anomalies
            .iter()
            .map(|a| {
                format!(
                    "- {}: value {}, expected {:.2} +/- {:.2}, z-score {:.2} ({})",
                    a.sensor_type,
                    a.current_value,
                    a.mean,
                    a.std_dev,
                    a.z_score,
                    a.severity.as_str()
                )
            })
            .collect();

        format!(
            "{reason}\n\nRisk: {risk}\nTrigger: {trigger}\n\n{narrative}\n\nAnomalies:\n{lines}\n\nAffected sensors: {sensors}\n\n---\nReport {id} | Period {start} to {end}",
            reason = payload.reason,
            risk = payload.risk_level,
            trigger = payload.trigger_type.as_str(),
            narrative = payload.narrative,
            lines = anomaly_lines.join("\n"),
            sensors = payload.affected_sensors.join(", "),
            id = payload.report_id,
            start = payload.period_start.format("%Y-%m-%d %H:%M:%S UTC"),
            end = payload.period_end.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, payload: &ReportPayload) -> Result<()> {
        let recipients: Vec<&Recipient> = self
            .recipients
            .iter()
            .filter(|r| r.should_notify(payload.risk_level))
            .collect();

        if recipients.is_empty() {
            warn!(risk = %payload.risk_level, "No recipients opted in for this risk level");
            return Ok(());
        }

        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_address)
            .parse()
            .context("Invalid from address")?;

        let html_body = Self::build_html_body(payload);
        let text_body = Self::build_text_body(payload);

        for recipient in recipients {
            let to: Mailbox = recipient
                .email
                .parse()
                .with_context(|| format!("Invalid recipient email: {}", recipient.email))?;

            let message = Message::builder()
                .from(from.clone())
                .to(to)
                .subject(Self::subject(payload))
                .multipart(
                    MultiPart::alternative()
                        .singlepart(
                            SinglePart::builder()
                                .header(header::ContentType::TEXT_PLAIN)
                                .body(text_body.clone()),
                        )
                        .singlepart(
                            SinglePart::builder()
                                .header(header::ContentType::TEXT_HTML)
                                .body(html_body.clone()),
                        ),
                )
                .context("Failed to build email")?;

            self.transport
                .send(message)
                .await
                .with_context(|| format!("SMTP send to {} failed", recipient.email))?;

            info!(
                report_id = %payload.report_id,
                recipient = %recipient.email,
                "Report email sent"
            );
        }

        Ok(())
    }
}

/// Fallback mailer used when SMTP is not configured: reports are logged
/// and considered delivered so the pipeline keeps cycling
pub struct LogMailer;

#[async_trait]
impl MailSender for LogMailer {
    async fn send(&self, payload: &ReportPayload) -> Result<()> {
        warn!(
            report_id = %payload.report_id,
            risk = %payload.risk_level,
            anomalies = payload.total_anomalies,
            reason = %payload.reason,
            "SMTP not configured, report logged only"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vigil_core::types::{AnomalyResult, Severity, SystemStatus, TriggerType};

    fn payload() -> ReportPayload {
        ReportPayload {
            report_id: "RPT-20240301123045".to_string(),
            generated_at: Utc::now(),
            period_start: Utc::now(),
            period_end: Utc::now(),
            total_anomalies: 1,
            anomalies: vec![AnomalyResult {
                sensor_id: "S1".to_string(),
                sensor_type: "vibration".to_string(),
                current_value: 9.4,
                unit: "mm/s".to_string(),
                mean: 2.1,
                std_dev: 0.4,
                z_score: 18.25,
                threshold: 2.0,
                timestamp: Utc::now(),
                is_anomaly: true,
                severity: Severity::High,
                system_status: SystemStatus::Active,
                window_size: 30,
                message: String::new(),
            }],
            affected_sensors: vec!["vibration".to_string()],
            risk_level: RiskLevel::Critical,
            reason: "Entered CRITICAL: score 30.0 >= 30.0".to_string(),
            trigger_type: TriggerType::CriticalEntry,
            narrative: "Vibration is far above its baseline.".to_string(),
            summary: "1 anomalies across 1 sensors: vibration (1)".to_string(),
        }
    }

    #[test]
    fn recipient_filters_by_risk_level() {
        let recipient = Recipient::new("ops@example.com");
        assert!(recipient.should_notify(RiskLevel::Critical));
        assert!(recipient.should_notify(RiskLevel::High));
        assert!(!recipient.should_notify(RiskLevel::Medium));
        assert!(!recipient.should_notify(RiskLevel::Low));
    }

    #[test]
    fn html_body_carries_report_details() {
        let html = SmtpMailer::build_html_body(&payload());
        assert!(html.contains("RPT-20240301123045"));
        assert!(html.contains("vibration"));
        assert!(html.contains("critical_entry"));
        assert!(html.contains("Vibration is far above its baseline."));
    }

    #[test]
    fn text_body_lists_anomalies() {
        let text = SmtpMailer::build_text_body(&payload());
        assert!(text.contains("- vibration: value 9.4"));
        assert!(text.contains("Risk: CRITICAL"));
        assert!(text.contains("Report RPT-20240301123045"));
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        assert!(LogMailer.send(&payload()).await.is_ok());
    }
}
