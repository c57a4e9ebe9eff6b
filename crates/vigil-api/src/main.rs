use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use vigil_api::{build_router, ApiState};
use vigil_core::{AppConfig, MailSender, Narrator};
use vigil_ingest::{IngestCoordinator, ReportDispatcher};
use vigil_notify::{HttpNarrator, LogMailer, NarrativeConfig, Recipient, SmtpConfig, SmtpMailer};
use vigil_observability::init_observability;
use vigil_store::LogStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let metrics_handle = init_observability();

    info!("Starting Vigil v{}", env!("CARGO_PKG_VERSION"));

    // Invalid configuration or an uncreatable log directory are fatal
    let config_path = std::env::var("VIGIL_CONFIG").ok();
    let config = AppConfig::load(config_path.as_deref())?;

    let log = Arc::new(LogStore::new(
        &config.logging.log_dir,
        config.logging.max_memory_logs,
    )?);

    let coordinator = Arc::new(IngestCoordinator::new(config.clone(), log));

    let mailer: Arc<dyn MailSender> = match SmtpConfig::from_env() {
        Ok(smtp) => Arc::new(SmtpMailer::new(smtp, Recipient::list_from_env())?),
        Err(e) => {
            warn!(reason = %e, "SMTP not configured, reports will be logged only");
            Arc::new(LogMailer)
        }
    };

    let narrator: Option<Arc<dyn Narrator>> = match NarrativeConfig::from_env() {
        Some(narrative) => Some(Arc::new(HttpNarrator::new(narrative)?)),
        None => {
            info!("No LLM API key, reports use the deterministic summary");
            None
        }
    };

    let dispatcher = ReportDispatcher::new(
        coordinator.config_handle(),
        coordinator.dispatch_queue(),
        coordinator.reporter_handle(),
        mailer,
        narrator,
        coordinator.dispatch_counters(),
    );
    tokio::spawn(dispatcher.run());

    let state = Arc::new(ApiState {
        coordinator,
        metrics: metrics_handle,
    });
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.bind_addr, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
}
