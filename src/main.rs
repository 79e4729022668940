use anyhow::Context;
use tracing_subscriber::EnvFilter;
use webhook_guard::{events, http_server, AppState, Config, ErrorMonitor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    if config.diagnostics_token.is_none() {
        tracing::warn!("DIAGNOSTICS_TOKEN not set; diagnostics routes disabled");
    }

    let monitor = ErrorMonitor::new();
    let (state, event_rx) = AppState::new(&config, monitor.clone());

    let addr = http_server::start(config.bind_addr, state)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(%addr, rate_limit = ?config.rate_limit, "webhook-guard started");

    let consumer = tokio::spawn(events::run_consumer(event_rx, monitor));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");
    consumer.abort();

    Ok(())
}
