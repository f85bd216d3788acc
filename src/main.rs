use anyhow::Context;
use dms_gateway::configuration::get_configuration;
use dms_gateway::startup::Application;
use dms_gateway::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber("dms-gateway".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    let settings = get_configuration().context("Failed to read configuration.")?;
    tracing::info!(adapters = settings.adapters.len(), "Configuration loaded");

    let app = Application::build(settings)
        .await
        .context("Failed to build adapter registry.")?;
    app.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal.")?;
    tracing::info!("Shutting down");

    app.shutdown().await.context("Failed to close adapters.")?;
    Ok(())
}
