mod ingest;
mod orchestrator;

use autopilot_common::config::Config;
use orchestrator::{Orchestrator, Runtime};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::default());
    tracing_subscriber::fmt().with_env_filter(config.runtime.log_filter.clone()).init();

    info!("starting ops autopilot incident-response pipeline");

    let orchestrator = match Orchestrator::build(config).await {
        Ok(o) => o,
        Err(e) => {
            error!("failed to build pipeline components: {e}");
            return Err(anyhow::anyhow!("orchestrator build failed: {e}"));
        }
    };

    let health = orchestrator.health_status().await?;
    info!(overall = ?health.overall_health, "all components constructed and healthy");

    let runtime = Runtime::spawn(orchestrator);

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    runtime.shutdown().await;

    Ok(())
}
