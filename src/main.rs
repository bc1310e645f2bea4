use anyhow::Result;
use inverter_monitor::config::Config;
use inverter_monitor::device::{InverterdTransport, ReconnectingClient};
use inverter_monitor::logging::init_logging;
use inverter_monitor::monitor::{EventDispatcher, StatusPoller};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path, e))?,
        None => Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?,
    };
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("{}", e))?;

    info!(
        "inverter-monitor {} starting, inverterd at {}",
        env!("APP_VERSION"),
        config.inverterd.address()
    );

    let client = ReconnectingClient::connect(InverterdTransport::new(&config.inverterd))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to inverterd: {}", e))?;

    let mut poller = StatusPoller::start(Arc::new(client), &config.monitor, EventDispatcher::logging())
        .await
        .map_err(|e| anyhow::anyhow!("Startup failed: {}", e))?;

    let stop = poller.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            stop.stop();
        }
    });

    match poller.run().await {
        Ok(_) => {
            info!("Monitor shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Monitor failed with error: {}", e);
            Err(anyhow::anyhow!("Monitor error: {}", e))
        }
    }
}
