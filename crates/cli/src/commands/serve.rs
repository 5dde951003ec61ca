//! `conduit serve`: Run the runtime behind the HTTP gateway.

use conduit::bootstrap;
use tracing::{info, warn};

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config()?;
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let (handle, task) = bootstrap::build_runtime(&config)?.start();

    println!("conduit gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {:?} ({})", config.provider.kind, config.provider.model);
    println!("   Planner:   {:?}", config.planner.kind);
    println!("   Plugins:   {}", handle.plugins().plugin_ids().join(", "));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Ctrl+C received");
    };

    let served = conduit_gateway::start(handle.clone(), &config.gateway, shutdown).await;

    handle.shutdown();
    task.await?;
    served
}
