use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use warden_node::{
    ensure_election_namespace, NodeConfig, Orchestrator, SessionWatch, ShutdownSignal,
};
use warden_store::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = NodeConfig::from_args(std::env::args().skip(1))
        .context("failed to parse command-line arguments")?;
    info!("Starting node at {}", config.advertised_address());

    let store = MemoryStore::new(config.store.clone());
    let shutdown = ShutdownSignal::new();
    let session = store.connect(Some(Arc::new(SessionWatch::new(shutdown.clone()))));

    ensure_election_namespace(&session, &config.election.namespace)
        .await
        .context("failed to prepare the election namespace")?;

    let closer = session.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, closing session");
                closer.close();
            }
            Err(err) => warn!("Failed to listen for Ctrl-C: {}", err),
        }
    });

    let node = Orchestrator::new(config, Arc::new(session), shutdown);
    let reason = node.run().await.context("node failed to start")?;

    info!("Disconnected from coordination store ({}), exiting", reason);
    Ok(())
}
