//! Node configuration.

use crate::{NodeError, NodeResult};
use warden_leader::ElectionConfig;
use warden_registry::RegistryConfig;
use warden_store::StoreConfig;

pub const DEFAULT_PORT: u16 = 8080;

/// Configuration for one node process
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Host name advertised to the registry
    pub host: String,
    pub port: u16,
    pub election: ElectionConfig,
    pub registry: RegistryConfig,
    pub store: StoreConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            port: DEFAULT_PORT,
            election: ElectionConfig::default(),
            registry: RegistryConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Build the configuration from command-line arguments, program name
    /// excluded. The only argument is an optional port.
    pub fn from_args<I>(args: I) -> NodeResult<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Self::default();
        if let Some(value) = args.into_iter().next() {
            config.port = value
                .parse()
                .map_err(|_| NodeError::InvalidPort { value })?;
        }
        Ok(config)
    }

    /// Address this node registers as a worker
    pub fn advertised_address(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
