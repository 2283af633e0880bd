// Chain factory for creating chain implementations from configuration

use std::sync::Arc;
use tracing::info;

use super::{Chain, ChainError, ChainRegistry, MockChain, RpcChain};
use crate::config::{ChainConfig, ChainSpecificConfig, RelayerConfig};

/// Factory for creating chain instances based on configuration
pub struct ChainFactory;

impl ChainFactory {
    /// Create a chain instance from configuration
    pub fn create_chain(config: &ChainConfig) -> Result<Arc<dyn Chain>, ChainError> {
        match &config.config {
            ChainSpecificConfig::Rpc { .. } => {
                let chain = RpcChain::new(config)?;
                info!("🔗 {} via JSON-RPC gateway {}", config.chain_id, chain.rpc_endpoint());
                Ok(Arc::new(chain))
            }
            ChainSpecificConfig::Mock { seed } => {
                info!("🧪 {} as in-memory mock chain", config.chain_id);
                let chain = match seed {
                    Some(seed) => MockChain::with_seed(&config.chain_id, seed),
                    None => MockChain::new(&config.chain_id),
                };
                Ok(Arc::new(chain))
            }
        }
    }

    /// Build the process registry holding every configured chain
    pub fn build_registry(config: &RelayerConfig) -> Result<ChainRegistry, ChainError> {
        let mut registry = ChainRegistry::new();
        let mut names: Vec<&String> = config.chains.keys().collect();
        names.sort();

        for name in names {
            if let Some(chain_config) = config.chains.get(name) {
                registry.insert(Self::create_chain(chain_config)?);
            }
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_from_config() {
        let mut config = RelayerConfig::default();
        config.chains.insert("a".to_string(), ChainConfig::mock("ibc-0"));
        config.chains.insert("b".to_string(), ChainConfig::mock("ibc-1"));

        let registry = ChainFactory::build_registry(&config).unwrap();
        assert_eq!(registry.chain_ids(), vec!["ibc-0", "ibc-1"]);
    }

    #[test]
    fn test_rpc_chain_creation() {
        let config = ChainConfig::rpc("gaia-1", "http://127.0.0.1:26657");
        let chain = ChainFactory::create_chain(&config).unwrap();
        assert_eq!(chain.chain_id(), "gaia-1");
    }
}
