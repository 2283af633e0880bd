// Chain capability consumed by the handshake engine

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::error::RelayerError;
use crate::relay::msgs::Msg;

pub mod factory;
pub mod mock;
pub mod rpc;
pub mod types;

pub use factory::ChainFactory;
pub use mock::MockChain;
pub use rpc::RpcChain;
pub use types::{
    ChannelCounterparty, ChannelEnd, ChannelResponse, ConnectionCounterparty, ConnectionEnd,
    ConnectionResponse, Header, Height, Order, Proof, Receipt, State, TxEvent,
};

/// Errors reported by a chain endpoint
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("transaction inclusion not confirmed: {0}")]
    Timeout(String),

    #[error("transaction rejected (code {code}): {log}")]
    Rejected { code: u32, log: String },

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("decode error: {0}")]
    Decode(String),
}

/// Generic chain interface for IBC handshake operations
///
/// Signing, broadcasting, fees and the light-client store of the relayer
/// live behind this trait.
#[async_trait]
pub trait Chain: Send + Sync {
    /// Get the chain ID
    fn chain_id(&self) -> &str;

    /// Latest committed header of this chain
    async fn latest_header(&self) -> Result<Header, ChainError>;

    /// Verify a header of this chain against its consensus (signature and committed app hash)
    async fn accepts_header(&self, header: &Header) -> Result<(), ChainError>;

    /// Query a connection end at a specific height
    async fn query_connection(
        &self,
        connection_id: &str,
        height: Height,
    ) -> Result<ConnectionResponse, ChainError>;

    /// Query a channel end at a specific height
    async fn query_channel(
        &self,
        port_id: &str,
        channel_id: &str,
        height: Height,
    ) -> Result<ChannelResponse, ChainError>;

    /// Sign, broadcast and wait for inclusion of one transaction carrying `msgs` in order
    async fn submit(&self, msgs: &[Msg]) -> Result<Receipt, ChainError>;

    /// Health check
    async fn health_check(&self) -> Result<(), ChainError>;
}

/// One ledger endpoint participating in handshakes
///
/// Shared between concurrent handshake attempts. The last synchronized
/// height sits behind a per-chain lock so header syncs against the same
/// chain never interleave.
pub struct ChainRef {
    chain_id: String,
    handle: Arc<dyn Chain>,
    synced_height: Mutex<Height>,
}

impl ChainRef {
    pub fn new(handle: Arc<dyn Chain>) -> Self {
        Self {
            chain_id: handle.chain_id().to_string(),
            handle,
            synced_height: Mutex::new(0),
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn handle(&self) -> &dyn Chain {
        self.handle.as_ref()
    }

    /// Height of the last header accepted by the header synchronizer
    pub async fn synced_height(&self) -> Height {
        *self.synced_height.lock().await
    }

    pub(crate) fn sync_lock(&self) -> &Mutex<Height> {
        &self.synced_height
    }
}

impl std::fmt::Debug for ChainRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainRef")
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

/// Process registry of chain endpoints, keyed by chain ID
#[derive(Default, Debug)]
pub struct ChainRegistry {
    chains: HashMap<String, Arc<ChainRef>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chain; a chain ID is only ever registered once
    pub fn insert(&mut self, handle: Arc<dyn Chain>) -> Arc<ChainRef> {
        let chain_id = handle.chain_id().to_string();
        self.chains
            .entry(chain_id)
            .or_insert_with(|| Arc::new(ChainRef::new(handle)))
            .clone()
    }

    pub fn get(&self, chain_id: &str) -> Result<Arc<ChainRef>, RelayerError> {
        self.chains
            .get(chain_id)
            .cloned()
            .ok_or_else(|| RelayerError::UnknownChain(chain_id.to_string()))
    }

    /// Look up the two distinct chains of a path
    pub fn get_pair(
        &self,
        src: &str,
        dst: &str,
    ) -> Result<(Arc<ChainRef>, Arc<ChainRef>), RelayerError> {
        if src == dst {
            return Err(RelayerError::SameChain(src.to_string()));
        }
        Ok((self.get(src)?, self.get(dst)?))
    }

    pub fn chain_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.chains.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let mut registry = ChainRegistry::new();
        let first = registry.insert(Arc::new(MockChain::new("ibc-0")));
        registry.insert(Arc::new(MockChain::new("ibc-1")));
        // Re-registering keeps the original handle
        let again = registry.insert(Arc::new(MockChain::new("ibc-0")));

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.chain_ids(), vec!["ibc-0", "ibc-1"]);

        let (src, dst) = registry.get_pair("ibc-0", "ibc-1").unwrap();
        assert_eq!(src.chain_id(), "ibc-0");
        assert_eq!(dst.chain_id(), "ibc-1");

        assert!(matches!(
            registry.get_pair("ibc-0", "ibc-0"),
            Err(RelayerError::SameChain(_))
        ));
        assert!(matches!(
            registry.get("ibc-9"),
            Err(RelayerError::UnknownChain(_))
        ));
    }

    #[tokio::test]
    async fn test_chain_ref_starts_unsynced() {
        let chain = ChainRef::new(Arc::new(MockChain::new("ibc-0")));
        assert_eq!(chain.chain_id(), "ibc-0");
        assert_eq!(chain.synced_height().await, 0);
    }
}
