// IBC handshake relayer library
// This module structure exposes the relayer components for testing and external use

pub mod chains;
pub mod config;
pub mod error;
pub mod metrics;
pub mod relay;
pub mod utils;

// Re-export commonly used types for convenience
pub use chains::{Chain, ChainError, ChainFactory, ChainRef, ChainRegistry, MockChain, RpcChain};
pub use config::{ChainConfig, ChainSpecificConfig, PathConfig, PathEndConfig, RelayerConfig};
pub use error::RelayerError;
pub use metrics::RelayerMetrics;
pub use relay::{
    DriverConfig, DriverState, HandshakeDriver, HandshakeKind, HandshakeOutcome, MessageBatch,
    PathEnd, PathIdentifiers, StepReport,
};
