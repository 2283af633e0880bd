use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::chains::Order;
use crate::relay::{DriverConfig, PathIdentifiers, PathKind, RetryConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerConfig {
    pub global: GlobalConfig,
    pub chains: HashMap<String, ChainConfig>,
    #[serde(default)]
    pub paths: Vec<PathConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Log level for the relayer
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Wall-clock bound of one handshake attempt, e.g. "60s" or "2m"
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Optional bound on handshake rounds
    #[serde(default)]
    pub max_rounds: Option<u32>,
    /// Pause between successful rounds in milliseconds
    #[serde(default)]
    pub poll_interval_ms: u64,
    /// Maximum number of consecutive failed rounds
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Retry delay in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Retry delay cap in milliseconds
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> String {
    "60s".to_string()
}

fn default_max_retries() -> u32 {
    10
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_max_retry_delay_ms() -> u64 {
    30_000
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            timeout: default_timeout(),
            max_rounds: None,
            poll_interval_ms: 0,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}

impl GlobalConfig {
    pub fn timeout(&self) -> anyhow::Result<Duration> {
        humantime::parse_duration(&self.timeout)
            .with_context(|| format!("invalid global timeout {:?}", self.timeout))
    }

    /// Driver settings for one handshake attempt
    pub fn driver_config(&self) -> anyhow::Result<DriverConfig> {
        Ok(DriverConfig {
            timeout: self.timeout()?,
            max_rounds: self.max_rounds,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            retry: RetryConfig {
                max_retries: self.max_retries,
                initial_delay_ms: self.retry_delay_ms,
                max_delay_ms: self.max_retry_delay_ms,
                ..RetryConfig::default()
            },
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain identifier
    pub chain_id: String,
    /// JSON-RPC gateway endpoint
    #[serde(default)]
    pub rpc_endpoint: String,
    /// Chain-specific configuration
    pub config: ChainSpecificConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChainSpecificConfig {
    #[serde(rename = "rpc")]
    Rpc {
        /// Name of the signing key held by the gateway
        key: String,
        /// Bech32 account prefix
        account_prefix: String,
        /// Gas limit per transaction
        gas: u64,
        gas_adjustment: f64,
        /// Gas price with denom, e.g. "0.025stake"
        gas_prices: String,
        default_denom: String,
        #[serde(default)]
        memo: String,
        /// Trusting period of clients tracking this chain, e.g. "336h"
        trusting_period: String,
        #[serde(default = "default_request_timeout_ms")]
        request_timeout_ms: u64,
    },
    #[serde(rename = "mock")]
    Mock {
        /// Seed of the validator key
        #[serde(default)]
        seed: Option<String>,
    },
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl ChainConfig {
    /// In-memory chain entry
    pub fn mock(chain_id: &str) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            rpc_endpoint: String::new(),
            config: ChainSpecificConfig::Mock { seed: None },
        }
    }

    /// Gateway chain entry with default fee settings
    pub fn rpc(chain_id: &str, rpc_endpoint: &str) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            rpc_endpoint: rpc_endpoint.to_string(),
            config: ChainSpecificConfig::Rpc {
                key: "relayer".to_string(),
                account_prefix: "cosmos".to_string(),
                gas: 200_000,
                gas_adjustment: 1.3,
                gas_prices: "0.025stake".to_string(),
                default_denom: "stake".to_string(),
                memo: String::new(),
                trusting_period: "336h".to_string(),
                request_timeout_ms: default_request_timeout_ms(),
            },
        }
    }

    /// Trusting period for clients created to track this chain
    pub fn trusting_period(&self) -> anyhow::Result<Duration> {
        match &self.config {
            ChainSpecificConfig::Rpc { trusting_period, .. } => humantime::parse_duration(trusting_period)
                .with_context(|| format!("invalid trusting period {:?} for {}", trusting_period, self.chain_id)),
            ChainSpecificConfig::Mock { .. } => Ok(crate::relay::client_update::DEFAULT_TRUSTING_PERIOD),
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if let ChainSpecificConfig::Rpc { .. } = self.config {
            if self.rpc_endpoint.is_empty() {
                bail!("chain {} has no rpc_endpoint", self.chain_id);
            }
            self.trusting_period()?;
        }
        Ok(())
    }
}

/// One side of a configured path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathEndConfig {
    pub chain_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub connection_id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub port_id: String,
}

impl PathEndConfig {
    pub fn identifiers(&self) -> Result<PathIdentifiers, crate::error::RelayerError> {
        PathIdentifiers::with_full_path(&self.client_id, &self.connection_id, &self.channel_id, &self.port_id)
    }

    /// Copy identifiers learned during a handshake; returns whether anything changed
    fn record(&mut self, ids: &PathIdentifiers) -> bool {
        let mut changed = false;
        for (kind, slot) in [
            (PathKind::Client, &mut self.client_id),
            (PathKind::Connection, &mut self.connection_id),
            (PathKind::Channel, &mut self.channel_id),
            (PathKind::Port, &mut self.port_id),
        ] {
            if let Some(id) = ids.get(kind) {
                if slot.as_str() != id {
                    *slot = id.to_string();
                    changed = true;
                }
            }
        }
        changed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    pub name: String,
    pub src: PathEndConfig,
    pub dst: PathEndConfig,
    /// Channel ordering requested when opening the channel
    #[serde(default = "default_ordering")]
    pub ordering: Order,
}

fn default_ordering() -> Order {
    Order::Unordered
}

impl RelayerConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RelayerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get chain configuration by chain ID
    pub fn get_chain(&self, chain_id: &str) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }

    /// Get path configuration by name
    pub fn get_path(&self, name: &str) -> Option<&PathConfig> {
        self.paths.iter().find(|p| p.name == name)
    }

    /// Write identifiers learned on both ends back into path `name`
    ///
    /// Returns whether the path changed and needs saving.
    pub fn record_path_identifiers(
        &mut self,
        name: &str,
        src: &PathIdentifiers,
        dst: &PathIdentifiers,
    ) -> anyhow::Result<bool> {
        let path = self
            .paths
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| anyhow!("path {} is not configured", name))?;
        let src_changed = path.src.record(src);
        let dst_changed = path.dst.record(dst);
        Ok(src_changed || dst_changed)
    }

    /// Check chain entries and that every path references known chains with valid identifiers
    pub fn validate(&self) -> anyhow::Result<()> {
        self.global.timeout()?;

        let mut chain_ids = HashSet::new();
        for chain in self.chains.values() {
            chain.validate()?;
            if !chain_ids.insert(chain.chain_id.as_str()) {
                bail!("chain {} is configured more than once", chain.chain_id);
            }
        }

        let mut names = HashSet::new();
        for path in &self.paths {
            if !names.insert(path.name.as_str()) {
                bail!("path {} is configured more than once", path.name);
            }
            if path.src.chain_id == path.dst.chain_id {
                bail!("path {} connects {} to itself", path.name, path.src.chain_id);
            }
            if path.ordering == Order::None {
                bail!("path {} must request ORDERED or UNORDERED", path.name);
            }
            for end in [&path.src, &path.dst] {
                if !chain_ids.contains(end.chain_id.as_str()) {
                    bail!("path {} references unknown chain {}", path.name, end.chain_id);
                }
                end.identifiers()
                    .map_err(|e| anyhow!("path {}: {}", path.name, e))?;
            }
        }
        Ok(())
    }
}

impl Default for RelayerConfig {
    fn default() -> Self {
        let mut chains = HashMap::new();
        chains.insert("ibc-0".to_string(), ChainConfig::mock("ibc-0"));
        chains.insert("ibc-1".to_string(), ChainConfig::mock("ibc-1"));

        Self {
            global: GlobalConfig::default(),
            chains,
            paths: vec![PathConfig {
                name: "demo".to_string(),
                src: PathEndConfig {
                    chain_id: "ibc-0".to_string(),
                    client_id: "07-tendermint-0".to_string(),
                    port_id: "transfer".to_string(),
                    ..PathEndConfig::default()
                },
                dst: PathEndConfig {
                    chain_id: "ibc-1".to_string(),
                    client_id: "07-tendermint-0".to_string(),
                    port_id: "transfer".to_string(),
                    ..PathEndConfig::default()
                },
                ordering: Order::Unordered,
            }],
        }
    }
}
