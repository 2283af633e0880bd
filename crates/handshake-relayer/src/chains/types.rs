// IBC object types exchanged with the Chain capability

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::base64_bytes;
use crate::utils::crypto::sha256;

/// Block height on one chain
pub type Height = u64;

/// Handshake state of a connection or channel end as stored on one chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum State {
    #[serde(rename = "UNINITIALIZED")]
    Uninitialized,
    #[serde(rename = "INIT")]
    Init,
    #[serde(rename = "TRYOPEN")]
    TryOpen,
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "CLOSED")]
    Closed,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Uninitialized => "UNINITIALIZED",
            State::Init => "INIT",
            State::TryOpen => "TRYOPEN",
            State::Open => "OPEN",
            State::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel ordering; `None` is what an uninitialized end reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Order {
    #[default]
    None,
    Unordered,
    Ordered,
}

impl Order {
    pub fn as_str(&self) -> &'static str {
        match self {
            Order::None => "NONE",
            Order::Unordered => "UNORDERED",
            Order::Ordered => "ORDERED",
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ordered" | "order_ordered" => Ok(Order::Ordered),
            "unordered" | "order_unordered" => Ok(Order::Unordered),
            other => Err(format!("unknown channel ordering: {}", other)),
        }
    }
}

/// A signed snapshot of a chain's consensus state at one height
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub chain_id: String,
    pub height: Height,
    pub time: DateTime<Utc>,
    #[serde(with = "base64_bytes")]
    pub app_hash: Vec<u8>,
    /// Public key of the validator that signed the header
    #[serde(with = "base64_bytes")]
    pub validator_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

impl Header {
    /// Bytes covered by the header signature
    pub fn sign_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(self.chain_id.as_bytes());
        bytes.extend_from_slice(&self.height.to_be_bytes());
        bytes.extend_from_slice(self.time.to_rfc3339().as_bytes());
        bytes.extend_from_slice(&self.app_hash);
        sha256(&bytes).to_vec()
    }
}

/// Membership proof of a stored value at a given height
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Proof {
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    pub height: Height,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionCounterparty {
    pub client_id: String,
    pub connection_id: String,
}

/// Connection end as stored on one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEnd {
    pub state: State,
    pub client_id: String,
    pub counterparty: ConnectionCounterparty,
}

impl ConnectionEnd {
    /// What a chain reports for a connection it has never seen
    pub fn uninitialized() -> Self {
        Self {
            state: State::Uninitialized,
            client_id: String::new(),
            counterparty: ConnectionCounterparty::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionResponse {
    pub connection: ConnectionEnd,
    pub proof: Proof,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelCounterparty {
    pub port_id: String,
    pub channel_id: String,
}

/// Channel end as stored on one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEnd {
    pub state: State,
    pub ordering: Order,
    pub counterparty: ChannelCounterparty,
    pub connection_hops: Vec<String>,
}

impl ChannelEnd {
    pub fn uninitialized() -> Self {
        Self {
            state: State::Uninitialized,
            ordering: Order::None,
            counterparty: ChannelCounterparty::default(),
            connection_hops: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelResponse {
    pub channel: ChannelEnd,
    pub proof: Proof,
}

/// Event emitted by an included transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEvent {
    pub event_type: String,
    pub attributes: Vec<(String, String)>,
}

impl TxEvent {
    pub fn new(event_type: &str, attributes: &[(&str, &str)]) -> Self {
        Self {
            event_type: event_type.to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Settlement result of one submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: String,
    pub height: Height,
    pub success: bool,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub events: Vec<TxEvent>,
}
