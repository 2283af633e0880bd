// Path identifiers: one chain's view of the objects taking part in a handshake

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::chains::ChainRef;
use crate::error::RelayerError;

/// Kind of identifier recorded on a path end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    Client,
    Connection,
    Channel,
    Port,
}

impl PathKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathKind::Client => "client",
            PathKind::Connection => "connection",
            PathKind::Channel => "channel",
            PathKind::Port => "port",
        }
    }

    /// Allowed identifier length, ICS-24
    fn length_bounds(&self) -> (usize, usize) {
        match self {
            PathKind::Client => (9, 64),
            PathKind::Connection => (10, 64),
            PathKind::Channel => (8, 64),
            PathKind::Port => (2, 128),
        }
    }
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate an identifier against the ICS-24 host requirements
pub fn validate_identifier(kind: PathKind, value: &str) -> Result<(), RelayerError> {
    let invalid = |reason: String| RelayerError::InvalidIdentifier {
        kind: kind.as_str(),
        value: value.to_string(),
        reason,
    };

    let (min, max) = kind.length_bounds();
    if value.len() < min || value.len() > max {
        return Err(invalid(format!(
            "length {} outside [{}, {}]",
            value.len(),
            min,
            max
        )));
    }

    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || "._+-#[]<>".contains(*c)))
    {
        return Err(invalid(format!("character {:?} not allowed", c)));
    }

    Ok(())
}

/// Identifiers known for one chain's side of a handshake
///
/// A field, once set, keeps its value; setting the same value again is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathIdentifiers {
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    connection_id: String,
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    port_id: String,
}

impl PathIdentifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers for a client-only path
    pub fn with_client(client_id: &str) -> Result<Self, RelayerError> {
        let mut ids = Self::new();
        ids.set(PathKind::Client, client_id)?;
        Ok(ids)
    }

    /// Identifiers for a connection path
    pub fn with_connection(client_id: &str, connection_id: &str) -> Result<Self, RelayerError> {
        let mut ids = Self::with_client(client_id)?;
        ids.set(PathKind::Connection, connection_id)?;
        Ok(ids)
    }

    /// Identifiers for a full channel path
    pub fn with_full_path(
        client_id: &str,
        connection_id: &str,
        channel_id: &str,
        port_id: &str,
    ) -> Result<Self, RelayerError> {
        let mut ids = Self::with_connection(client_id, connection_id)?;
        ids.set(PathKind::Channel, channel_id)?;
        ids.set(PathKind::Port, port_id)?;
        Ok(ids)
    }

    fn slot(&mut self, kind: PathKind) -> &mut String {
        match kind {
            PathKind::Client => &mut self.client_id,
            PathKind::Connection => &mut self.connection_id,
            PathKind::Channel => &mut self.channel_id,
            PathKind::Port => &mut self.port_id,
        }
    }

    /// Record an identifier; an empty value leaves the slot untouched
    pub fn set(&mut self, kind: PathKind, value: &str) -> Result<(), RelayerError> {
        if value.is_empty() {
            return Ok(());
        }
        validate_identifier(kind, value)?;

        let slot = self.slot(kind);
        if slot.is_empty() {
            *slot = value.to_string();
            Ok(())
        } else if slot == value {
            Ok(())
        } else {
            Err(RelayerError::PathAlreadySet {
                kind: kind.as_str(),
                current: slot.clone(),
                requested: value.to_string(),
            })
        }
    }

    pub fn get(&self, kind: PathKind) -> Option<&str> {
        let value = match kind {
            PathKind::Client => &self.client_id,
            PathKind::Connection => &self.connection_id,
            PathKind::Channel => &self.channel_id,
            PathKind::Port => &self.port_id,
        };
        if value.is_empty() {
            None
        } else {
            Some(value.as_str())
        }
    }

    pub fn is_set(&self, kind: PathKind) -> bool {
        self.get(kind).is_some()
    }
}

/// One side of a handshake: a shared chain endpoint plus this attempt's identifiers
///
/// Each side owns its identifiers, so recording an identifier on one side
/// can never touch the other.
#[derive(Debug, Clone)]
pub struct PathEnd {
    chain: Arc<ChainRef>,
    ids: PathIdentifiers,
}

impl PathEnd {
    pub fn new(chain: Arc<ChainRef>, ids: PathIdentifiers) -> Self {
        Self { chain, ids }
    }

    pub fn chain(&self) -> &Arc<ChainRef> {
        &self.chain
    }

    pub fn chain_id(&self) -> &str {
        self.chain.chain_id()
    }

    pub fn ids(&self) -> &PathIdentifiers {
        &self.ids
    }

    /// Record an identifier created on this side's chain
    pub fn set_path_identifier(&mut self, kind: PathKind, value: &str) -> Result<(), RelayerError> {
        self.ids.set(kind, value)
    }

    /// Identifier that must already be known to build a message
    pub fn require(&self, kind: PathKind) -> Result<&str, RelayerError> {
        self.ids.get(kind).ok_or_else(|| RelayerError::MissingIdentifier {
            kind: kind.as_str(),
            chain_id: self.chain_id().to_string(),
        })
    }

    pub fn client_id(&self) -> Result<&str, RelayerError> {
        self.require(PathKind::Client)
    }

    pub fn connection_id(&self) -> Result<&str, RelayerError> {
        self.require(PathKind::Connection)
    }

    pub fn channel_id(&self) -> Result<&str, RelayerError> {
        self.require(PathKind::Channel)
    }

    pub fn port_id(&self) -> Result<&str, RelayerError> {
        self.require(PathKind::Port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::MockChain;

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier(PathKind::Client, "07-tendermint-0").is_ok());
        assert!(validate_identifier(PathKind::Connection, "connection-0").is_ok());
        assert!(validate_identifier(PathKind::Channel, "channel-0").is_ok());
        assert!(validate_identifier(PathKind::Port, "transfer").is_ok());

        // too short for a client
        assert!(validate_identifier(PathKind::Client, "client").is_err());
        // path separators are never allowed
        assert!(validate_identifier(PathKind::Connection, "connection/0").is_err());
        assert!(validate_identifier(PathKind::Port, "x").is_err());
        assert!(validate_identifier(PathKind::Port, &"p".repeat(129)).is_err());
    }

    #[test]
    fn test_identifiers_are_immutable_once_set() {
        let mut ids = PathIdentifiers::with_connection("07-tendermint-0", "connection-0").unwrap();
        assert_eq!(ids.get(PathKind::Client), Some("07-tendermint-0"));
        assert!(!ids.is_set(PathKind::Channel));

        // same value again is fine
        ids.set(PathKind::Connection, "connection-0").unwrap();
        // empty value leaves the slot alone
        ids.set(PathKind::Connection, "").unwrap();
        assert_eq!(ids.get(PathKind::Connection), Some("connection-0"));

        let err = ids.set(PathKind::Connection, "connection-1").unwrap_err();
        assert!(matches!(err, RelayerError::PathAlreadySet { kind: "connection", .. }));
    }

    #[test]
    fn test_path_ends_are_side_scoped() {
        let chain_a = Arc::new(ChainRef::new(Arc::new(MockChain::new("ibc-0"))));
        let chain_b = Arc::new(ChainRef::new(Arc::new(MockChain::new("ibc-1"))));
        let mut src = PathEnd::new(chain_a, PathIdentifiers::with_client("07-tendermint-0").unwrap());
        let dst = PathEnd::new(chain_b, PathIdentifiers::with_client("07-tendermint-1").unwrap());

        src.set_path_identifier(PathKind::Connection, "connection-0").unwrap();

        assert_eq!(src.connection_id().unwrap(), "connection-0");
        assert!(matches!(
            dst.connection_id(),
            Err(RelayerError::MissingIdentifier { kind: "connection", .. })
        ));
    }
}
