// Error taxonomy for the handshake engine
// Lower components surface these immediately; only the driver retries.

use thiserror::Error;

use crate::chains::State;
use crate::relay::selector::StatePair;

/// Errors reported by the handshake engine
#[derive(Error, Debug, Clone)]
pub enum RelayerError {
    /// Stale or unverifiable header; retryable next round with a fresh fetch
    #[error("light client sync failed for {chain_id}: {reason}")]
    LightClientSync { chain_id: String, reason: String },

    /// Network or timeout failure while probing state; always retryable
    #[error("query failed on {chain_id}: {reason}")]
    Query { chain_id: String, reason: String },

    /// Protocol states inconsistent with the handshake table
    #[error("illegal handshake state {states}: {reason}")]
    IllegalState { states: StatePair, reason: String },

    /// The chain included or checked the transaction and refused it
    #[error("transaction rejected by {chain_id} (code {code}): {log}")]
    Rejected { chain_id: String, code: u32, log: String },

    /// Broadcast accepted but inclusion was not confirmed
    #[error("inclusion of transaction on {chain_id} not confirmed: {reason}")]
    DispatchTimeout { chain_id: String, reason: String },

    /// Broadcast never reached the chain
    #[error("broadcast to {chain_id} failed: {reason}")]
    Broadcast { chain_id: String, reason: String },

    #[error("invalid {kind} identifier {value:?}: {reason}")]
    InvalidIdentifier { kind: &'static str, value: String, reason: String },

    #[error("{kind} identifier already set to {current:?}, refusing {requested:?}")]
    PathAlreadySet { kind: &'static str, current: String, requested: String },

    #[error("{kind} identifier is not set on {chain_id}")]
    MissingIdentifier { kind: &'static str, chain_id: String },

    #[error("refusing to dispatch an empty message batch")]
    EmptyBatch,

    #[error("chain not found: {0}")]
    UnknownChain(String),

    #[error("source and destination are the same chain: {0}")]
    SameChain(String),

    #[error("handshake cancelled after {rounds} rounds, last observed state {}", display_last(.last))]
    Cancelled { last: Option<StatePair>, rounds: u32 },

    #[error("handshake failed, last observed state {}: {source}", display_last(.last))]
    HandshakeFailed {
        last: Option<StatePair>,
        #[source]
        source: Box<RelayerError>,
    },

    #[error("handshake timed out after {rounds} rounds, last observed state {}", display_last(.last))]
    HandshakeTimedOut { last: Option<StatePair>, rounds: u32 },
}

fn display_last(last: &Option<StatePair>) -> String {
    match last {
        Some(states) => states.to_string(),
        None => "unknown".to_string(),
    }
}

impl RelayerError {
    /// Whether the driver may start another round after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayerError::LightClientSync { .. }
                | RelayerError::Query { .. }
                | RelayerError::DispatchTimeout { .. }
                | RelayerError::Broadcast { .. }
        )
    }

    pub(crate) fn illegal(src: State, dst: State, reason: impl Into<String>) -> Self {
        RelayerError::IllegalState {
            states: StatePair::new(src, dst),
            reason: reason.into(),
        }
    }

    /// Last observed state pair carried by a terminal driver error
    pub fn last_observed(&self) -> Option<StatePair> {
        match self {
            RelayerError::Cancelled { last, .. }
            | RelayerError::HandshakeFailed { last, .. }
            | RelayerError::HandshakeTimedOut { last, .. } => *last,
            RelayerError::IllegalState { states, .. } => Some(*states),
            _ => None,
        }
    }
}
