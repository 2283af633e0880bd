// State probing of connection and channel ends at a synchronized height
use serde::Serialize;
use tracing::debug;

use crate::chains::{
    ChainError, ChainRef, ChannelEnd, ChannelResponse, ConnectionEnd, ConnectionResponse, Height,
    Order, Proof, State,
};
use crate::error::RelayerError;
use crate::relay::path::{PathEnd, PathKind};

/// What one side reported for a handshake object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbedEnd {
    pub chain_id: String,
    pub height: Height,
    pub state: State,
    /// `Order::None` for connections and uninitialized channels
    pub ordering: Order,
    /// Identifier this end records for its counterparty object, empty if unknown
    pub counterparty_id: String,
    /// Membership proof of the end at `height`
    pub proof: Proof,
}

impl ProbedEnd {
    fn uninitialized(chain_id: &str, height: Height) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            height,
            state: State::Uninitialized,
            ordering: Order::None,
            counterparty_id: String::new(),
            proof: Proof::default(),
        }
    }
}

fn query_error(chain: &ChainRef, e: ChainError) -> RelayerError {
    RelayerError::Query {
        chain_id: chain.chain_id().to_string(),
        reason: e.to_string(),
    }
}

async fn query_connection(
    chain: &ChainRef,
    height: Height,
    connection_id: &str,
) -> Result<ConnectionResponse, RelayerError> {
    match chain.handle().query_connection(connection_id, height).await {
        Ok(response) => Ok(response),
        Err(ChainError::NotFound(_)) => Ok(ConnectionResponse {
            connection: ConnectionEnd::uninitialized(),
            proof: Proof::default(),
        }),
        Err(e) => Err(query_error(chain, e)),
    }
}

async fn query_channel(
    chain: &ChainRef,
    height: Height,
    port_id: &str,
    channel_id: &str,
) -> Result<ChannelResponse, RelayerError> {
    match chain.handle().query_channel(port_id, channel_id, height).await {
        Ok(response) => Ok(response),
        Err(ChainError::NotFound(_)) => Ok(ChannelResponse {
            channel: ChannelEnd::uninitialized(),
            proof: Proof::default(),
        }),
        Err(e) => Err(query_error(chain, e)),
    }
}

/// State of a connection as observed by `chain` at `height`
pub async fn probe_connection_state(
    chain: &ChainRef,
    height: Height,
    connection_id: &str,
) -> Result<State, RelayerError> {
    Ok(query_connection(chain, height, connection_id)
        .await?
        .connection
        .state)
}

/// State and declared ordering of a channel as observed by `chain` at `height`
pub async fn probe_channel_state(
    chain: &ChainRef,
    height: Height,
    port_id: &str,
    channel_id: &str,
) -> Result<(State, Order), RelayerError> {
    let channel = query_channel(chain, height, port_id, channel_id).await?.channel;
    Ok((channel.state, channel.ordering))
}

/// Probe the connection of a path end; an end without a connection ID is uninitialized
pub async fn probe_connection(end: &PathEnd, height: Height) -> Result<ProbedEnd, RelayerError> {
    let chain = end.chain();
    let connection_id = match end.ids().get(PathKind::Connection) {
        Some(id) => id,
        None => return Ok(ProbedEnd::uninitialized(chain.chain_id(), height)),
    };

    let response = query_connection(chain, height, connection_id).await?;
    debug!(
        "Probed connection {} on {} at height {}: {}",
        connection_id,
        chain.chain_id(),
        height,
        response.connection.state
    );

    Ok(ProbedEnd {
        chain_id: chain.chain_id().to_string(),
        height,
        state: response.connection.state,
        ordering: Order::None,
        counterparty_id: response.connection.counterparty.connection_id,
        proof: response.proof,
    })
}

/// Probe the channel of a path end; an end without a channel ID is uninitialized
pub async fn probe_channel(end: &PathEnd, height: Height) -> Result<ProbedEnd, RelayerError> {
    let chain = end.chain();
    let channel_id = match end.ids().get(PathKind::Channel) {
        Some(id) => id,
        None => return Ok(ProbedEnd::uninitialized(chain.chain_id(), height)),
    };
    let port_id = end.port_id()?;

    let response = query_channel(chain, height, port_id, channel_id).await?;
    debug!(
        "Probed channel {}/{} on {} at height {}: {} {}",
        port_id,
        channel_id,
        chain.chain_id(),
        height,
        response.channel.state,
        response.channel.ordering
    );

    Ok(ProbedEnd {
        chain_id: chain.chain_id().to_string(),
        height,
        state: response.channel.state,
        ordering: response.channel.ordering,
        counterparty_id: response.channel.counterparty.channel_id,
        proof: response.proof,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{ConnectionCounterparty, MockChain};
    use crate::relay::path::PathIdentifiers;
    use std::sync::Arc;

    fn path_end(mock: Arc<MockChain>, ids: PathIdentifiers) -> PathEnd {
        PathEnd::new(Arc::new(ChainRef::new(mock)), ids)
    }

    #[tokio::test]
    async fn test_unknown_connection_is_uninitialized() {
        let mock = Arc::new(MockChain::new("ibc-0"));
        let height = mock.height();
        let end = path_end(
            mock,
            PathIdentifiers::with_connection("07-tendermint-0", "connection-7").unwrap(),
        );

        let probed = probe_connection(&end, height).await.unwrap();
        assert_eq!(probed.state, State::Uninitialized);
        assert_eq!(
            probe_connection_state(end.chain(), height, "connection-7").await.unwrap(),
            State::Uninitialized
        );
    }

    #[tokio::test]
    async fn test_probe_reads_the_requested_height() {
        let mock = Arc::new(MockChain::new("ibc-0"));
        let before = mock.height();
        mock.set_connection_end(
            "connection-0",
            ConnectionEnd {
                state: State::Init,
                client_id: "07-tendermint-0".to_string(),
                counterparty: ConnectionCounterparty {
                    client_id: "07-tendermint-1".to_string(),
                    connection_id: String::new(),
                },
            },
        );
        let after = mock.height();
        let end = path_end(
            mock,
            PathIdentifiers::with_connection("07-tendermint-0", "connection-0").unwrap(),
        );

        assert_eq!(probe_connection(&end, before).await.unwrap().state, State::Uninitialized);
        let probed = probe_connection(&end, after).await.unwrap();
        assert_eq!(probed.state, State::Init);
        assert_eq!(probed.proof.height, after);
        assert!(!probed.proof.bytes.is_empty());
    }

    #[tokio::test]
    async fn test_query_failure_is_retryable() {
        let mock = Arc::new(MockChain::new("ibc-0"));
        mock.fail_queries(1);
        let height = mock.height();
        let end = path_end(
            mock,
            PathIdentifiers::with_full_path("07-tendermint-0", "connection-0", "channel-0", "transfer")
                .unwrap(),
        );

        let err = probe_channel(&end, height).await.unwrap_err();
        assert!(matches!(err, RelayerError::Query { .. }));
        assert!(err.is_retryable());

        // next query goes through
        let (state, ordering) = probe_channel_state(end.chain(), height, "transfer", "channel-0")
            .await
            .unwrap();
        assert_eq!((state, ordering), (State::Uninitialized, Order::None));
    }
}
