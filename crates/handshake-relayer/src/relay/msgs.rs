// IBC handshake messages and the per-round message batch

use serde::{Deserialize, Serialize};

use crate::chains::{Header, Order, Proof};
use crate::relay::selector::Side;

/// Protocol message submitted to a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum Msg {
    #[serde(rename = "/ibc.core.client.v1.MsgCreateClient")]
    CreateClient {
        client_id: String,
        header: Header,
        trusting_period_secs: u64,
    },
    #[serde(rename = "/ibc.core.client.v1.MsgUpdateClient")]
    UpdateClient { client_id: String, header: Header },
    #[serde(rename = "/ibc.core.connection.v1.MsgConnectionOpenInit")]
    ConnOpenInit {
        client_id: String,
        connection_id: String,
        counterparty_client_id: String,
        counterparty_connection_id: String,
    },
    #[serde(rename = "/ibc.core.connection.v1.MsgConnectionOpenTry")]
    ConnOpenTry {
        client_id: String,
        connection_id: String,
        counterparty_client_id: String,
        counterparty_connection_id: String,
        proof_init: Proof,
    },
    #[serde(rename = "/ibc.core.connection.v1.MsgConnectionOpenAck")]
    ConnOpenAck {
        connection_id: String,
        counterparty_connection_id: String,
        proof_try: Proof,
    },
    #[serde(rename = "/ibc.core.connection.v1.MsgConnectionOpenConfirm")]
    ConnOpenConfirm { connection_id: String, proof_ack: Proof },
    #[serde(rename = "/ibc.core.channel.v1.MsgChannelOpenInit")]
    ChanOpenInit {
        port_id: String,
        channel_id: String,
        connection_id: String,
        counterparty_port_id: String,
        counterparty_channel_id: String,
        ordering: Order,
    },
    #[serde(rename = "/ibc.core.channel.v1.MsgChannelOpenTry")]
    ChanOpenTry {
        port_id: String,
        channel_id: String,
        connection_id: String,
        counterparty_port_id: String,
        counterparty_channel_id: String,
        ordering: Order,
        proof_init: Proof,
    },
    #[serde(rename = "/ibc.core.channel.v1.MsgChannelOpenAck")]
    ChanOpenAck {
        port_id: String,
        channel_id: String,
        counterparty_channel_id: String,
        proof_try: Proof,
    },
    #[serde(rename = "/ibc.core.channel.v1.MsgChannelOpenConfirm")]
    ChanOpenConfirm {
        port_id: String,
        channel_id: String,
        proof_ack: Proof,
    },
    #[serde(rename = "/ibc.core.channel.v1.MsgChannelCloseInit")]
    ChanCloseInit { port_id: String, channel_id: String },
    #[serde(rename = "/ibc.core.channel.v1.MsgChannelCloseConfirm")]
    ChanCloseConfirm {
        port_id: String,
        channel_id: String,
        proof_init: Proof,
    },
}

impl Msg {
    pub fn type_url(&self) -> &'static str {
        match self {
            Msg::CreateClient { .. } => "/ibc.core.client.v1.MsgCreateClient",
            Msg::UpdateClient { .. } => "/ibc.core.client.v1.MsgUpdateClient",
            Msg::ConnOpenInit { .. } => "/ibc.core.connection.v1.MsgConnectionOpenInit",
            Msg::ConnOpenTry { .. } => "/ibc.core.connection.v1.MsgConnectionOpenTry",
            Msg::ConnOpenAck { .. } => "/ibc.core.connection.v1.MsgConnectionOpenAck",
            Msg::ConnOpenConfirm { .. } => "/ibc.core.connection.v1.MsgConnectionOpenConfirm",
            Msg::ChanOpenInit { .. } => "/ibc.core.channel.v1.MsgChannelOpenInit",
            Msg::ChanOpenTry { .. } => "/ibc.core.channel.v1.MsgChannelOpenTry",
            Msg::ChanOpenAck { .. } => "/ibc.core.channel.v1.MsgChannelOpenAck",
            Msg::ChanOpenConfirm { .. } => "/ibc.core.channel.v1.MsgChannelOpenConfirm",
            Msg::ChanCloseInit { .. } => "/ibc.core.channel.v1.MsgChannelCloseInit",
            Msg::ChanCloseConfirm { .. } => "/ibc.core.channel.v1.MsgChannelCloseConfirm",
        }
    }

    /// Whether this message carries a proof of counterparty state
    pub fn carries_proof(&self) -> bool {
        matches!(
            self,
            Msg::ConnOpenTry { .. }
                | Msg::ConnOpenAck { .. }
                | Msg::ConnOpenConfirm { .. }
                | Msg::ChanOpenTry { .. }
                | Msg::ChanOpenAck { .. }
                | Msg::ChanOpenConfirm { .. }
                | Msg::ChanCloseConfirm { .. }
        )
    }
}

/// Ordered messages for exactly one side of a path
///
/// At most one of the two slots is ever populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageBatch {
    src: Vec<Msg>,
    dst: Vec<Msg>,
}

impl MessageBatch {
    /// Batch that advances nothing
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn for_side(side: Side, msgs: Vec<Msg>) -> Self {
        match side {
            Side::Src => Self { src: msgs, dst: Vec::new() },
            Side::Dst => Self { src: Vec::new(), dst: msgs },
        }
    }

    pub fn src(&self) -> &[Msg] {
        &self.src
    }

    pub fn dst(&self) -> &[Msg] {
        &self.dst
    }

    /// Side the batch must be sent to, `None` when empty
    pub fn target(&self) -> Option<Side> {
        if !self.src.is_empty() {
            Some(Side::Src)
        } else if !self.dst.is_empty() {
            Some(Side::Dst)
        } else {
            None
        }
    }

    pub fn msgs(&self) -> &[Msg] {
        match self.target() {
            Some(Side::Src) => &self.src,
            Some(Side::Dst) => &self.dst,
            None => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.src.is_empty() && self.dst.is_empty()
    }

    pub fn len(&self) -> usize {
        self.src.len() + self.dst.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close_init() -> Msg {
        Msg::ChanCloseInit {
            port_id: "transfer".to_string(),
            channel_id: "channel-0".to_string(),
        }
    }

    #[test]
    fn test_batch_targets_one_side() {
        let batch = MessageBatch::for_side(Side::Dst, vec![close_init()]);
        assert_eq!(batch.target(), Some(Side::Dst));
        assert!(batch.src().is_empty());
        assert_eq!(batch.msgs().len(), 1);

        let empty = MessageBatch::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.target(), None);
        assert!(empty.msgs().is_empty());
    }

    #[test]
    fn test_msg_serializes_with_type_url() {
        let msg = close_init();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["@type"], msg.type_url());
        assert_eq!(json["channel_id"], "channel-0");
        assert!(!msg.carries_proof());

        let decoded: Msg = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, msg);
    }
}
