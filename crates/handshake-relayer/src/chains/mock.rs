// In-memory chain with real IBC handshake semantics
// Used by tests and by mock chain entries for local dry runs.

use async_trait::async_trait;
use chrono::Utc;
use ed25519_dalek::SigningKey;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{
    Chain, ChainError, ChannelCounterparty, ChannelEnd, ChannelResponse, ConnectionCounterparty,
    ConnectionEnd, ConnectionResponse, Header, Height, Order, Proof, Receipt, State, TxEvent,
};
use crate::relay::msgs::Msg;
use crate::utils::crypto::{
    calculate_merkle_root, sha256, sign_ed25519, signing_key_from_seed, verify_ed25519_signature,
};

const CODE_REJECTED: u32 = 1;

/// Blocks kept for historical queries and header checks
const RETAINED_BLOCKS: usize = 256;

#[derive(Debug, Clone)]
struct ClientState {
    counterparty_chain_id: String,
    validator_key: Vec<u8>,
    latest_height: Height,
    trusting_period_secs: u64,
    /// Committed app hash of the counterparty per height
    consensus: BTreeMap<Height, Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
struct Store {
    clients: BTreeMap<String, ClientState>,
    connections: BTreeMap<String, ConnectionEnd>,
    channels: BTreeMap<(String, String), ChannelEnd>,
    next_connection: u64,
    next_channel: u64,
}

fn connection_key(connection_id: &str) -> String {
    format!("connections/{}", connection_id)
}

fn channel_key(port_id: &str, channel_id: &str) -> String {
    format!("channelEnds/ports/{}/channels/{}", port_id, channel_id)
}

fn encode<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn proof_bytes(app_hash: &[u8], key: &str, value: &str) -> Vec<u8> {
    let mut bytes = app_hash.to_vec();
    bytes.extend_from_slice(key.as_bytes());
    bytes.extend_from_slice(value.as_bytes());
    sha256(&bytes).to_vec()
}

impl Store {
    fn root(&self, height: Height) -> Vec<u8> {
        let mut leaves: Vec<Vec<u8>> = Vec::new();
        for (id, end) in &self.connections {
            leaves.push(format!("{}={}", connection_key(id), encode(end)).into_bytes());
        }
        for ((port, chan), end) in &self.channels {
            leaves.push(format!("{}={}", channel_key(port, chan), encode(end)).into_bytes());
        }
        for (id, client) in &self.clients {
            leaves.push(format!("clients/{}={}", id, client.latest_height).into_bytes());
        }

        let mut bytes = calculate_merkle_root(&leaves).to_vec();
        bytes.extend_from_slice(&height.to_be_bytes());
        sha256(&bytes).to_vec()
    }

    fn client(&self, client_id: &str) -> Result<&ClientState, String> {
        self.clients
            .get(client_id)
            .ok_or_else(|| format!("client {} not found", client_id))
    }

    fn open_connection(&self, connection_id: &str) -> Result<&ConnectionEnd, String> {
        match self.connections.get(connection_id) {
            Some(end) if end.state == State::Open => Ok(end),
            Some(end) => Err(format!("connection {} is {}, not OPEN", connection_id, end.state)),
            None => Err(format!("connection {} not found", connection_id)),
        }
    }

    /// Check that the counterparty committed one of `candidates` under `key`
    fn verify_membership(
        &self,
        client_id: &str,
        proof: &Proof,
        key: &str,
        candidates: &[String],
    ) -> Result<(), String> {
        let client = self.client(client_id)?;
        let app_hash = client.consensus.get(&proof.height).ok_or_else(|| {
            format!("client {} has no consensus state at height {}", client_id, proof.height)
        })?;

        if candidates
            .iter()
            .any(|value| proof_bytes(app_hash, key, value) == proof.bytes)
        {
            Ok(())
        } else {
            Err(format!("proof verification failed for {} at height {}", key, proof.height))
        }
    }

    fn allocate_connection(&mut self, requested: &str) -> String {
        if !requested.is_empty() {
            return requested.to_string();
        }
        let id = format!("connection-{}", self.next_connection);
        self.next_connection += 1;
        id
    }

    fn allocate_channel(&mut self, requested: &str) -> String {
        if !requested.is_empty() {
            return requested.to_string();
        }
        let id = format!("channel-{}", self.next_channel);
        self.next_channel += 1;
        id
    }

    fn verify_header(client: &ClientState, header: &Header) -> Result<(), String> {
        if header.chain_id != client.counterparty_chain_id {
            return Err(format!(
                "header from {} for a client of {}",
                header.chain_id, client.counterparty_chain_id
            ));
        }
        if header.validator_key != client.validator_key {
            return Err("header signed by an unknown validator".to_string());
        }
        if !verify_ed25519_signature(&header.validator_key, &header.sign_bytes(), &header.signature) {
            return Err("invalid header signature".to_string());
        }
        let age = Utc::now().signed_duration_since(header.time);
        if age.num_seconds() > client.trusting_period_secs as i64 {
            return Err("header outside trusting period".to_string());
        }
        Ok(())
    }

    fn apply(&mut self, own_chain_id: &str, msg: &Msg, events: &mut Vec<TxEvent>) -> Result<(), String> {
        match msg {
            Msg::CreateClient { client_id, header, trusting_period_secs } => {
                if self.clients.contains_key(client_id) {
                    return Err(format!("client {} already exists", client_id));
                }
                if header.chain_id == own_chain_id {
                    return Err("a chain cannot track itself".to_string());
                }
                let client = ClientState {
                    counterparty_chain_id: header.chain_id.clone(),
                    validator_key: header.validator_key.clone(),
                    latest_height: header.height,
                    trusting_period_secs: *trusting_period_secs,
                    consensus: BTreeMap::from([(header.height, header.app_hash.clone())]),
                };
                Self::verify_header(&client, header)?;
                self.clients.insert(client_id.clone(), client);

                let height = header.height.to_string();
                events.push(TxEvent::new(
                    "create_client",
                    &[("client_id", client_id.as_str()), ("consensus_height", height.as_str())],
                ));
            }

            Msg::UpdateClient { client_id, header } => {
                let client = self
                    .clients
                    .get_mut(client_id)
                    .ok_or_else(|| format!("client {} not found", client_id))?;
                Self::verify_header(client, header)?;

                match client.consensus.get(&header.height) {
                    Some(existing) if existing == &header.app_hash => {}
                    Some(_) => {
                        return Err(format!("conflicting header at height {}", header.height));
                    }
                    None => {
                        client.consensus.insert(header.height, header.app_hash.clone());
                        client.latest_height = client.latest_height.max(header.height);
                    }
                }

                let height = header.height.to_string();
                events.push(TxEvent::new(
                    "update_client",
                    &[("client_id", client_id.as_str()), ("consensus_height", height.as_str())],
                ));
            }

            Msg::ConnOpenInit { client_id, connection_id, counterparty_client_id, counterparty_connection_id } => {
                self.client(client_id)?;
                let id = self.allocate_connection(connection_id);
                if self.connections.contains_key(&id) {
                    return Err(format!("connection {} already exists", id));
                }
                self.connections.insert(
                    id.clone(),
                    ConnectionEnd {
                        state: State::Init,
                        client_id: client_id.clone(),
                        counterparty: ConnectionCounterparty {
                            client_id: counterparty_client_id.clone(),
                            connection_id: counterparty_connection_id.clone(),
                        },
                    },
                );
                events.push(TxEvent::new(
                    "connection_open_init",
                    &[("connection_id", id.as_str()), ("client_id", client_id.as_str()), ("counterparty_client_id", counterparty_client_id.as_str())],
                ));
            }

            Msg::ConnOpenTry { client_id, connection_id, counterparty_client_id, counterparty_connection_id, proof_init } => {
                self.client(client_id)?;

                let mut candidates = vec![encode(&ConnectionEnd {
                    state: State::Init,
                    client_id: counterparty_client_id.clone(),
                    counterparty: ConnectionCounterparty {
                        client_id: client_id.clone(),
                        connection_id: String::new(),
                    },
                })];
                if !connection_id.is_empty() {
                    candidates.push(encode(&ConnectionEnd {
                        state: State::Init,
                        client_id: counterparty_client_id.clone(),
                        counterparty: ConnectionCounterparty {
                            client_id: client_id.clone(),
                            connection_id: connection_id.clone(),
                        },
                    }));
                }
                self.verify_membership(client_id, proof_init, &connection_key(counterparty_connection_id), &candidates)?;

                let id = self.allocate_connection(connection_id);
                match self.connections.get(&id) {
                    None => {}
                    // crossing hellos: both sides initialized
                    Some(end) if end.state == State::Init && end.client_id == *client_id => {}
                    Some(end) => return Err(format!("connection {} is {}, cannot try", id, end.state)),
                }
                self.connections.insert(
                    id.clone(),
                    ConnectionEnd {
                        state: State::TryOpen,
                        client_id: client_id.clone(),
                        counterparty: ConnectionCounterparty {
                            client_id: counterparty_client_id.clone(),
                            connection_id: counterparty_connection_id.clone(),
                        },
                    },
                );
                events.push(TxEvent::new(
                    "connection_open_try",
                    &[("connection_id", id.as_str()), ("client_id", client_id.as_str()), ("counterparty_connection_id", counterparty_connection_id.as_str())],
                ));
            }

            Msg::ConnOpenAck { connection_id, counterparty_connection_id, proof_try } => {
                let end = self
                    .connections
                    .get(connection_id)
                    .cloned()
                    .ok_or_else(|| format!("connection {} not found", connection_id))?;
                if end.state != State::Init {
                    return Err(format!("connection {} is {}, cannot ack", connection_id, end.state));
                }

                let expected = ConnectionEnd {
                    state: State::TryOpen,
                    client_id: end.counterparty.client_id.clone(),
                    counterparty: ConnectionCounterparty {
                        client_id: end.client_id.clone(),
                        connection_id: connection_id.clone(),
                    },
                };
                self.verify_membership(&end.client_id, proof_try, &connection_key(counterparty_connection_id), &[encode(&expected)])?;

                if let Some(end) = self.connections.get_mut(connection_id) {
                    end.state = State::Open;
                    end.counterparty.connection_id = counterparty_connection_id.clone();
                }
                events.push(TxEvent::new("connection_open_ack", &[("connection_id", connection_id.as_str())]));
            }

            Msg::ConnOpenConfirm { connection_id, proof_ack } => {
                let end = self
                    .connections
                    .get(connection_id)
                    .cloned()
                    .ok_or_else(|| format!("connection {} not found", connection_id))?;
                if end.state != State::TryOpen {
                    return Err(format!("connection {} is {}, cannot confirm", connection_id, end.state));
                }

                let expected = ConnectionEnd {
                    state: State::Open,
                    client_id: end.counterparty.client_id.clone(),
                    counterparty: ConnectionCounterparty {
                        client_id: end.client_id.clone(),
                        connection_id: connection_id.clone(),
                    },
                };
                self.verify_membership(
                    &end.client_id,
                    proof_ack,
                    &connection_key(&end.counterparty.connection_id),
                    &[encode(&expected)],
                )?;

                if let Some(end) = self.connections.get_mut(connection_id) {
                    end.state = State::Open;
                }
                events.push(TxEvent::new("connection_open_confirm", &[("connection_id", connection_id.as_str())]));
            }

            Msg::ChanOpenInit { port_id, channel_id, connection_id, counterparty_port_id, counterparty_channel_id, ordering } => {
                if !self.connections.contains_key(connection_id) {
                    return Err(format!("connection {} not found", connection_id));
                }
                if *ordering == Order::None {
                    return Err("channel ordering must be ORDERED or UNORDERED".to_string());
                }
                let id = self.allocate_channel(channel_id);
                let key = (port_id.clone(), id.clone());
                if self.channels.contains_key(&key) {
                    return Err(format!("channel {}/{} already exists", port_id, id));
                }
                self.channels.insert(
                    key,
                    ChannelEnd {
                        state: State::Init,
                        ordering: *ordering,
                        counterparty: ChannelCounterparty {
                            port_id: counterparty_port_id.clone(),
                            channel_id: counterparty_channel_id.clone(),
                        },
                        connection_hops: vec![connection_id.clone()],
                    },
                );
                events.push(TxEvent::new(
                    "channel_open_init",
                    &[("port_id", port_id.as_str()), ("channel_id", id.as_str()), ("connection_id", connection_id.as_str())],
                ));
            }

            Msg::ChanOpenTry { port_id, channel_id, connection_id, counterparty_port_id, counterparty_channel_id, ordering, proof_init } => {
                let connection = self.open_connection(connection_id)?.clone();

                let expected = |own_channel: &str| {
                    encode(&ChannelEnd {
                        state: State::Init,
                        ordering: *ordering,
                        counterparty: ChannelCounterparty {
                            port_id: port_id.clone(),
                            channel_id: own_channel.to_string(),
                        },
                        connection_hops: vec![connection.counterparty.connection_id.clone()],
                    })
                };
                let mut candidates = vec![expected("")];
                if !channel_id.is_empty() {
                    candidates.push(expected(channel_id));
                }
                self.verify_membership(
                    &connection.client_id,
                    proof_init,
                    &channel_key(counterparty_port_id, counterparty_channel_id),
                    &candidates,
                )?;

                let id = self.allocate_channel(channel_id);
                let key = (port_id.clone(), id.clone());
                match self.channels.get(&key) {
                    None => {}
                    Some(end) if end.state == State::Init && end.ordering == *ordering => {}
                    Some(end) => return Err(format!("channel {}/{} is {}, cannot try", port_id, id, end.state)),
                }
                self.channels.insert(
                    key,
                    ChannelEnd {
                        state: State::TryOpen,
                        ordering: *ordering,
                        counterparty: ChannelCounterparty {
                            port_id: counterparty_port_id.clone(),
                            channel_id: counterparty_channel_id.clone(),
                        },
                        connection_hops: vec![connection_id.clone()],
                    },
                );
                events.push(TxEvent::new(
                    "channel_open_try",
                    &[("port_id", port_id.as_str()), ("channel_id", id.as_str()), ("connection_id", connection_id.as_str())],
                ));
            }

            Msg::ChanOpenAck { port_id, channel_id, counterparty_channel_id, proof_try } => {
                let key = (port_id.clone(), channel_id.clone());
                let end = self.channel(&key)?;
                if end.state != State::Init {
                    return Err(format!("channel {}/{} is {}, cannot ack", port_id, channel_id, end.state));
                }
                let connection = self.channel_connection(&end)?;

                let expected = ChannelEnd {
                    state: State::TryOpen,
                    ordering: end.ordering,
                    counterparty: ChannelCounterparty {
                        port_id: port_id.clone(),
                        channel_id: channel_id.clone(),
                    },
                    connection_hops: vec![connection.counterparty.connection_id.clone()],
                };
                self.verify_membership(
                    &connection.client_id,
                    proof_try,
                    &channel_key(&end.counterparty.port_id, counterparty_channel_id),
                    &[encode(&expected)],
                )?;

                if let Some(end) = self.channels.get_mut(&key) {
                    end.state = State::Open;
                    end.counterparty.channel_id = counterparty_channel_id.clone();
                }
                events.push(TxEvent::new("channel_open_ack", &[("port_id", port_id.as_str()), ("channel_id", channel_id.as_str())]));
            }

            Msg::ChanOpenConfirm { port_id, channel_id, proof_ack } => {
                self.confirm_counterparty_channel(port_id, channel_id, State::TryOpen, State::Open, proof_ack)?;
                events.push(TxEvent::new("channel_open_confirm", &[("port_id", port_id.as_str()), ("channel_id", channel_id.as_str())]));
            }

            Msg::ChanCloseInit { port_id, channel_id } => {
                let key = (port_id.clone(), channel_id.clone());
                let end = self.channel(&key)?;
                if end.state != State::Open {
                    return Err(format!("channel {}/{} is {}, cannot close", port_id, channel_id, end.state));
                }
                self.channel_connection(&end)?;
                if let Some(end) = self.channels.get_mut(&key) {
                    end.state = State::Closed;
                }
                events.push(TxEvent::new("channel_close_init", &[("port_id", port_id.as_str()), ("channel_id", channel_id.as_str())]));
            }

            Msg::ChanCloseConfirm { port_id, channel_id, proof_init } => {
                self.confirm_counterparty_channel(port_id, channel_id, State::Open, State::Closed, proof_init)?;
                events.push(TxEvent::new("channel_close_confirm", &[("port_id", port_id.as_str()), ("channel_id", channel_id.as_str())]));
            }
        }
        Ok(())
    }

    fn channel(&self, key: &(String, String)) -> Result<ChannelEnd, String> {
        self.channels
            .get(key)
            .cloned()
            .ok_or_else(|| format!("channel {}/{} not found", key.0, key.1))
    }

    fn channel_connection(&self, end: &ChannelEnd) -> Result<ConnectionEnd, String> {
        let connection_id = end
            .connection_hops
            .first()
            .ok_or_else(|| "channel has no connection hops".to_string())?;
        self.open_connection(connection_id).cloned()
    }

    /// Move a channel from `from` to `to` once the counterparty proves it is in `to`
    fn confirm_counterparty_channel(
        &mut self,
        port_id: &str,
        channel_id: &str,
        from: State,
        to: State,
        proof: &Proof,
    ) -> Result<(), String> {
        let key = (port_id.to_string(), channel_id.to_string());
        let end = self.channel(&key)?;
        if end.state != from {
            return Err(format!("channel {}/{} is {}, expected {}", port_id, channel_id, end.state, from));
        }
        let connection = self.channel_connection(&end)?;

        let expected = ChannelEnd {
            state: to,
            ordering: end.ordering,
            counterparty: ChannelCounterparty {
                port_id: port_id.to_string(),
                channel_id: channel_id.to_string(),
            },
            connection_hops: vec![connection.counterparty.connection_id.clone()],
        };
        self.verify_membership(
            &connection.client_id,
            proof,
            &channel_key(&end.counterparty.port_id, &end.counterparty.channel_id),
            &[encode(&expected)],
        )?;

        if let Some(end) = self.channels.get_mut(&key) {
            end.state = to;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Block {
    header: Header,
    store: Store,
}

#[derive(Debug, Default)]
struct Ledger {
    blocks: BTreeMap<Height, Block>,
    store: Store,
    height: Height,
    tx_count: usize,
    frozen: bool,
    forge_next: bool,
    query_failures: u32,
    broadcast_failures: u32,
    inclusion_timeouts: u32,
}

impl Ledger {
    /// Seal the current store into a new signed block
    fn commit(&mut self, chain_id: &str, key: &SigningKey) {
        self.height += 1;
        let mut header = Header {
            chain_id: chain_id.to_string(),
            height: self.height,
            time: Utc::now(),
            app_hash: self.store.root(self.height),
            validator_key: key.verifying_key().to_bytes().to_vec(),
            signature: Vec::new(),
        };
        header.signature = sign_ed25519(key, &header.sign_bytes());
        self.blocks.insert(
            self.height,
            Block {
                header,
                store: self.store.clone(),
            },
        );
        while self.blocks.len() > RETAINED_BLOCKS {
            self.blocks.pop_first();
        }
    }

    fn block(&self, height: Height) -> Result<&Block, ChainError> {
        self.blocks
            .get(&height)
            .ok_or_else(|| ChainError::Rpc(format!("no block at height {}", height)))
    }

    fn take_query_failure(&mut self) -> Result<(), ChainError> {
        if self.query_failures > 0 {
            self.query_failures -= 1;
            return Err(ChainError::Rpc("query timed out".to_string()));
        }
        Ok(())
    }
}

/// In-memory ledger speaking the Chain capability
pub struct MockChain {
    chain_id: String,
    key: SigningKey,
    ledger: Mutex<Ledger>,
}

impl MockChain {
    pub fn new(chain_id: &str) -> Self {
        Self::with_seed(chain_id, &format!("mock-validator:{}", chain_id))
    }

    /// Chain whose validator key derives from `seed`
    pub fn with_seed(chain_id: &str, seed: &str) -> Self {
        let key = signing_key_from_seed(seed);
        let mut ledger = Ledger::default();
        ledger.commit(chain_id, &key);
        Self {
            chain_id: chain_id.to_string(),
            key,
            ledger: Mutex::new(ledger),
        }
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current block height
    pub fn height(&self) -> Height {
        self.ledger().height
    }

    /// Number of successfully included transactions
    pub fn tx_count(&self) -> usize {
        self.ledger().tx_count
    }

    /// Latest consensus height of a hosted client
    pub fn client_height(&self, client_id: &str) -> Option<Height> {
        self.ledger().store.clients.get(client_id).map(|c| c.latest_height)
    }

    pub fn connection_end(&self, connection_id: &str) -> Option<ConnectionEnd> {
        self.ledger().store.connections.get(connection_id).cloned()
    }

    pub fn channel_end(&self, port_id: &str, channel_id: &str) -> Option<ChannelEnd> {
        self.ledger()
            .store
            .channels
            .get(&(port_id.to_string(), channel_id.to_string()))
            .cloned()
    }

    /// Write a connection end out of band and seal it into a block
    pub fn set_connection_end(&self, connection_id: &str, end: ConnectionEnd) {
        let mut ledger = self.ledger();
        ledger.store.connections.insert(connection_id.to_string(), end);
        ledger.commit(&self.chain_id, &self.key);
    }

    /// Write a channel end out of band and seal it into a block
    pub fn set_channel_end(&self, port_id: &str, channel_id: &str, end: ChannelEnd) {
        let mut ledger = self.ledger();
        ledger
            .store
            .channels
            .insert((port_id.to_string(), channel_id.to_string()), end);
        ledger.commit(&self.chain_id, &self.key);
    }

    /// Stop producing blocks; `latest_header` keeps returning the same header
    pub fn freeze_height(&self, frozen: bool) {
        self.ledger().frozen = frozen;
    }

    /// Tamper with the signature of the next header handed out
    pub fn forge_next_header(&self) {
        self.ledger().forge_next = true;
    }

    /// Fail the next `count` queries with an RPC error
    pub fn fail_queries(&self, count: u32) {
        self.ledger().query_failures = count;
    }

    /// Fail the next `count` submissions before they reach the chain
    pub fn fail_broadcasts(&self, count: u32) {
        self.ledger().broadcast_failures = count;
    }

    /// Apply the next `count` submissions but report an inclusion timeout
    pub fn timeout_inclusions(&self, count: u32) {
        self.ledger().inclusion_timeouts = count;
    }
}

#[async_trait]
impl Chain for MockChain {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }

    async fn latest_header(&self) -> Result<Header, ChainError> {
        let mut ledger = self.ledger();
        if !ledger.frozen {
            ledger.commit(&self.chain_id, &self.key);
        }
        let height = ledger.height;
        let mut header = ledger.block(height)?.header.clone();

        if ledger.forge_next {
            ledger.forge_next = false;
            if let Some(byte) = header.signature.first_mut() {
                *byte ^= 0xff;
            }
        }
        Ok(header)
    }

    async fn accepts_header(&self, header: &Header) -> Result<(), ChainError> {
        if header.chain_id != self.chain_id {
            return Err(ChainError::InvalidHeader(format!(
                "header of {} presented to {}",
                header.chain_id, self.chain_id
            )));
        }

        let ledger = self.ledger();
        let block = ledger.blocks.get(&header.height).ok_or_else(|| {
            ChainError::InvalidHeader(format!("no committed block at height {}", header.height))
        })?;

        if block.header.app_hash != header.app_hash || block.header.time != header.time {
            return Err(ChainError::InvalidHeader("header does not match committed block".to_string()));
        }
        if !verify_ed25519_signature(&block.header.validator_key, &header.sign_bytes(), &header.signature) {
            return Err(ChainError::InvalidHeader("invalid validator signature".to_string()));
        }
        Ok(())
    }

    async fn query_connection(
        &self,
        connection_id: &str,
        height: Height,
    ) -> Result<ConnectionResponse, ChainError> {
        let mut ledger = self.ledger();
        ledger.take_query_failure()?;
        let block = ledger.block(height)?;

        let connection = block
            .store
            .connections
            .get(connection_id)
            .cloned()
            .unwrap_or_else(ConnectionEnd::uninitialized);
        let value = if connection.state == State::Uninitialized {
            "null".to_string()
        } else {
            encode(&connection)
        };
        let proof = Proof {
            bytes: proof_bytes(&block.header.app_hash, &connection_key(connection_id), &value),
            height,
        };
        Ok(ConnectionResponse { connection, proof })
    }

    async fn query_channel(
        &self,
        port_id: &str,
        channel_id: &str,
        height: Height,
    ) -> Result<ChannelResponse, ChainError> {
        let mut ledger = self.ledger();
        ledger.take_query_failure()?;
        let block = ledger.block(height)?;

        let channel = block
            .store
            .channels
            .get(&(port_id.to_string(), channel_id.to_string()))
            .cloned()
            .unwrap_or_else(ChannelEnd::uninitialized);
        let value = if channel.state == State::Uninitialized {
            "null".to_string()
        } else {
            encode(&channel)
        };
        let proof = Proof {
            bytes: proof_bytes(&block.header.app_hash, &channel_key(port_id, channel_id), &value),
            height,
        };
        Ok(ChannelResponse { channel, proof })
    }

    async fn submit(&self, msgs: &[Msg]) -> Result<Receipt, ChainError> {
        let mut ledger = self.ledger();
        if ledger.broadcast_failures > 0 {
            ledger.broadcast_failures -= 1;
            return Err(ChainError::Rpc("connection refused".to_string()));
        }

        let mut tx_bytes = serde_json::to_vec(msgs).unwrap_or_default();
        tx_bytes.extend_from_slice(&ledger.height.to_be_bytes());
        let tx_hash = hex::encode(sha256(&tx_bytes)).to_uppercase();

        let mut store = ledger.store.clone();
        let mut events = Vec::new();
        for (index, msg) in msgs.iter().enumerate() {
            if let Err(log) = store.apply(&self.chain_id, msg, &mut events) {
                debug!("{} rejected message {} ({}): {}", self.chain_id, index, msg.type_url(), log);
                return Ok(Receipt {
                    tx_hash,
                    height: ledger.height,
                    success: false,
                    code: CODE_REJECTED,
                    log: format!("message {} ({}): {}", index, msg.type_url(), log),
                    events: Vec::new(),
                });
            }
        }

        ledger.store = store;
        ledger.tx_count += 1;
        ledger.commit(&self.chain_id, &self.key);
        let height = ledger.height;

        if ledger.inclusion_timeouts > 0 {
            ledger.inclusion_timeouts -= 1;
            return Err(ChainError::Timeout(format!("transaction {} not confirmed", tx_hash)));
        }

        Ok(Receipt {
            tx_hash,
            height,
            success: true,
            code: 0,
            log: String::new(),
            events,
        })
    }

    async fn health_check(&self) -> Result<(), ChainError> {
        Ok(())
    }
}
