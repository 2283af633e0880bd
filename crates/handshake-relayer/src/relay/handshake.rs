// IBC handshake automation for connection and channel establishment
// One generic driver advances connections, channels and channel closes one round at a time.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::chains::{ChainRef, Order, Receipt};
use crate::error::RelayerError;
use crate::metrics::RelayerMetrics;
use crate::relay::dispatch::dispatch_batch;
use crate::relay::msgs::{MessageBatch, Msg};
use crate::relay::path::{PathEnd, PathIdentifiers, PathKind};
use crate::relay::probe::{probe_channel, probe_connection, ProbedEnd};
use crate::relay::retry::{Backoff, RetryConfig};
use crate::relay::selector::{
    select_channel_close_step, select_channel_step, select_connection_step, Action, Side,
    StatePair, Step,
};
use crate::relay::sync::{header_for, sync_headers, HeaderMap};

const FINAL_OBSERVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Object a handshake establishes (or tears down)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HandshakeKind {
    Connection,
    /// Channel opening with the requested ordering
    Channel(Order),
    ChannelClose,
}

impl HandshakeKind {
    /// Identifier kind of the object this handshake creates
    pub fn object(&self) -> PathKind {
        match self {
            HandshakeKind::Connection => PathKind::Connection,
            HandshakeKind::Channel(_) | HandshakeKind::ChannelClose => PathKind::Channel,
        }
    }

    /// Run the decision table for this kind
    pub fn select(&self, src: &ProbedEnd, dst: &ProbedEnd) -> Result<Option<Step>, RelayerError> {
        match self {
            HandshakeKind::Connection => select_connection_step(src.state, dst.state),
            HandshakeKind::Channel(ordering) => select_channel_step(
                (src.state, src.ordering),
                (dst.state, dst.ordering),
                *ordering,
            ),
            HandshakeKind::ChannelClose => select_channel_close_step(src.state, dst.state),
        }
    }
}

impl fmt::Display for HandshakeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeKind::Connection => f.write_str("connection"),
            HandshakeKind::Channel(ordering) => write!(f, "channel ({})", ordering),
            HandshakeKind::ChannelClose => f.write_str("channel close"),
        }
    }
}

/// Lifecycle of one handshake attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriverState {
    Pending,
    Advancing,
    Complete,
    Failed,
    TimedOut,
}

/// One round's view of both chains: fresh headers plus both probed ends at those heights
#[derive(Debug, Clone)]
pub struct Observation {
    pub headers: HeaderMap,
    pub src: ProbedEnd,
    pub dst: ProbedEnd,
}

impl Observation {
    pub fn states(&self) -> StatePair {
        StatePair::new(self.src.state, self.dst.state)
    }
}

/// What a single round decided and did
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub kind: HandshakeKind,
    pub states: StatePair,
    /// `None` when the handshake is already in its terminal state
    pub step: Option<Step>,
    pub batch: MessageBatch,
    /// Present once the batch was included
    pub receipt: Option<Receipt>,
}

/// Terminal report of a completed handshake
#[derive(Debug, Clone, Serialize)]
pub struct HandshakeOutcome {
    pub kind: HandshakeKind,
    pub rounds: u32,
    pub final_states: StatePair,
    /// Receipt of the last dispatched batch, `None` if nothing had to be sent
    pub receipt: Option<Receipt>,
}

/// Synchronize headers and probe both ends at the synchronized heights
///
/// A missing identifier on one side is filled in from what the other side
/// records for its counterparty, written only to the side it belongs to.
pub async fn observe(
    kind: HandshakeKind,
    src: &mut PathEnd,
    dst: &mut PathEnd,
) -> Result<Observation, RelayerError> {
    let headers = sync_headers(src.chain(), dst.chain()).await?;
    let src_height = header_for(&headers, src.chain_id())?.height;
    let dst_height = header_for(&headers, dst.chain_id())?.height;

    let mut src_probe = probe(kind, src, src_height).await?;
    if learn_counterparty(kind, dst, &src_probe)? {
        debug!("Learned {} id {} for {}", kind.object(), src_probe.counterparty_id, dst.chain_id());
    }
    let dst_probe = probe(kind, dst, dst_height).await?;
    if learn_counterparty(kind, src, &dst_probe)? {
        src_probe = probe(kind, src, src_height).await?;
    }

    debug!(
        "Observed {} state ({}, {}) at heights {}/{}",
        kind, src_probe.state, dst_probe.state, src_height, dst_height
    );

    Ok(Observation {
        headers,
        src: src_probe,
        dst: dst_probe,
    })
}

async fn probe(kind: HandshakeKind, end: &PathEnd, height: u64) -> Result<ProbedEnd, RelayerError> {
    match kind {
        HandshakeKind::Connection => probe_connection(end, height).await,
        HandshakeKind::Channel(_) | HandshakeKind::ChannelClose => probe_channel(end, height).await,
    }
}

fn learn_counterparty(
    kind: HandshakeKind,
    end: &mut PathEnd,
    counterparty: &ProbedEnd,
) -> Result<bool, RelayerError> {
    if end.ids().is_set(kind.object()) || counterparty.counterparty_id.is_empty() {
        return Ok(false);
    }
    end.set_path_identifier(kind.object(), &counterparty.counterparty_id)?;
    Ok(true)
}

/// Build the batch for `step`: a client update for the sender's view of the
/// counterparty, followed by the action message carrying the counterparty proof
pub fn build_step_batch(
    kind: HandshakeKind,
    step: Step,
    src: &PathEnd,
    dst: &PathEnd,
    observation: &Observation,
) -> Result<MessageBatch, RelayerError> {
    let (sender, counterparty, remote) = match step.target {
        Side::Src => (src, dst, &observation.dst),
        Side::Dst => (dst, src, &observation.src),
    };

    let header = header_for(&observation.headers, counterparty.chain_id())?.clone();
    let update = Msg::UpdateClient {
        client_id: sender.client_id()?.to_string(),
        header,
    };
    let proof = remote.proof.clone();
    let optional = |end: &PathEnd, slot: PathKind| end.ids().get(slot).unwrap_or_default().to_string();

    let msg = match (kind, step.action) {
        (HandshakeKind::Connection, Action::Init) => Msg::ConnOpenInit {
            client_id: sender.client_id()?.to_string(),
            connection_id: optional(sender, PathKind::Connection),
            counterparty_client_id: counterparty.client_id()?.to_string(),
            counterparty_connection_id: optional(counterparty, PathKind::Connection),
        },
        (HandshakeKind::Connection, Action::Try) => Msg::ConnOpenTry {
            client_id: sender.client_id()?.to_string(),
            connection_id: optional(sender, PathKind::Connection),
            counterparty_client_id: counterparty.client_id()?.to_string(),
            counterparty_connection_id: counterparty.connection_id()?.to_string(),
            proof_init: proof,
        },
        (HandshakeKind::Connection, Action::Ack) => Msg::ConnOpenAck {
            connection_id: sender.connection_id()?.to_string(),
            counterparty_connection_id: counterparty.connection_id()?.to_string(),
            proof_try: proof,
        },
        (HandshakeKind::Connection, Action::Confirm) => Msg::ConnOpenConfirm {
            connection_id: sender.connection_id()?.to_string(),
            proof_ack: proof,
        },
        (HandshakeKind::Channel(ordering), Action::Init) => Msg::ChanOpenInit {
            port_id: sender.port_id()?.to_string(),
            channel_id: optional(sender, PathKind::Channel),
            connection_id: sender.connection_id()?.to_string(),
            counterparty_port_id: counterparty.port_id()?.to_string(),
            counterparty_channel_id: optional(counterparty, PathKind::Channel),
            ordering,
        },
        (HandshakeKind::Channel(ordering), Action::Try) => Msg::ChanOpenTry {
            port_id: sender.port_id()?.to_string(),
            channel_id: optional(sender, PathKind::Channel),
            connection_id: sender.connection_id()?.to_string(),
            counterparty_port_id: counterparty.port_id()?.to_string(),
            counterparty_channel_id: counterparty.channel_id()?.to_string(),
            ordering,
            proof_init: proof,
        },
        (HandshakeKind::Channel(_), Action::Ack) => Msg::ChanOpenAck {
            port_id: sender.port_id()?.to_string(),
            channel_id: sender.channel_id()?.to_string(),
            counterparty_channel_id: counterparty.channel_id()?.to_string(),
            proof_try: proof,
        },
        (HandshakeKind::Channel(_), Action::Confirm) => Msg::ChanOpenConfirm {
            port_id: sender.port_id()?.to_string(),
            channel_id: sender.channel_id()?.to_string(),
            proof_ack: proof,
        },
        (HandshakeKind::ChannelClose, Action::CloseInit) => Msg::ChanCloseInit {
            port_id: sender.port_id()?.to_string(),
            channel_id: sender.channel_id()?.to_string(),
        },
        (HandshakeKind::ChannelClose, Action::CloseConfirm) => Msg::ChanCloseConfirm {
            port_id: sender.port_id()?.to_string(),
            channel_id: sender.channel_id()?.to_string(),
            proof_init: proof,
        },
        (kind, action) => {
            let states = observation.states();
            return Err(RelayerError::illegal(
                states.src,
                states.dst,
                format!("{} is not a step of a {} handshake", action, kind),
            ));
        }
    };

    if msg.carries_proof() && remote.proof.bytes.is_empty() {
        return Err(RelayerError::Query {
            chain_id: remote.chain_id.clone(),
            reason: format!("no proof of {} at height {}", kind.object(), remote.height),
        });
    }

    Ok(MessageBatch::for_side(step.target, vec![update, msg]))
}

/// Whether `step` asks the target chain to allocate an identifier the path does not know yet
fn creates_unnamed_object(kind: HandshakeKind, step: Step, src: &PathEnd, dst: &PathEnd) -> bool {
    let target = match step.target {
        Side::Src => src,
        Side::Dst => dst,
    };
    matches!(step.action, Action::Init | Action::Try) && !target.ids().is_set(kind.object())
}

/// Record the identifier a successful Init/Try created on the target chain
fn record_created_identifier(
    kind: HandshakeKind,
    step: Step,
    receipt: &Receipt,
    target: &mut PathEnd,
) -> Result<(), RelayerError> {
    if !matches!(step.action, Action::Init | Action::Try) {
        return Ok(());
    }

    let attribute = match kind.object() {
        PathKind::Connection => "connection_id",
        _ => "channel_id",
    };
    let created = receipt
        .events
        .iter()
        .filter(|event| event.event_type.ends_with("_open_init") || event.event_type.ends_with("_open_try"))
        .find_map(|event| event.attribute(attribute));

    if let Some(id) = created {
        info!("🆕 {} created {} {}", target.chain_id(), kind.object(), id);
        target.set_path_identifier(kind.object(), id)?;
    }
    Ok(())
}

fn target_end<'a>(side: Side, src: &'a mut PathEnd, dst: &'a mut PathEnd) -> &'a mut PathEnd {
    match side {
        Side::Src => src,
        Side::Dst => dst,
    }
}

/// Observe, select and build the next batch without dispatching it
pub async fn plan_step(
    kind: HandshakeKind,
    src: &mut PathEnd,
    dst: &mut PathEnd,
) -> Result<StepReport, RelayerError> {
    let observation = observe(kind, src, dst).await?;
    let step = kind.select(&observation.src, &observation.dst)?;
    let batch = match step {
        Some(step) => build_step_batch(kind, step, src, dst, &observation)?,
        None => MessageBatch::empty(),
    };

    Ok(StepReport {
        kind,
        states: observation.states(),
        step,
        batch,
        receipt: None,
    })
}

async fn execute_step(
    kind: HandshakeKind,
    step: Step,
    src: &mut PathEnd,
    dst: &mut PathEnd,
    observation: &Observation,
) -> Result<StepReport, RelayerError> {
    let batch = build_step_batch(kind, step, src, dst, observation)?;
    info!(
        "➡️  {} step {} from {} (batch of {})",
        kind,
        step,
        observation.states(),
        batch.len()
    );

    let receipt = dispatch_batch(src.chain(), dst.chain(), &batch).await?;
    record_created_identifier(kind, step, &receipt, target_end(step.target, src, dst))?;

    Ok(StepReport {
        kind,
        states: observation.states(),
        step: Some(step),
        batch,
        receipt: Some(receipt),
    })
}

/// Advance the handshake by exactly one round
pub async fn step_once(
    kind: HandshakeKind,
    src: &mut PathEnd,
    dst: &mut PathEnd,
) -> Result<StepReport, RelayerError> {
    let observation = observe(kind, src, dst).await?;
    match kind.select(&observation.src, &observation.dst)? {
        Some(step) => execute_step(kind, step, src, dst, &observation).await,
        None => Ok(StepReport {
            kind,
            states: observation.states(),
            step: None,
            batch: MessageBatch::empty(),
            receipt: None,
        }),
    }
}

/// Force one action on `target`, bypassing the decision table
///
/// The chain is the only judge of whether the action is valid.
pub async fn raw_step(
    kind: HandshakeKind,
    action: Action,
    target: Side,
    src: &mut PathEnd,
    dst: &mut PathEnd,
) -> Result<StepReport, RelayerError> {
    let observation = observe(kind, src, dst).await?;
    execute_step(kind, Step::new(action, target), src, dst, &observation).await
}

/// Configuration of one handshake attempt
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Wall-clock bound of the attempt
    pub timeout: Duration,
    /// Optional bound on the number of rounds
    pub max_rounds: Option<u32>,
    /// Pause between successful rounds
    pub poll_interval: Duration,
    pub retry: RetryConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_rounds: None,
            poll_interval: Duration::ZERO,
            retry: RetryConfig::default(),
        }
    }
}

enum Round {
    Complete(StatePair),
    Advanced(Receipt),
    /// Outcome on chain unknown and not observable; resending could create a second object
    Halted(RelayerError),
}

/// Drives a handshake until it is complete, fails or exhausts its budget
pub struct HandshakeDriver {
    kind: HandshakeKind,
    src: PathEnd,
    dst: PathEnd,
    config: DriverConfig,
    state: DriverState,
    rounds: u32,
    last: Option<StatePair>,
    metrics: Option<Arc<RelayerMetrics>>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl HandshakeDriver {
    pub fn new(kind: HandshakeKind, src: PathEnd, dst: PathEnd, config: DriverConfig) -> Self {
        Self {
            kind,
            src,
            dst,
            config,
            state: DriverState::Pending,
            rounds: 0,
            last: None,
            metrics: None,
            shutdown: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<RelayerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Stop starting new rounds once `true` is sent on this channel
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn last_observed(&self) -> Option<StatePair> {
        self.last
    }

    pub fn src(&self) -> &PathEnd {
        &self.src
    }

    pub fn dst(&self) -> &PathEnd {
        &self.dst
    }

    fn cancelled(&self) -> bool {
        self.shutdown.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    fn budget_exhausted(&self, deadline: Instant) -> bool {
        if Instant::now() >= deadline {
            return true;
        }
        matches!(self.config.max_rounds, Some(max) if self.rounds >= max)
    }

    /// Sleep for `delay`, cut short by the deadline or a shutdown signal
    async fn pause(&mut self, delay: Duration, deadline: Instant) {
        let delay = delay.min(deadline.saturating_duration_since(Instant::now()));
        if delay.is_zero() {
            return;
        }

        match self.shutdown.as_mut() {
            Some(rx) => {
                let timer = sleep(delay);
                tokio::pin!(timer);
                let mut sender_gone = false;
                tokio::select! {
                    _ = &mut timer => {}
                    changed = rx.changed() => sender_gone = changed.is_err(),
                }
                if sender_gone {
                    timer.await;
                }
            }
            None => sleep(delay).await,
        }
    }

    async fn round(&mut self) -> Result<Round, RelayerError> {
        let observation = observe(self.kind, &mut self.src, &mut self.dst)
            .await
            .map_err(|e| {
                if let (Some(metrics), RelayerError::LightClientSync { .. }) = (&self.metrics, &e) {
                    metrics.header_sync_failures.inc();
                }
                e
            })?;
        let states = observation.states();
        self.last = Some(states);

        let step = match self.kind.select(&observation.src, &observation.dst)? {
            Some(step) => step,
            None => return Ok(Round::Complete(states)),
        };

        let unnamed = creates_unnamed_object(self.kind, step, &self.src, &self.dst);
        match execute_step(self.kind, step, &mut self.src, &mut self.dst, &observation).await {
            Ok(report) => {
                if let Some(metrics) = &self.metrics {
                    metrics.messages_dispatched.inc_by(report.batch.len() as f64);
                }
                match report.receipt {
                    Some(receipt) => Ok(Round::Advanced(receipt)),
                    None => Err(RelayerError::EmptyBatch),
                }
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.dispatch_failures.inc();
                }
                match e {
                    RelayerError::DispatchTimeout { .. } if unnamed => {
                        warn!(
                            "{} {} may have been applied under an unknown {} id, not resending",
                            self.kind,
                            step,
                            self.kind.object()
                        );
                        Ok(Round::Halted(e))
                    }
                    e => Err(e),
                }
            }
        }
    }

    /// Drive the handshake to completion
    ///
    /// Partial on-chain progress is never rolled back; a failed or timed-out
    /// attempt can be resumed from the last observed state.
    pub async fn run(&mut self) -> Result<HandshakeOutcome, RelayerError> {
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let mut backoff = Backoff::new(self.config.retry.clone());
        let mut receipt: Option<Receipt> = None;

        self.state = DriverState::Advancing;
        info!(
            "🤝 Starting {} handshake {} -> {}",
            self.kind,
            self.src.chain_id(),
            self.dst.chain_id()
        );

        let result = loop {
            if self.cancelled() {
                warn!("Handshake cancelled after {} rounds", self.rounds);
                self.state = DriverState::TimedOut;
                break Err(RelayerError::Cancelled {
                    last: self.last,
                    rounds: self.rounds,
                });
            }

            if self.budget_exhausted(deadline) || backoff.exhausted() {
                break self.finish_exhausted(receipt.take()).await;
            }

            self.rounds += 1;
            if let Some(metrics) = &self.metrics {
                metrics.handshake_rounds.inc();
            }

            match self.round().await {
                Ok(Round::Complete(states)) => {
                    break Ok(self.complete(states, receipt.take()));
                }
                Ok(Round::Advanced(included)) => {
                    receipt = Some(included);
                    backoff.reset();
                    let interval = self.config.poll_interval;
                    self.pause(interval, deadline).await;
                }
                Ok(Round::Halted(e)) => {
                    error!("❌ {} handshake halted at {:?}: {}", self.kind, self.last, e);
                    self.state = DriverState::Failed;
                    break Err(RelayerError::HandshakeFailed {
                        last: self.last,
                        source: Box::new(e),
                    });
                }
                Err(e) if e.is_retryable() => {
                    let delay = backoff.next_delay();
                    warn!(
                        "Round {} of {} handshake failed, retrying in {:?}: {}",
                        self.rounds, self.kind, delay, e
                    );
                    self.pause(delay, deadline).await;
                }
                Err(e) => {
                    error!("❌ {} handshake failed at {:?}: {}", self.kind, self.last, e);
                    self.state = DriverState::Failed;
                    break Err(RelayerError::HandshakeFailed {
                        last: e.last_observed().or(self.last),
                        source: Box::new(e),
                    });
                }
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.handshake_duration.observe(started.elapsed().as_secs_f64());
            match &result {
                Ok(_) => metrics.handshakes_completed.inc(),
                Err(_) => metrics.handshakes_failed.inc(),
            }
        }
        result
    }

    fn complete(&mut self, final_states: StatePair, receipt: Option<Receipt>) -> HandshakeOutcome {
        self.state = DriverState::Complete;
        info!(
            "🎉 {} handshake complete after {} rounds, state {}",
            self.kind, self.rounds, final_states
        );
        HandshakeOutcome {
            kind: self.kind,
            rounds: self.rounds,
            final_states,
            receipt,
        }
    }

    /// Report the state the last round produced; a terminal state still counts as complete
    async fn finish_exhausted(
        &mut self,
        receipt: Option<Receipt>,
    ) -> Result<HandshakeOutcome, RelayerError> {
        let observed = tokio::time::timeout(
            FINAL_OBSERVE_TIMEOUT,
            observe(self.kind, &mut self.src, &mut self.dst),
        )
        .await;

        if let Ok(Ok(observation)) = observed {
            let states = observation.states();
            self.last = Some(states);
            if let Ok(None) = self.kind.select(&observation.src, &observation.dst) {
                return Ok(self.complete(states, receipt));
            }
        }

        warn!(
            "⏰ {} handshake timed out after {} rounds, last observed state {:?}",
            self.kind, self.rounds, self.last
        );
        self.state = DriverState::TimedOut;
        Err(RelayerError::HandshakeTimedOut {
            last: self.last,
            rounds: self.rounds,
        })
    }
}

async fn run_with_timeout(
    kind: HandshakeKind,
    src_chain: Arc<ChainRef>,
    dst_chain: Arc<ChainRef>,
    src_ids: PathIdentifiers,
    dst_ids: PathIdentifiers,
    timeout: Duration,
) -> Result<HandshakeOutcome, RelayerError> {
    let config = DriverConfig {
        timeout,
        ..DriverConfig::default()
    };
    HandshakeDriver::new(
        kind,
        PathEnd::new(src_chain, src_ids),
        PathEnd::new(dst_chain, dst_ids),
        config,
    )
    .run()
    .await
}

/// Open a connection between two chains
pub async fn run_connection_handshake(
    src_chain: Arc<ChainRef>,
    dst_chain: Arc<ChainRef>,
    src_ids: PathIdentifiers,
    dst_ids: PathIdentifiers,
    timeout: Duration,
) -> Result<HandshakeOutcome, RelayerError> {
    run_with_timeout(HandshakeKind::Connection, src_chain, dst_chain, src_ids, dst_ids, timeout).await
}

/// Open a channel with the given ordering over an open connection
pub async fn run_channel_handshake(
    src_chain: Arc<ChainRef>,
    dst_chain: Arc<ChainRef>,
    src_ids: PathIdentifiers,
    dst_ids: PathIdentifiers,
    ordering: Order,
    timeout: Duration,
) -> Result<HandshakeOutcome, RelayerError> {
    run_with_timeout(
        HandshakeKind::Channel(ordering),
        src_chain,
        dst_chain,
        src_ids,
        dst_ids,
        timeout,
    )
    .await
}

/// Close an open channel on both ends
pub async fn run_channel_close(
    src_chain: Arc<ChainRef>,
    dst_chain: Arc<ChainRef>,
    src_ids: PathIdentifiers,
    dst_ids: PathIdentifiers,
    timeout: Duration,
) -> Result<HandshakeOutcome, RelayerError> {
    run_with_timeout(HandshakeKind::ChannelClose, src_chain, dst_chain, src_ids, dst_ids, timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{MockChain, State};
    use crate::relay::client_update::create_clients;

    async fn connected_clients() -> (Arc<MockChain>, Arc<MockChain>, PathEnd, PathEnd) {
        let mock_a = Arc::new(MockChain::new("ibc-0"));
        let mock_b = Arc::new(MockChain::new("ibc-1"));
        let mut src = PathEnd::new(Arc::new(ChainRef::new(mock_a.clone())), PathIdentifiers::new());
        let mut dst = PathEnd::new(Arc::new(ChainRef::new(mock_b.clone())), PathIdentifiers::new());
        create_clients(&mut src, &mut dst, "07-tendermint-0", "07-tendermint-0")
            .await
            .unwrap();
        (mock_a, mock_b, src, dst)
    }

    #[tokio::test]
    async fn test_step_once_walks_the_connection_scenarios() {
        let (_, _, mut src, mut dst) = connected_clients().await;
        let kind = HandshakeKind::Connection;

        let expected = [
            (StatePair::new(State::Uninitialized, State::Uninitialized), Step::new(Action::Init, Side::Src)),
            (StatePair::new(State::Init, State::Uninitialized), Step::new(Action::Try, Side::Dst)),
            (StatePair::new(State::Init, State::TryOpen), Step::new(Action::Ack, Side::Src)),
            (StatePair::new(State::Open, State::TryOpen), Step::new(Action::Confirm, Side::Dst)),
        ];

        for (states, step) in expected {
            let report = step_once(kind, &mut src, &mut dst).await.unwrap();
            assert_eq!(report.states, states);
            assert_eq!(report.step, Some(step));
            assert_eq!(report.batch.target(), Some(step.target));
            // client update always leads the batch
            assert!(matches!(report.batch.msgs()[0], Msg::UpdateClient { .. }));
            assert!(report.receipt.unwrap().success);
        }

        let last = step_once(kind, &mut src, &mut dst).await.unwrap();
        assert_eq!(last.states, StatePair::new(State::Open, State::Open));
        assert_eq!(last.step, None);
        assert!(last.batch.is_empty());
        assert!(src.ids().is_set(PathKind::Connection));
        assert!(dst.ids().is_set(PathKind::Connection));
    }

    #[tokio::test]
    async fn test_plan_step_does_not_dispatch() {
        let (mock_a, mock_b, mut src, mut dst) = connected_clients().await;
        let before = (mock_a.tx_count(), mock_b.tx_count());

        let report = plan_step(HandshakeKind::Connection, &mut src, &mut dst).await.unwrap();
        assert_eq!(report.step, Some(Step::new(Action::Init, Side::Src)));
        assert_eq!(report.batch.src().len(), 2);
        assert!(report.receipt.is_none());
        assert_eq!((mock_a.tx_count(), mock_b.tx_count()), before);
    }

    #[tokio::test]
    async fn test_proof_carrying_step_needs_a_proof() {
        let (_, _, mut src, mut dst) = connected_clients().await;
        let kind = HandshakeKind::Connection;
        step_once(kind, &mut src, &mut dst).await.unwrap();

        let mut observation = observe(kind, &mut src, &mut dst).await.unwrap();
        let try_step = Step::new(Action::Try, Side::Dst);
        assert!(build_step_batch(kind, try_step, &src, &dst, &observation).is_ok());

        observation.src.proof.bytes.clear();
        let err = build_step_batch(kind, try_step, &src, &dst, &observation).unwrap_err();
        assert!(matches!(err, RelayerError::Query { ref chain_id, .. } if chain_id == "ibc-0"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_driver_completes_connection() {
        let (_, _, src, dst) = connected_clients().await;
        let mut driver = HandshakeDriver::new(HandshakeKind::Connection, src, dst, DriverConfig::default());
        assert_eq!(driver.state(), DriverState::Pending);

        let outcome = driver.run().await.unwrap();
        assert_eq!(driver.state(), DriverState::Complete);
        assert_eq!(outcome.rounds, 5);
        assert_eq!(outcome.final_states, StatePair::new(State::Open, State::Open));
        assert!(outcome.receipt.is_some());
    }

    #[tokio::test]
    async fn test_driver_reports_partial_progress_on_round_budget() {
        let (_, _, src, dst) = connected_clients().await;
        let config = DriverConfig {
            max_rounds: Some(1),
            ..DriverConfig::default()
        };
        let mut driver = HandshakeDriver::new(HandshakeKind::Connection, src, dst, config);

        let err = driver.run().await.unwrap_err();
        assert_eq!(driver.state(), DriverState::TimedOut);
        assert_eq!(err.last_observed(), Some(StatePair::new(State::Init, State::Uninitialized)));
    }

    #[tokio::test]
    async fn test_driver_honours_shutdown_between_rounds() {
        let (_, _, src, dst) = connected_clients().await;
        let (tx, rx) = watch::channel(true);
        let mut driver = HandshakeDriver::new(HandshakeKind::Connection, src, dst, DriverConfig::default())
            .with_shutdown(rx);

        let err = driver.run().await.unwrap_err();
        assert!(matches!(err, RelayerError::Cancelled { rounds: 0, .. }));
        drop(tx);
    }

    #[test]
    fn test_kind_maps_to_object() {
        assert_eq!(HandshakeKind::Connection.object(), PathKind::Connection);
        assert_eq!(HandshakeKind::Channel(Order::Ordered).object(), PathKind::Channel);
        assert_eq!(HandshakeKind::Channel(Order::Unordered).to_string(), "channel (UNORDERED)");
    }
}
