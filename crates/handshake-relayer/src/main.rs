use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use handshake_relayer::chains::{ChainRef, ChainRegistry, Order};
use handshake_relayer::relay::{
    self, client_update, sync_header, Action, HandshakeDriver, HandshakeKind, PathEnd, Side,
};
use handshake_relayer::{ChainFactory, ChainSpecificConfig, PathConfig, RelayerConfig, RelayerMetrics};

#[derive(Parser)]
#[command(name = "relayer")]
#[command(about = "IBC handshake relayer: clients, connections and channels between two chains")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/relayer.toml")]
    pub config: String,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Print Prometheus metrics after the command finishes
    #[arg(long)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit handshake transactions
    #[command(subcommand)]
    Tx(TxCommand),
    /// Query handshake objects on one chain
    #[command(subcommand)]
    Query(QueryCommand),
    /// List configured paths
    Paths,
}

#[derive(Subcommand)]
pub enum TxCommand {
    /// Create a client on the source chain tracking the destination
    Client {
        path: String,
        /// Act on the destination chain instead
        #[arg(long)]
        reverse: bool,
    },
    /// Create clients on both chains of a path
    Clients { path: String },
    /// Update the source chain's client of the destination
    UpdateClient {
        path: String,
        #[arg(long)]
        reverse: bool,
    },
    /// Drive a connection handshake to OPEN
    Connection {
        path: String,
        /// Override the configured timeout, e.g. "30s"
        #[arg(long)]
        timeout: Option<String>,
    },
    /// Advance a connection handshake by one round
    ConnectionStep { path: String },
    /// Drive a channel handshake to OPEN
    Channel {
        path: String,
        #[arg(long)]
        ordering: Option<Order>,
        #[arg(long)]
        timeout: Option<String>,
    },
    /// Advance a channel handshake by one round
    ChannelStep {
        path: String,
        #[arg(long)]
        ordering: Option<Order>,
    },
    /// Close a channel on both chains
    ChannelClose {
        path: String,
        #[arg(long)]
        timeout: Option<String>,
    },
    /// Send a single handshake message to one chain of a path
    Raw {
        #[arg(value_enum)]
        action: RawAction,
        path: String,
        #[arg(long)]
        ordering: Option<Order>,
        /// Send to the destination chain instead of the source
        #[arg(long)]
        to_dst: bool,
    },
}

#[derive(Subcommand)]
pub enum QueryCommand {
    /// Connection end at the chain's latest header
    Connection { chain_id: String, connection_id: String },
    /// Channel end at the chain's latest header
    Channel {
        chain_id: String,
        port_id: String,
        channel_id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum RawAction {
    ConnInit,
    ConnTry,
    ConnAck,
    ConnConfirm,
    ChanInit,
    ChanTry,
    ChanAck,
    ChanConfirm,
    ChanCloseInit,
    ChanCloseConfirm,
}

impl RawAction {
    fn resolve(self, ordering: Order) -> (HandshakeKind, Action) {
        match self {
            RawAction::ConnInit => (HandshakeKind::Connection, Action::Init),
            RawAction::ConnTry => (HandshakeKind::Connection, Action::Try),
            RawAction::ConnAck => (HandshakeKind::Connection, Action::Ack),
            RawAction::ConnConfirm => (HandshakeKind::Connection, Action::Confirm),
            RawAction::ChanInit => (HandshakeKind::Channel(ordering), Action::Init),
            RawAction::ChanTry => (HandshakeKind::Channel(ordering), Action::Try),
            RawAction::ChanAck => (HandshakeKind::Channel(ordering), Action::Ack),
            RawAction::ChanConfirm => (HandshakeKind::Channel(ordering), Action::Confirm),
            RawAction::ChanCloseInit => (HandshakeKind::ChannelClose, Action::CloseInit),
            RawAction::ChanCloseConfirm => (HandshakeKind::ChannelClose, Action::CloseConfirm),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("handshake_relayer={0},relayer={0}", cli.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = RelayerConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;
    config.validate()?;
    info!("Loaded configuration from: {}", cli.config);

    let registry = ChainFactory::build_registry(&config)?;
    let metrics = Arc::new(RelayerMetrics::new()?);

    let mut ctx = App {
        config,
        config_path: cli.config.clone(),
        registry,
        metrics: metrics.clone(),
    };
    match cli.command {
        Commands::Tx(tx) => run_tx(&mut ctx, tx).await?,
        Commands::Query(query) => run_query(&ctx, query).await?,
        Commands::Paths => print_json(&ctx.config.paths)?,
    }

    if cli.metrics {
        let encoder = prometheus::TextEncoder::new();
        eprintln!("{}", encoder.encode_to_string(&metrics.registry().gather())?);
    }
    Ok(())
}

struct App {
    config: RelayerConfig,
    config_path: String,
    registry: ChainRegistry,
    metrics: Arc<RelayerMetrics>,
}

impl App {
    fn path(&self, name: &str) -> anyhow::Result<&PathConfig> {
        self.config
            .get_path(name)
            .ok_or_else(|| anyhow!("path {} is not configured", name))
    }

    /// Both ends of a configured path, optionally swapped
    fn path_ends(&self, name: &str, reverse: bool) -> anyhow::Result<(PathEnd, PathEnd)> {
        let path = self.path(name)?;
        let (src, dst) = if reverse { (&path.dst, &path.src) } else { (&path.src, &path.dst) };
        let (src_chain, dst_chain) = self.registry.get_pair(&src.chain_id, &dst.chain_id)?;
        Ok((
            PathEnd::new(src_chain, src.identifiers()?),
            PathEnd::new(dst_chain, dst.identifiers()?),
        ))
    }

    fn timeout(&self, requested: Option<String>) -> anyhow::Result<Duration> {
        match requested {
            Some(timeout) => humantime::parse_duration(&timeout)
                .with_context(|| format!("invalid timeout {:?}", timeout)),
            None => self.config.global.timeout(),
        }
    }

    fn trusting_period(&self, chain_id: &str) -> anyhow::Result<Duration> {
        match self.config.get_chain(chain_id) {
            Some(chain) => chain.trusting_period(),
            None => Ok(client_update::DEFAULT_TRUSTING_PERIOD),
        }
    }

    /// Write identifiers learned on chain back to the path and save the configuration
    ///
    /// Paths over mock chains are left alone; their state ends with the process.
    fn record_identifiers(&mut self, path: &str, src: &PathEnd, dst: &PathEnd) -> anyhow::Result<()> {
        let is_mock = |chain_id: &str| {
            matches!(
                self.config.get_chain(chain_id).map(|c| &c.config),
                Some(ChainSpecificConfig::Mock { .. })
            )
        };
        if is_mock(src.chain_id()) || is_mock(dst.chain_id()) {
            debug!("Path {} runs over mock chains, not saving identifiers", path);
            return Ok(());
        }

        if self.config.record_path_identifiers(path, src.ids(), dst.ids())? {
            self.config
                .save(&self.config_path)
                .with_context(|| format!("failed to save configuration to {}", self.config_path))?;
            info!("💾 Saved identifiers of path {} to {}", path, self.config_path);
        }
        Ok(())
    }

    /// Run the driver until the handshake completes; Ctrl-C stops it between rounds
    async fn drive(
        &mut self,
        kind: HandshakeKind,
        path: &str,
        timeout: Option<String>,
    ) -> anyhow::Result<()> {
        let (src, dst) = self.path_ends(path, false)?;
        let mut driver_config = self.config.global.driver_config()?;
        driver_config.timeout = self.timeout(timeout)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current round");
                let _ = shutdown_tx.send(true);
            }
        });

        let mut driver = HandshakeDriver::new(kind, src, dst, driver_config)
            .with_metrics(self.metrics.clone())
            .with_shutdown(shutdown_rx);
        let result = driver.run().await;
        self.record_identifiers(path, driver.src(), driver.dst())?;
        let outcome = result?;

        print_json(&json!({
            "outcome": outcome,
            "src": { "chain_id": driver.src().chain_id(), "ids": driver.src().ids() },
            "dst": { "chain_id": driver.dst().chain_id(), "ids": driver.dst().ids() },
        }))
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn ordering_for(path: &PathConfig, requested: Option<Order>) -> Order {
    requested.unwrap_or(path.ordering)
}

async fn run_tx(ctx: &mut App, command: TxCommand) -> anyhow::Result<()> {
    match command {
        TxCommand::Client { path, reverse } => {
            let (mut src, dst) = ctx.path_ends(&path, reverse)?;
            let client_id = src.client_id()?.to_string();
            let trusting_period = ctx.trusting_period(dst.chain_id())?;
            let receipt = relay::create_client(&mut src, &dst, &client_id, trusting_period).await?;
            print_json(&receipt)
        }
        TxCommand::Clients { path } => {
            let (mut src, mut dst) = ctx.path_ends(&path, false)?;
            let src_client = src.client_id()?.to_string();
            let dst_client = dst.client_id()?.to_string();
            let (src_receipt, dst_receipt) = relay::create_clients(&mut src, &mut dst, &src_client, &dst_client).await?;
            print_json(&json!({ "src": src_receipt, "dst": dst_receipt }))
        }
        TxCommand::UpdateClient { path, reverse } => {
            let (mut src, dst) = ctx.path_ends(&path, reverse)?;
            let client_id = src.client_id()?.to_string();
            let receipt = relay::update_client(&mut src, &dst, &client_id).await?;
            print_json(&receipt)
        }
        TxCommand::Connection { path, timeout } => ctx.drive(HandshakeKind::Connection, &path, timeout).await,
        TxCommand::ConnectionStep { path } => {
            let (mut src, mut dst) = ctx.path_ends(&path, false)?;
            let report = relay::step_once(HandshakeKind::Connection, &mut src, &mut dst).await;
            ctx.record_identifiers(&path, &src, &dst)?;
            print_json(&report?)
        }
        TxCommand::Channel { path, ordering, timeout } => {
            let ordering = ordering_for(ctx.path(&path)?, ordering);
            ctx.drive(HandshakeKind::Channel(ordering), &path, timeout).await
        }
        TxCommand::ChannelStep { path, ordering } => {
            let ordering = ordering_for(ctx.path(&path)?, ordering);
            let (mut src, mut dst) = ctx.path_ends(&path, false)?;
            let report = relay::step_once(HandshakeKind::Channel(ordering), &mut src, &mut dst).await;
            ctx.record_identifiers(&path, &src, &dst)?;
            print_json(&report?)
        }
        TxCommand::ChannelClose { path, timeout } => ctx.drive(HandshakeKind::ChannelClose, &path, timeout).await,
        TxCommand::Raw { action, path, ordering, to_dst } => {
            let ordering = ordering_for(ctx.path(&path)?, ordering);
            let (kind, action) = action.resolve(ordering);
            let target = if to_dst { Side::Dst } else { Side::Src };
            let (mut src, mut dst) = ctx.path_ends(&path, false)?;
            let report = relay::raw_step(kind, action, target, &mut src, &mut dst).await;
            ctx.record_identifiers(&path, &src, &dst)?;
            print_json(&report?)
        }
    }
}

async fn query_chain(ctx: &App, chain_id: &str) -> anyhow::Result<(Arc<ChainRef>, u64)> {
    let chain = ctx.registry.get(chain_id)?;
    let header = sync_header(&chain).await?;
    Ok((chain, header.height))
}

async fn run_query(ctx: &App, command: QueryCommand) -> anyhow::Result<()> {
    match command {
        QueryCommand::Connection { chain_id, connection_id } => {
            let (chain, height) = query_chain(ctx, &chain_id).await?;
            let response = chain.handle().query_connection(&connection_id, height).await?;
            print_json(&json!({ "chain_id": chain_id, "height": height, "response": response }))
        }
        QueryCommand::Channel { chain_id, port_id, channel_id } => {
            let (chain, height) = query_chain(ctx, &chain_id).await?;
            let response = chain.handle().query_channel(&port_id, &channel_id, height).await?;
            print_json(&json!({ "chain_id": chain_id, "height": height, "response": response }))
        }
    }
}
