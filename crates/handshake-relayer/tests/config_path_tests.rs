// End-to-end: configuration on disk -> chain registry -> handshakes over a configured path

use std::path::Path;
use tempfile::tempdir;

use handshake_relayer::chains::{Order, State};
use handshake_relayer::relay::{create_clients, step_once, Action, Side, StatePair, Step};
use handshake_relayer::{
    ChainFactory, ChainRegistry, DriverState, HandshakeDriver, HandshakeKind, PathEnd, RelayerConfig,
};

#[tokio::test]
async fn test_demo_path_opens_from_configuration() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("relayer.toml");
    RelayerConfig::default().save(&path).unwrap();

    let config = RelayerConfig::load(&path).unwrap();
    config.validate().unwrap();
    let registry = ChainFactory::build_registry(&config).unwrap();
    assert_eq!(registry.chain_ids(), vec!["ibc-0", "ibc-1"]);

    let demo = config.get_path("demo").unwrap();
    let (src_chain, dst_chain) = registry
        .get_pair(&demo.src.chain_id, &demo.dst.chain_id)
        .unwrap();
    let mut src = PathEnd::new(src_chain, demo.src.identifiers().unwrap());
    let mut dst = PathEnd::new(dst_chain, demo.dst.identifiers().unwrap());

    let src_client = src.client_id().unwrap().to_string();
    let dst_client = dst.client_id().unwrap().to_string();
    create_clients(&mut src, &mut dst, &src_client, &dst_client)
        .await
        .unwrap();

    let driver_config = config.global.driver_config().unwrap();
    let mut connection = HandshakeDriver::new(HandshakeKind::Connection, src, dst, driver_config.clone());
    connection.run().await.unwrap();

    let src = PathEnd::new(connection.src().chain().clone(), connection.src().ids().clone());
    let dst = PathEnd::new(connection.dst().chain().clone(), connection.dst().ids().clone());
    let mut channel = HandshakeDriver::new(HandshakeKind::Channel(demo.ordering), src, dst, driver_config);
    let outcome = channel.run().await.unwrap();

    assert_eq!(channel.state(), DriverState::Complete);
    assert_eq!(outcome.final_states, StatePair::new(State::Open, State::Open));
    assert_eq!(demo.ordering, Order::Unordered);
    assert_eq!(channel.src().channel_id().unwrap(), "channel-0");
    assert_eq!(channel.dst().port_id().unwrap(), "transfer");
}

/// Both ends of the demo path as recorded in the file at `path`
fn demo_ends(path: &Path, registry: &ChainRegistry) -> (RelayerConfig, PathEnd, PathEnd) {
    let config = RelayerConfig::load(path).unwrap();
    let demo = config.get_path("demo").unwrap();
    let (src_chain, dst_chain) = registry
        .get_pair(&demo.src.chain_id, &demo.dst.chain_id)
        .unwrap();
    let src = PathEnd::new(src_chain, demo.src.identifiers().unwrap());
    let dst = PathEnd::new(dst_chain, demo.dst.identifiers().unwrap());
    (config, src, dst)
}

/// One connection step starting from the file, the way a separate CLI invocation runs
async fn step_from_file(path: &Path, registry: &ChainRegistry) -> Option<Step> {
    let (mut config, mut src, mut dst) = demo_ends(path, registry);
    let report = step_once(HandshakeKind::Connection, &mut src, &mut dst)
        .await
        .unwrap();
    if config.record_path_identifiers("demo", src.ids(), dst.ids()).unwrap() {
        config.save(path).unwrap();
    }
    report.step
}

#[tokio::test]
async fn test_consecutive_steps_resume_from_saved_identifiers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("relayer.toml");
    RelayerConfig::default().save(&path).unwrap();
    let registry = ChainFactory::build_registry(&RelayerConfig::load(&path).unwrap()).unwrap();

    let (_, mut src, mut dst) = demo_ends(&path, &registry);
    create_clients(&mut src, &mut dst, "07-tendermint-0", "07-tendermint-0")
        .await
        .unwrap();

    assert_eq!(step_from_file(&path, &registry).await, Some(Step::new(Action::Init, Side::Src)));
    let saved = RelayerConfig::load(&path).unwrap();
    assert_eq!(saved.get_path("demo").unwrap().src.connection_id, "connection-0");
    assert!(saved.get_path("demo").unwrap().dst.connection_id.is_empty());

    assert_eq!(step_from_file(&path, &registry).await, Some(Step::new(Action::Try, Side::Dst)));
    let saved = RelayerConfig::load(&path).unwrap();
    assert_eq!(saved.get_path("demo").unwrap().dst.connection_id, "connection-0");

    assert_eq!(step_from_file(&path, &registry).await, Some(Step::new(Action::Ack, Side::Src)));
    println!("✅ Consecutive steps advanced Init, Try, Ack from the saved path");
}

#[test]
fn test_missing_config_file_is_an_error() {
    let dir = tempdir().unwrap();
    assert!(RelayerConfig::load(dir.path().join("absent.toml")).is_err());
}
