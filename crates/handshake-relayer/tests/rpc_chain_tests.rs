// Integration tests for the JSON-RPC chain gateway client
// A wiremock server stands in for the gateway

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use handshake_relayer::chains::{
    Chain, ChainError, ConnectionCounterparty, ConnectionEnd, ConnectionResponse, Header, Proof,
    Receipt, State, TxEvent,
};
use handshake_relayer::relay::{dispatch, probe_connection_state, Msg};
use handshake_relayer::{ChainConfig, ChainRef, RelayerError, RpcChain};

fn header(height: u64) -> Header {
    Header {
        chain_id: "gaia-1".to_string(),
        height,
        time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        app_hash: vec![7; 32],
        validator_key: vec![1; 32],
        signature: vec![2; 64],
    }
}

fn success(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

fn failure(code: i64, message: &str, data: Option<Value>) -> ResponseTemplate {
    let mut error = json!({ "code": code, "message": message });
    if let Some(data) = data {
        error["data"] = data;
    }
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "error": error }))
}

async fn rpc_method(server: &MockServer, name: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "jsonrpc": "2.0", "method": name })))
        .respond_with(response)
        .mount(server)
        .await;
}

fn gateway(server: &MockServer) -> RpcChain {
    RpcChain::new(&ChainConfig::rpc("gaia-1", &server.uri())).unwrap()
}

#[tokio::test]
async fn test_latest_header_round_trip() {
    let server = MockServer::start().await;
    rpc_method(&server, "ibc_latestHeader", success(serde_json::to_value(header(42)).unwrap())).await;
    rpc_method(&server, "ibc_verifyHeader", success(json!({ "valid": true }))).await;

    let chain = gateway(&server);
    let fetched = chain.latest_header().await.unwrap();
    assert_eq!(fetched, header(42));
    chain.accepts_header(&fetched).await.unwrap();
}

#[tokio::test]
async fn test_invalid_header_maps_to_chain_error() {
    let server = MockServer::start().await;
    rpc_method(&server, "ibc_verifyHeader", failure(-32003, "signature mismatch", None)).await;

    let err = gateway(&server).accepts_header(&header(5)).await.unwrap_err();
    assert_eq!(err, ChainError::InvalidHeader("signature mismatch".to_string()));
}

#[tokio::test]
async fn test_query_connection_and_not_found() {
    let server = MockServer::start().await;
    let response = ConnectionResponse {
        connection: ConnectionEnd {
            state: State::TryOpen,
            client_id: "07-tendermint-3".to_string(),
            counterparty: ConnectionCounterparty {
                client_id: "07-tendermint-0".to_string(),
                connection_id: "connection-0".to_string(),
            },
        },
        proof: Proof {
            bytes: vec![9; 32],
            height: 10,
        },
    };
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "ibc_queryConnection",
            "params": { "connection_id": "connection-4", "height": 10 }
        })))
        .respond_with(success(serde_json::to_value(&response).unwrap()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "ibc_queryConnection",
            "params": { "connection_id": "connection-9" }
        })))
        .respond_with(failure(-32004, "connection-9 does not exist", None))
        .mount(&server)
        .await;

    let chain = ChainRef::new(std::sync::Arc::new(gateway(&server)));
    assert_eq!(
        chain.handle().query_connection("connection-4", 10).await.unwrap(),
        response
    );
    // a missing end reads as uninitialized
    assert_eq!(
        probe_connection_state(&chain, 10, "connection-9").await.unwrap(),
        State::Uninitialized
    );
}

#[tokio::test]
async fn test_submit_forwards_signing_parameters() {
    let server = MockServer::start().await;
    let receipt = Receipt {
        tx_hash: "AB12".to_string(),
        height: 77,
        success: true,
        code: 0,
        log: String::new(),
        events: vec![TxEvent::new("update_client", &[("client_id", "07-tendermint-0")])],
    };
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "ibc_submitTx",
            "params": { "signer": "relayer", "gas": 200000, "gas_prices": "0.025stake" }
        })))
        .respond_with(success(serde_json::to_value(&receipt).unwrap()))
        .expect(1)
        .mount(&server)
        .await;

    let chain = ChainRef::new(std::sync::Arc::new(gateway(&server)));
    let msgs = [Msg::UpdateClient {
        client_id: "07-tendermint-0".to_string(),
        header: header(76),
    }];
    assert_eq!(dispatch(&chain, &msgs).await.unwrap(), receipt);
}

#[tokio::test]
async fn test_submit_error_codes_map_to_dispatch_errors() {
    let server = MockServer::start().await;
    rpc_method(
        &server,
        "ibc_submitTx",
        failure(-32001, "connection already exists", Some(json!({ "code": 12 }))),
    )
    .await;
    let chain = ChainRef::new(std::sync::Arc::new(gateway(&server)));
    let msgs = [Msg::UpdateClient {
        client_id: "07-tendermint-0".to_string(),
        header: header(3),
    }];

    match dispatch(&chain, &msgs).await.unwrap_err() {
        RelayerError::Rejected { chain_id, code, log } => {
            assert_eq!(chain_id, "gaia-1");
            assert_eq!(code, 12);
            assert_eq!(log, "connection already exists");
        }
        other => panic!("expected a rejection, got {}", other),
    }

    let server = MockServer::start().await;
    rpc_method(&server, "ibc_submitTx", failure(-32002, "not included after 10 blocks", None)).await;
    let chain = ChainRef::new(std::sync::Arc::new(gateway(&server)));
    let err = dispatch(&chain, &msgs).await.unwrap_err();
    assert!(matches!(err, RelayerError::DispatchTimeout { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_http_failures_are_rpc_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let chain = gateway(&server);
    assert!(matches!(chain.health_check().await, Err(ChainError::Rpc(_))));
    assert!(matches!(chain.latest_header().await, Err(ChainError::Rpc(_))));
}

#[tokio::test]
async fn test_malformed_result_is_a_decode_error() {
    let server = MockServer::start().await;
    rpc_method(&server, "ibc_latestHeader", success(json!({ "height": "not a number" }))).await;

    let err = gateway(&server).latest_header().await.unwrap_err();
    assert!(matches!(err, ChainError::Decode(_)));
}
