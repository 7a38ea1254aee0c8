// Path: crates/chain/tests/chain_rpc_e2e.rs

//! End-to-end tests for the chain adapter against an in-process mock of the
//! channel-registry RPC facade.

use alloy_primitives::{Address, B256, U256};
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use m2m_api::ChainClient;
use m2m_chain::rpc::codes;
use m2m_chain::EvmChannelClient;
use m2m_types::config::ChainConfig;
use m2m_types::error::ChainError;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Scripted behavior of the mock facade.
#[derive(Default)]
struct Facade {
    /// Pretend head height; incremented on every `eth_blockNumber` call so
    /// confirmation waits terminate quickly.
    head: AtomicU64,
    /// HTTP 500s to serve before answering anything.
    fail_first: AtomicU64,
    /// When set, `channel_open` reports an already-existing channel.
    existing_channel: Option<B256>,
    /// When set, `channel_submitProof` reports a nonce conflict at this value.
    conflict_at: Option<u64>,
}

async fn handle(
    State(facade): State<Arc<Facade>>,
    Json(req): Json<Value>,
) -> Result<Json<Value>, axum::http::StatusCode> {
    if facade.fail_first.load(Ordering::SeqCst) > 0 {
        facade.fail_first.fetch_sub(1, Ordering::SeqCst);
        return Err(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }
    let id = req["id"].clone();
    let reply = |body: Value| Json(json!({ "jsonrpc": "2.0", "id": id, "result": body }));
    let reply_err = |code: i64, message: &str, data: Value| {
        Json(json!({
            "jsonrpc": "2.0",
            "id": req["id"],
            "error": { "code": code, "message": message, "data": data }
        }))
    };

    let method = req["method"].as_str().unwrap_or_default();
    Ok(match method {
        "eth_blockNumber" => {
            let head = facade.head.fetch_add(1, Ordering::SeqCst);
            reply(json!(format!("0x{:x}", head)))
        }
        "channel_open" => {
            if let Some(existing) = facade.existing_channel {
                reply_err(
                    codes::CHANNEL_EXISTS,
                    "channel already open",
                    json!({ "channelId": existing }),
                )
            } else {
                reply(json!({
                    "channelId": B256::repeat_byte(0x42),
                    "blockNumber": 5,
                }))
            }
        }
        "channel_state" => reply(json!({
            "channelId": req["params"]["channelId"],
            "status": "opened",
            "myDeposit": U256::from(1_000_000u64),
            "theirDeposit": U256::ZERO,
            "myNonce": 3,
            "theirNonce": 0,
            "myTransferred": U256::from(1300u64),
            "theirTransferred": U256::ZERO,
            "participants": [Address::repeat_byte(0x01), Address::repeat_byte(0x02)],
            "tokenAddress": Address::repeat_byte(0xBB),
            "settlementTimeoutSecs": 86400,
        })),
        "channel_submitProof" => {
            if let Some(on_chain) = facade.conflict_at {
                reply_err(
                    codes::NONCE_CONFLICT,
                    "stale nonce",
                    json!({ "onChain": on_chain }),
                )
            } else {
                reply(json!({ "txHash": B256::repeat_byte(0x77) }))
            }
        }
        other => reply_err(-32601, &format!("unknown method {}", other), Value::Null),
    })
}

async fn serve(facade: Facade) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route("/", post(handle))
        .with_state(Arc::new(facade));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config(addr: SocketAddr) -> ChainConfig {
    ChainConfig {
        rpc_url: format!("http://{}", addr),
        chain_id: 31337,
        registry_address: Address::repeat_byte(0xAA),
        confirmations: 2,
        request_timeout_ms: 2_000,
        retry_attempts: 3,
        retry_delay_ms: 10,
    }
}

#[tokio::test]
async fn open_channel_waits_for_confirmations() {
    let addr = serve(Facade {
        head: AtomicU64::new(5),
        ..Default::default()
    })
    .await;
    let client = EvmChannelClient::new(config(addr)).unwrap();

    let channel_id = client
        .open_channel(
            Address::repeat_byte(0x02),
            Address::repeat_byte(0xBB),
            U256::from(1_000_000u64),
            86_400,
        )
        .await
        .unwrap();
    assert_eq!(channel_id, B256::repeat_byte(0x42));
}

#[tokio::test]
async fn open_channel_adopts_existing() {
    let existing = B256::repeat_byte(0x99);
    let addr = serve(Facade {
        existing_channel: Some(existing),
        ..Default::default()
    })
    .await;
    let client = EvmChannelClient::new(config(addr)).unwrap();

    let channel_id = client
        .open_channel(
            Address::repeat_byte(0x02),
            Address::repeat_byte(0xBB),
            U256::from(1_000_000u64),
            86_400,
        )
        .await
        .unwrap();
    assert_eq!(channel_id, existing);
}

#[tokio::test]
async fn transient_http_errors_are_retried() {
    let addr = serve(Facade {
        head: AtomicU64::new(100),
        fail_first: AtomicU64::new(2),
        ..Default::default()
    })
    .await;
    let client = EvmChannelClient::new(config(addr)).unwrap();

    // Two 500s, then success: inside the budget of 3 attempts.
    let state = client.channel_state(B256::repeat_byte(0x42)).await.unwrap();
    assert_eq!(state.my_nonce, 3);
    assert_eq!(state.my_transferred, U256::from(1300u64));
}

#[tokio::test]
async fn exhausted_retries_surface_transport_error() {
    let addr = serve(Facade {
        fail_first: AtomicU64::new(10),
        ..Default::default()
    })
    .await;
    let client = EvmChannelClient::new(config(addr)).unwrap();

    let err = client.channel_state(B256::repeat_byte(0x42)).await.unwrap_err();
    assert!(matches!(err, ChainError::Rpc(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn nonce_conflict_is_structured() {
    let addr = serve(Facade {
        conflict_at: Some(4),
        ..Default::default()
    })
    .await;
    let client = EvmChannelClient::new(config(addr)).unwrap();

    let proof = m2m_types::channel::BalanceProof {
        channel_id: B256::repeat_byte(0x42),
        nonce: 4,
        transferred_amount: U256::from(1300u64),
        token_address: Address::repeat_byte(0xBB),
        signature: vec![1, 2, 3],
    };
    let err = client
        .submit_settlement(proof.channel_id, &proof)
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::NonceConflict { on_chain: 4 }));
}
