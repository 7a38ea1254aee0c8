// Path: crates/chain/src/lib.rs
#![forbid(unsafe_code)]

//! # m2m Chain Adapter
//!
//! Concrete [`ChainClient`] implementation over the channel-registry RPC
//! facade: a JSON-RPC 2.0 service that fronts the registry contract on an
//! EVM-compatible chain and submits transactions with the operator's key.
//!
//! ## Facade contract
//!
//! * `channel_open { peer, token, initialDeposit, settlementTimeoutSecs }`
//!   → `{ channelId, blockNumber }`; error [`rpc::codes::CHANNEL_EXISTS`]
//!   carries `{ channelId }` of the already-open channel in `data`.
//! * `channel_state { channelId }` → the party-oriented channel state for
//!   the operator's account.
//! * `channel_submitProof { channelId, nonce, transferredAmount,
//!   tokenAddress, signature }` → `{ txHash }`.
//! * `eth_blockNumber` → hex quantity, used to wait out confirmations.

pub mod digest;
pub mod rpc;

use async_trait::async_trait;
use alloy_primitives::{Address, B256, U256};
use m2m_api::ChainClient;
use m2m_types::channel::{BalanceProof, ChannelId, ChannelState, ChannelStatus, TxHash};
use m2m_types::config::ChainConfig;
use m2m_types::error::ChainError;
use rpc::{CallError, RpcClient};
use serde::Deserialize;
use serde_json::json;
use tokio::time::{sleep, Duration, Instant};

/// Upper bound on waiting for an opening transaction to reach depth.
const CONFIRMATION_DEADLINE: Duration = Duration::from_secs(180);

/// [`ChainClient`] backed by the channel-registry RPC facade.
pub struct EvmChannelClient {
    cfg: ChainConfig,
    rpc: RpcClient,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenResult {
    channel_id: ChannelId,
    block_number: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResult {
    tx_hash: TxHash,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelStateDto {
    channel_id: ChannelId,
    status: ChannelStatus,
    my_deposit: U256,
    their_deposit: U256,
    my_nonce: u64,
    their_nonce: u64,
    my_transferred: U256,
    their_transferred: U256,
    participants: (Address, Address),
    token_address: Address,
    settlement_timeout_secs: u64,
}

impl From<ChannelStateDto> for ChannelState {
    fn from(dto: ChannelStateDto) -> Self {
        ChannelState {
            channel_id: dto.channel_id,
            status: dto.status,
            my_deposit: dto.my_deposit,
            their_deposit: dto.their_deposit,
            my_nonce: dto.my_nonce,
            their_nonce: dto.their_nonce,
            my_transferred: dto.my_transferred,
            their_transferred: dto.their_transferred,
            participants: dto.participants,
            token_address: dto.token_address,
            settlement_timeout_secs: dto.settlement_timeout_secs,
        }
    }
}

impl EvmChannelClient {
    /// Builds the adapter from its configuration.
    pub fn new(cfg: ChainConfig) -> Result<Self, ChainError> {
        let rpc = RpcClient::new(
            cfg.rpc_url.clone(),
            Duration::from_millis(cfg.request_timeout_ms),
            cfg.retry_attempts,
            Duration::from_millis(cfg.retry_delay_ms),
        )?;
        Ok(Self { cfg, rpc })
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let value: serde_json::Value = self.rpc.call("eth_blockNumber", json!([])).await?;
        rpc::parse_quantity(&value)
    }

    /// Polls until the chain head is `confirmations` blocks past `mined_at`.
    async fn wait_for_confirmations(&self, mined_at: u64) -> Result<(), ChainError> {
        let target = mined_at + self.cfg.confirmations;
        let deadline = Instant::now() + CONFIRMATION_DEADLINE;
        loop {
            let head = self.block_number().await?;
            if head >= target {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ChainError::Timeout(format!(
                    "head {} did not reach {} within {:?}",
                    head, target, CONFIRMATION_DEADLINE
                )));
            }
            sleep(Duration::from_millis(self.cfg.retry_delay_ms)).await;
        }
    }
}

#[async_trait]
impl ChainClient for EvmChannelClient {
    async fn open_channel(
        &self,
        peer: Address,
        token: Address,
        initial_deposit: U256,
        settlement_timeout_secs: u64,
    ) -> Result<ChannelId, ChainError> {
        let params = json!({
            "peer": peer,
            "token": token,
            "initialDeposit": initial_deposit,
            "settlementTimeoutSecs": settlement_timeout_secs,
        });
        let opened = match self.rpc.call_raw("channel_open", params).await {
            Ok(value) => serde_json::from_value::<OpenResult>(value)
                .map_err(|e| ChainError::Rpc(format!("malformed channel_open result: {}", e)))?,
            // A channel for (self, peer, token) already exists: adopt it.
            Err(CallError::Rpc(err)) if err.code == rpc::codes::CHANNEL_EXISTS => {
                let channel_id = err
                    .data
                    .as_ref()
                    .and_then(|d| d.get("channelId"))
                    .and_then(|v| serde_json::from_value::<ChannelId>(v.clone()).ok())
                    .ok_or_else(|| {
                        ChainError::Rpc("channel exists but no channelId in error data".into())
                    })?;
                tracing::debug!(target: "chain", %channel_id, %peer, "adopting existing channel");
                return Ok(channel_id);
            }
            Err(e) => return Err(e.into_chain_error()),
        };
        self.wait_for_confirmations(opened.block_number).await?;
        Ok(opened.channel_id)
    }

    async fn channel_state(&self, channel_id: ChannelId) -> Result<ChannelState, ChainError> {
        let dto: ChannelStateDto = self
            .rpc
            .call("channel_state", json!({ "channelId": channel_id }))
            .await?;
        Ok(dto.into())
    }

    async fn submit_settlement(
        &self,
        channel_id: ChannelId,
        proof: &BalanceProof,
    ) -> Result<TxHash, ChainError> {
        let params = json!({
            "channelId": channel_id,
            "nonce": proof.nonce,
            "transferredAmount": proof.transferred_amount,
            "tokenAddress": proof.token_address,
            "signature": format!("0x{}", hex::encode(&proof.signature)),
        });
        let result: SubmitResult = self.rpc.call("channel_submitProof", params).await?;
        Ok(result.tx_hash)
    }

    fn proof_digest(
        &self,
        channel_id: ChannelId,
        nonce: u64,
        transferred_amount: U256,
        token: Address,
    ) -> B256 {
        digest::balance_proof_digest(
            self.cfg.chain_id,
            self.cfg.registry_address,
            channel_id,
            nonce,
            transferred_amount,
            token,
        )
    }
}
