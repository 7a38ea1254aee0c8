// Path: crates/test_utils/src/mock_chain.rs

//! A scriptable in-memory chain client.
//!
//! Tests can inject transient failures before any operation, pre-register an
//! "already existing" channel to exercise adoption, and inspect everything
//! the executor submitted.

use alloy_primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use m2m_api::ChainClient;
use m2m_types::channel::{BalanceProof, ChannelId, ChannelState, TxHash};
use m2m_types::error::ChainError;
use std::collections::HashMap;
use std::sync::Mutex;

/// The local party's address as reported by the mock chain.
pub const LOCAL_ADDRESS: Address = Address::repeat_byte(0x10);

#[derive(Default)]
struct MockChainInner {
    channels: HashMap<ChannelId, ChannelState>,
    /// Channel returned instead of opening a new one, simulating the
    /// adapter's adopt-on-exists behavior.
    existing: Option<ChannelId>,
    submitted: Vec<BalanceProof>,
    open_calls: u32,
    state_calls: u32,
    fail_opens: u32,
    fail_states: u32,
    next_channel: u8,
}

/// Scriptable [`ChainClient`] double.
#[derive(Default)]
pub struct MockChainClient {
    inner: Mutex<MockChainInner>,
}

impl MockChainClient {
    /// Creates a mock with no channels and no scripted failures.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockChainInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes the next `n` `open_channel` calls fail with a transient RPC error.
    pub fn fail_next_opens(&self, n: u32) {
        self.lock().fail_opens = n;
    }

    /// Makes the next `n` `channel_state` calls fail with a transient RPC error.
    pub fn fail_next_states(&self, n: u32) {
        self.lock().fail_states = n;
    }

    /// Registers a channel that `open_channel` will adopt instead of opening.
    pub fn preopen_channel(&self, peer: Address, token: Address, my_nonce: u64, my_transferred: U256) -> ChannelId {
        let mut inner = self.lock();
        inner.next_channel += 1;
        let channel_id = B256::repeat_byte(inner.next_channel);
        let mut state = ChannelState::opened(
            channel_id,
            LOCAL_ADDRESS,
            peer,
            token,
            U256::from(1_000_000u64),
            86_400,
        );
        state.my_nonce = my_nonce;
        state.my_transferred = my_transferred;
        inner.channels.insert(channel_id, state);
        inner.existing = Some(channel_id);
        channel_id
    }

    /// How many times `open_channel` was called.
    pub fn open_calls(&self) -> u32 {
        self.lock().open_calls
    }

    /// How many times `channel_state` was called.
    pub fn state_calls(&self) -> u32 {
        self.lock().state_calls
    }

    /// Every proof submitted through `submit_settlement`.
    pub fn submitted(&self) -> Vec<BalanceProof> {
        self.lock().submitted.clone()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn open_channel(
        &self,
        peer: Address,
        token: Address,
        initial_deposit: U256,
        settlement_timeout_secs: u64,
    ) -> Result<ChannelId, ChainError> {
        let mut inner = self.lock();
        inner.open_calls += 1;
        if inner.fail_opens > 0 {
            inner.fail_opens -= 1;
            return Err(ChainError::Rpc("scripted open failure".into()));
        }
        if let Some(existing) = inner.existing.take() {
            return Ok(existing);
        }
        inner.next_channel += 1;
        let channel_id = B256::repeat_byte(inner.next_channel);
        let state = ChannelState::opened(
            channel_id,
            LOCAL_ADDRESS,
            peer,
            token,
            initial_deposit,
            settlement_timeout_secs,
        );
        inner.channels.insert(channel_id, state);
        Ok(channel_id)
    }

    async fn channel_state(&self, channel_id: ChannelId) -> Result<ChannelState, ChainError> {
        let mut inner = self.lock();
        inner.state_calls += 1;
        if inner.fail_states > 0 {
            inner.fail_states -= 1;
            return Err(ChainError::Rpc("scripted state failure".into()));
        }
        inner
            .channels
            .get(&channel_id)
            .cloned()
            .ok_or_else(|| ChainError::Rpc(format!("unknown channel {}", channel_id)))
    }

    async fn submit_settlement(
        &self,
        _channel_id: ChannelId,
        proof: &BalanceProof,
    ) -> Result<TxHash, ChainError> {
        let mut inner = self.lock();
        inner.submitted.push(proof.clone());
        Ok(keccak256(&proof.signature))
    }

    fn proof_digest(
        &self,
        channel_id: ChannelId,
        nonce: u64,
        transferred_amount: U256,
        token: Address,
    ) -> B256 {
        // Stand-in for the registry's typed hash: any deterministic digest
        // that binds all four fields works for executor tests.
        let mut preimage = Vec::with_capacity(32 + 8 + 32 + 20);
        preimage.extend_from_slice(channel_id.as_slice());
        preimage.extend_from_slice(&nonce.to_be_bytes());
        preimage.extend_from_slice(&transferred_amount.to_be_bytes::<32>());
        preimage.extend_from_slice(token.as_slice());
        keccak256(&preimage)
    }
}
