// Path: crates/api/src/chain.rs

//! The chain port: payment-channel operations behind an EVM RPC.
//!
//! The chain is an opaque remote service from the core's perspective. The
//! adapter owns transport-level concerns (request deadlines, bounded retries
//! on RPC blips); the settlement executor owns settlement-level retries and
//! never sees transport details.

use async_trait::async_trait;
use alloy_primitives::{Address, B256, U256};
use m2m_types::channel::{BalanceProof, ChannelId, ChannelState, TxHash};
use m2m_types::error::ChainError;

/// Payment-channel operations over an EVM-compatible chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Submits the channel-opening transaction for `(self, peer, token)`,
    /// waits for the adapter's configured confirmation depth, and returns the
    /// resulting channel id.
    ///
    /// If the chain reports that a channel already exists for this triple,
    /// the existing id is adopted and returned instead of an error.
    async fn open_channel(
        &self,
        peer: Address,
        token: Address,
        initial_deposit: U256,
        settlement_timeout_secs: u64,
    ) -> Result<ChannelId, ChainError>;

    /// Reads the current on-chain state of a channel.
    async fn channel_state(&self, channel_id: ChannelId) -> Result<ChannelState, ChainError>;

    /// Posts a balance proof on-chain. Used only on the non-cooperative
    /// path; cooperative settlement stays off-chain until close.
    async fn submit_settlement(
        &self,
        channel_id: ChannelId,
        proof: &BalanceProof,
    ) -> Result<TxHash, ChainError>;

    /// Computes the canonical digest the on-chain verifier checks for a
    /// balance proof. The layout must match the verifier byte-for-byte.
    fn proof_digest(
        &self,
        channel_id: ChannelId,
        nonce: u64,
        transferred_amount: U256,
        token: Address,
    ) -> B256;
}
