// Path: crates/types/src/channel.rs

//! Payment channel state and signed balance proofs.
//!
//! A channel is an on-chain escrow between two parties. Off-chain, the
//! parties exchange [`BalanceProof`]s: signed `(channel_id, nonce,
//! transferred_amount, token)` tuples that authorize one party to claim a
//! cumulative amount from the escrow. Within a channel each issuing party's
//! nonce strictly increases and its transferred amount never decreases.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// The 32-byte identifier of a payment channel, as assigned by the chain.
pub type ChannelId = B256;
/// The hash of an on-chain transaction.
pub type TxHash = B256;

/// The lifecycle phase of a payment channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// The opening transaction has been submitted but not yet confirmed.
    Opening,
    /// The channel is confirmed on-chain and usable for settlements.
    Opened,
    /// A cooperative or unilateral close has been initiated.
    Settling,
    /// The escrow has been paid out; the channel is terminal.
    Settled,
    /// One party has challenged a submitted proof; awaiting resolution.
    Disputed,
}

/// A signed authorization to claim a cumulative amount from a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceProof {
    /// The channel this proof applies to.
    pub channel_id: ChannelId,
    /// Strictly increasing per channel per issuing party.
    pub nonce: u64,
    /// Cumulative amount transferred since channel open; never decreases.
    pub transferred_amount: U256,
    /// The ERC-20 token the channel escrows.
    pub token_address: Address,
    /// Signature over the canonical digest of the other fields.
    pub signature: Vec<u8>,
}

/// The full state of one channel, mirroring what the chain reports plus the
/// executor's locally cached view of its own side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    /// The channel identifier.
    pub channel_id: ChannelId,
    /// Current lifecycle phase.
    pub status: ChannelStatus,
    /// Escrow deposited by the local party.
    pub my_deposit: U256,
    /// Escrow deposited by the counterparty.
    pub their_deposit: U256,
    /// Highest nonce this node has signed for this channel.
    pub my_nonce: u64,
    /// Highest counterparty nonce observed for this channel.
    pub their_nonce: u64,
    /// Cumulative amount this node has signed away.
    pub my_transferred: U256,
    /// Cumulative amount the counterparty has signed away.
    pub their_transferred: U256,
    /// On-chain addresses of (local party, counterparty).
    pub participants: (Address, Address),
    /// The escrowed ERC-20 token.
    pub token_address: Address,
    /// Seconds the escrow stays challengeable after a unilateral close.
    pub settlement_timeout_secs: u64,
}

impl ChannelState {
    /// Initial local view of a channel that was just opened by this node.
    pub fn opened(
        channel_id: ChannelId,
        me: Address,
        peer: Address,
        token_address: Address,
        my_deposit: U256,
        settlement_timeout_secs: u64,
    ) -> Self {
        Self {
            channel_id,
            status: ChannelStatus::Opened,
            my_deposit,
            their_deposit: U256::ZERO,
            my_nonce: 0,
            their_nonce: 0,
            my_transferred: U256::ZERO,
            their_transferred: U256::ZERO,
            participants: (me, peer),
            token_address,
            settlement_timeout_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_status_serializes_snake_case() {
        let s = serde_json::to_string(&ChannelStatus::Opening).unwrap();
        assert_eq!(s, "\"opening\"");
        let s = serde_json::to_string(&ChannelStatus::Disputed).unwrap();
        assert_eq!(s, "\"disputed\"");
    }

    #[test]
    fn opened_state_starts_at_zero() {
        let st = ChannelState::opened(
            B256::repeat_byte(1),
            Address::repeat_byte(2),
            Address::repeat_byte(3),
            Address::repeat_byte(4),
            U256::from(500u64),
            3600,
        );
        assert_eq!(st.status, ChannelStatus::Opened);
        assert_eq!(st.my_nonce, 0);
        assert_eq!(st.my_transferred, U256::ZERO);
        assert_eq!(st.participants.0, Address::repeat_byte(2));
    }
}
