// Path: crates/types/src/event.rs

//! Balance-monitor triggers consumed by the settlement executor and the
//! telemetry event union it emits towards observers.

use crate::channel::{ChannelId, TxHash};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Emitted by the balance monitor when a peer's accumulated debt crosses its
/// settlement threshold.
///
/// `current_balance` is the amount owed *since the last settlement*, not an
/// absolute replacement value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementTrigger {
    /// The peer whose balance crossed the threshold.
    pub peer_id: String,
    /// The token the balance is denominated in.
    pub token_id: String,
    /// The increment owed since the last settlement.
    pub current_balance: U256,
    /// The threshold that was crossed.
    pub threshold: U256,
    /// Milliseconds since epoch at which the monitor observed the crossing.
    pub timestamp_ms: u64,
}

/// The event union emitted by the settlement executor towards observers
/// (dashboard, accounting reconciliation). Serialized with a `type` tag so
/// consumers can dispatch without knowing every variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TelemetryEvent {
    /// A settlement trigger was accepted and queued for a peer.
    #[serde(rename = "SETTLEMENT_TRIGGERED")]
    SettlementTriggered {
        /// Identifier of the emitting node.
        node_id: String,
        /// The peer being settled with.
        peer_id: String,
        /// The channel that will carry the settlement, when already known.
        channel_id: Option<ChannelId>,
        /// The token being settled.
        token_id: String,
        /// The increment to settle.
        amount: U256,
    },
    /// A balance proof was signed, recorded, and reported to accounting.
    #[serde(rename = "SETTLEMENT_COMPLETED")]
    SettlementCompleted {
        /// Identifier of the emitting node.
        node_id: String,
        /// The peer settled with.
        peer_id: String,
        /// The channel the proof was issued on.
        channel_id: ChannelId,
        /// Nonce of the committed proof.
        nonce: u64,
        /// Cumulative transferred amount after this settlement.
        transferred: U256,
        /// The increment settled by this proof.
        amount: U256,
    },
    /// A settlement failed terminally (retries exhausted or non-retryable).
    #[serde(rename = "SETTLEMENT_FAILED")]
    SettlementFailed {
        /// Identifier of the emitting node.
        node_id: String,
        /// The peer whose settlement failed.
        peer_id: String,
        /// The channel involved, when one had been resolved.
        channel_id: Option<ChannelId>,
        /// Stable error code of the terminal cause.
        code: String,
        /// Human-readable description of the terminal cause.
        reason: String,
        /// Number of attempts made before giving up.
        attempts: u32,
    },
    /// A new payment channel was opened (or an existing one adopted).
    #[serde(rename = "PAYMENT_CHANNEL_OPENED")]
    PaymentChannelOpened {
        /// Identifier of the emitting node.
        node_id: String,
        /// The counterparty peer.
        peer_id: String,
        /// The opened channel.
        channel_id: ChannelId,
        /// The escrowed token.
        token_address: Address,
        /// The local party's initial deposit.
        deposit: U256,
    },
    /// The local side of a channel advanced to a new signed proof.
    #[serde(rename = "PAYMENT_CHANNEL_BALANCE_UPDATE")]
    PaymentChannelBalanceUpdate {
        /// Identifier of the emitting node.
        node_id: String,
        /// The channel that advanced.
        channel_id: ChannelId,
        /// Nonce of the latest proof.
        nonce: u64,
        /// Cumulative transferred amount of the latest proof.
        transferred: U256,
    },
    /// A proof was submitted on-chain (non-cooperative path).
    #[serde(rename = "PAYMENT_CHANNEL_SETTLED")]
    PaymentChannelSettled {
        /// Identifier of the emitting node.
        node_id: String,
        /// The channel that was settled on-chain.
        channel_id: ChannelId,
        /// Hash of the settlement transaction.
        tx_hash: TxHash,
    },
}
