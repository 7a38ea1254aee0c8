// Path: crates/settlement/src/state.rs

//! State owned exclusively by the settlement executor.
//!
//! Nothing outside this crate mutates these maps; other components read
//! through the executor's snapshotting getters.

use m2m_types::channel::{BalanceProof, ChannelId, ChannelState};
use std::collections::HashMap;

/// The executor's in-memory books.
#[derive(Debug, Default)]
pub(crate) struct ExecutorState {
    /// One channel per (peer, settlement token). Keyed by peer id since the
    /// executor settles a single configured token.
    pub channels: HashMap<String, ChannelId>,
    /// Locally cached view of each channel, refreshed from chain on demand.
    pub channel_states: HashMap<ChannelId, ChannelState>,
    /// Append-only log of every proof this node has signed, per channel.
    /// Kept for recovery and audit; never truncated within a session.
    pub proof_log: HashMap<ChannelId, Vec<BalanceProof>>,
}

impl ExecutorState {
    /// Appends a signed proof and advances the channel's own side.
    ///
    /// The caller computes the proof from the cached state under the same
    /// lock, so the sequencing invariants hold by construction; they are
    /// asserted here to catch executor bugs early.
    pub fn commit_proof(&mut self, proof: BalanceProof) {
        if let Some(state) = self.channel_states.get_mut(&proof.channel_id) {
            debug_assert_eq!(proof.nonce, state.my_nonce + 1, "nonce must be gapless");
            debug_assert!(
                proof.transferred_amount >= state.my_transferred,
                "transferred amount must not decrease"
            );
            state.my_nonce = proof.nonce;
            state.my_transferred = proof.transferred_amount;
        }
        self.proof_log
            .entry(proof.channel_id)
            .or_default()
            .push(proof);
    }
}

/// A read-only copy of one channel's books, handed out to observers.
#[derive(Debug, Clone)]
pub struct ChannelSnapshot {
    /// The cached channel state at snapshot time.
    pub state: ChannelState,
    /// Every proof signed on this channel so far, oldest first.
    pub proofs: Vec<BalanceProof>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256, U256};

    fn proof(channel: ChannelId, nonce: u64, transferred: u64) -> BalanceProof {
        BalanceProof {
            channel_id: channel,
            nonce,
            transferred_amount: U256::from(transferred),
            token_address: Address::repeat_byte(0xBB),
            signature: vec![0; 65],
        }
    }

    #[test]
    fn commit_advances_own_side() {
        let channel = B256::repeat_byte(1);
        let mut state = ExecutorState::default();
        state.channel_states.insert(
            channel,
            ChannelState::opened(
                channel,
                Address::repeat_byte(2),
                Address::repeat_byte(3),
                Address::repeat_byte(0xBB),
                U256::from(500u64),
                3600,
            ),
        );

        state.commit_proof(proof(channel, 1, 1000));
        state.commit_proof(proof(channel, 2, 1300));

        let cached = &state.channel_states[&channel];
        assert_eq!(cached.my_nonce, 2);
        assert_eq!(cached.my_transferred, U256::from(1300u64));
        let log = &state.proof_log[&channel];
        assert_eq!(log.len(), 2);
        assert!(log.windows(2).all(|w| w[0].nonce < w[1].nonce
            && w[0].transferred_amount <= w[1].transferred_amount));
    }
}
