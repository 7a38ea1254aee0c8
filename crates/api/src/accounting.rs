// Path: crates/api/src/accounting.rs

//! The accounting port: records committed settlements and exposes balances.
//!
//! The production store (TigerBeetle-backed) is an external collaborator
//! bound by [`AccountingStore`]. [`MemoryAccounting`] mirrors its contract
//! in-process for development and tests.

use async_trait::async_trait;
use alloy_primitives::U256;
use m2m_types::error::AccountingError;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// Credit/debit balances of one peer across all tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balances {
    /// Total amount the peer owes the local node.
    pub credit: U256,
    /// Total amount the local node owes the peer.
    pub debit: U256,
}

/// Persists settlement outcomes and answers balance queries.
#[async_trait]
pub trait AccountingStore: Send + Sync {
    /// Records that `amount` units of `token_id` have been settled with
    /// `peer_id`.
    ///
    /// When the caller supplies `nonce`, the record is idempotent by
    /// `(peer_id, token_id, nonce)`: replays are accepted and ignored.
    /// Without a nonce, monotonic increments are expected.
    async fn record_settlement(
        &self,
        peer_id: &str,
        token_id: &str,
        amount: U256,
        nonce: Option<u64>,
    ) -> Result<(), AccountingError>;

    /// Reads the peer's current balances.
    async fn balances(&self, peer_id: &str) -> Result<Balances, AccountingError>;
}

/// In-process implementation for development and tests.
#[derive(Debug, Default)]
pub struct MemoryAccounting {
    inner: Mutex<MemoryAccountingInner>,
}

#[derive(Debug, Default)]
struct MemoryAccountingInner {
    settled: HashMap<String, Balances>,
    // Replay guard for nonce-carrying records.
    seen: HashSet<(String, String, u64)>,
    records: Vec<SettlementRecord>,
}

/// One committed settlement, retained for inspection in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRecord {
    /// The peer settled with.
    pub peer_id: String,
    /// The settled token.
    pub token_id: String,
    /// The settled increment.
    pub amount: U256,
    /// The proof nonce, when the caller supplied one.
    pub nonce: Option<u64>,
}

impl MemoryAccounting {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record committed so far, in commit order.
    pub async fn records(&self) -> Vec<SettlementRecord> {
        self.inner.lock().await.records.clone()
    }
}

#[async_trait]
impl AccountingStore for MemoryAccounting {
    async fn record_settlement(
        &self,
        peer_id: &str,
        token_id: &str,
        amount: U256,
        nonce: Option<u64>,
    ) -> Result<(), AccountingError> {
        let inner = &mut *self.inner.lock().await;
        if let Some(n) = nonce {
            let key = (peer_id.to_string(), token_id.to_string(), n);
            if !inner.seen.insert(key) {
                // Replay of an already-committed proof.
                return Ok(());
            }
        }
        let entry = inner.settled.entry(peer_id.to_string()).or_default();
        entry.debit = entry.debit.saturating_add(amount);
        inner.records.push(SettlementRecord {
            peer_id: peer_id.to_string(),
            token_id: token_id.to_string(),
            amount,
            nonce,
        });
        Ok(())
    }

    async fn balances(&self, peer_id: &str) -> Result<Balances, AccountingError> {
        Ok(self
            .inner
            .lock()
            .await
            .settled
            .get(peer_id)
            .copied()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_accumulate_debit() {
        let store = MemoryAccounting::new();
        store
            .record_settlement("p1", "ILP", U256::from(1000u64), Some(1))
            .await
            .unwrap();
        store
            .record_settlement("p1", "ILP", U256::from(300u64), Some(2))
            .await
            .unwrap();
        let balances = store.balances("p1").await.unwrap();
        assert_eq!(balances.debit, U256::from(1300u64));
        assert_eq!(store.records().await.len(), 2);
    }

    #[tokio::test]
    async fn nonce_replays_are_ignored() {
        let store = MemoryAccounting::new();
        for _ in 0..3 {
            store
                .record_settlement("p1", "ILP", U256::from(1000u64), Some(1))
                .await
                .unwrap();
        }
        assert_eq!(store.balances("p1").await.unwrap().debit, U256::from(1000u64));
        assert_eq!(store.records().await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_peer_has_zero_balances() {
        let store = MemoryAccounting::new();
        assert_eq!(store.balances("nobody").await.unwrap(), Balances::default());
    }
}
