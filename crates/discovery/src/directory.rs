// Path: crates/discovery/src/directory.rs

//! The soft-state peer directory and its bookkeeping.
//!
//! Owned exclusively by the discovery service; everything else reads
//! snapshots. Entries age out once their `last_seen` falls behind the TTL,
//! and eviction also clears the peer's connection-retry counter.

use m2m_types::peer::DiscoveredPeer;
use std::collections::{HashMap, HashSet};

/// What a merge did to the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergeOutcome {
    /// The peer was not in the directory before.
    New,
    /// The entry was replaced by a record with a newer `last_seen`.
    Updated,
    /// The incoming record was older than the stored one; nothing changed.
    Stale,
}

#[derive(Debug, Default)]
pub(crate) struct PeerDirectory {
    peers: HashMap<String, DiscoveredPeer>,
    connected: HashSet<String>,
    connection_retries: HashMap<String, u32>,
}

impl PeerDirectory {
    /// Merges one fetched record, keeping the entry with the newer `last_seen`.
    pub fn merge(&mut self, peer: DiscoveredPeer) -> MergeOutcome {
        match self.peers.get(&peer.info.node_id) {
            None => {
                self.peers.insert(peer.info.node_id.clone(), peer);
                MergeOutcome::New
            }
            Some(existing) if peer.last_seen > existing.last_seen => {
                self.peers.insert(peer.info.node_id.clone(), peer);
                MergeOutcome::Updated
            }
            Some(_) => MergeOutcome::Stale,
        }
    }

    /// Evicts every peer whose `last_seen` is older than `ttl_ms`, returning
    /// the evicted ids. Eviction clears connection state for the peer.
    pub fn evict_expired(&mut self, now_ms: u64, ttl_ms: u64) -> Vec<String> {
        let expired: Vec<String> = self
            .peers
            .iter()
            .filter(|(_, p)| now_ms.saturating_sub(p.last_seen) > ttl_ms)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.peers.remove(id);
            self.connected.remove(id);
            self.connection_retries.remove(id);
        }
        expired
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.peers.contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn snapshot(&self) -> Vec<DiscoveredPeer> {
        self.peers.values().cloned().collect()
    }

    /// Counts one connection attempt against the peer, returning the total.
    pub fn record_attempt(&mut self, node_id: &str) -> u32 {
        let count = self.connection_retries.entry(node_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Marks the peer connected and forgets its attempt counter.
    pub fn mark_connected(&mut self, node_id: &str) {
        self.connected.insert(node_id.to_string());
        self.connection_retries.remove(node_id);
    }

    pub fn connected_snapshot(&self) -> HashSet<String> {
        self.connected.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use m2m_types::peer::PeerInfo;

    fn peer(node_id: &str, last_seen: u64) -> DiscoveredPeer {
        DiscoveredPeer {
            info: PeerInfo {
                node_id: node_id.to_string(),
                btp_endpoint: format!("btp+wss://{}.example/btp", node_id),
                ilp_address: format!("g.example.{}", node_id),
                capabilities: Default::default(),
                version: "1.0.0".to_string(),
            },
            last_seen,
        }
    }

    #[test]
    fn merge_keeps_the_newer_record() {
        let mut dir = PeerDirectory::default();
        assert_eq!(dir.merge(peer("q", 100)), MergeOutcome::New);
        assert_eq!(dir.merge(peer("q", 200)), MergeOutcome::Updated);
        assert_eq!(dir.merge(peer("q", 150)), MergeOutcome::Stale);
        assert_eq!(dir.snapshot()[0].last_seen, 200);
    }

    #[test]
    fn eviction_honors_the_ttl_boundary() {
        let broadcast_interval_secs: u64 = 60;
        let ttl_ms = 2 * broadcast_interval_secs * 1000;
        let mut dir = PeerDirectory::default();
        dir.merge(peer("q", 200));

        // Exactly at the TTL the peer survives; one millisecond later it is gone.
        assert!(dir.evict_expired(200 + ttl_ms, ttl_ms).is_empty());
        let evicted = dir.evict_expired(200 + ttl_ms + 1, ttl_ms);
        assert_eq!(evicted, vec!["q".to_string()]);
        assert!(!dir.contains("q"));
    }

    #[test]
    fn eviction_clears_connection_state() {
        let mut dir = PeerDirectory::default();
        dir.merge(peer("q", 1000));
        dir.record_attempt("q");
        dir.record_attempt("q");
        dir.mark_connected("q");

        dir.evict_expired(1_000_000, 10);
        assert!(!dir.contains("q"));
        assert!(dir.connected_snapshot().is_empty());
        // A re-discovered peer starts from a fresh attempt counter.
        dir.merge(peer("q", 2_000_000));
        assert_eq!(dir.record_attempt("q"), 1);
    }

    #[test]
    fn connection_success_resets_the_counter() {
        let mut dir = PeerDirectory::default();
        dir.merge(peer("q", 1000));
        assert_eq!(dir.record_attempt("q"), 1);
        assert_eq!(dir.record_attempt("q"), 2);
        dir.mark_connected("q");
        assert!(dir.connected_snapshot().contains("q"));
        assert_eq!(dir.record_attempt("q"), 1);
    }
}
