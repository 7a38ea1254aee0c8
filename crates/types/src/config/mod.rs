// Path: crates/types/src/config/mod.rs

//! Shared configuration structures for core connector components.

use crate::error::{DiscoveryError, SettlementError};
use crate::peer::PeerInfo;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Identity the node announces about itself to discovery endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Globally unique node identifier.
    pub node_id: String,
    /// URL of the node's BTP transport endpoint.
    pub btp_endpoint: String,
    /// The node's ILP routing address.
    pub ilp_address: String,
    /// Capability tags to advertise.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Software version string.
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl NodeIdentity {
    /// Projects the identity into the announce record published to endpoints.
    pub fn to_peer_info(&self) -> PeerInfo {
        PeerInfo {
            node_id: self.node_id.clone(),
            btp_endpoint: self.btp_endpoint.clone(),
            ilp_address: self.ilp_address.clone(),
            capabilities: self.capabilities.clone(),
            version: self.version.clone(),
        }
    }
}

/// Configuration of the chain adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// URL of the JSON-RPC endpoint fronting the channel registry.
    pub rpc_url: String,
    /// EIP-155 chain id, bound into the proof digest.
    pub chain_id: u64,
    /// Address of the channel-registry contract (the digest's verifying contract).
    pub registry_address: Address,
    /// Blocks to wait before an opening transaction counts as confirmed.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// Deadline for a single RPC request, in milliseconds.
    #[serde(default = "default_rpc_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Transport-level retry budget of the adapter itself.
    #[serde(default = "default_chain_retry_attempts")]
    pub retry_attempts: u32,
    /// Delay between transport-level retries, in milliseconds.
    #[serde(default = "default_chain_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_confirmations() -> u64 {
    3
}
fn default_rpc_timeout_ms() -> u64 {
    10_000
}
fn default_chain_retry_attempts() -> u32 {
    3
}
fn default_chain_retry_delay_ms() -> u64 {
    500
}

/// Configuration of the settlement executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Master switch; a disabled executor rejects triggers.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// The ERC-20 token channels escrow.
    pub settlement_token_address: Address,
    /// Deposit placed when opening a new channel.
    pub default_initial_deposit: U256,
    /// Settlement timeout requested for new channels, in seconds.
    #[serde(default = "default_settlement_timeout_secs")]
    pub default_settlement_timeout_secs: u64,
    /// Settlement-level retry budget for transient failures. Must be >= 1.
    #[serde(default = "default_settlement_retry_attempts")]
    pub retry_attempts: u32,
    /// Delay between settlement-level retries, in milliseconds.
    #[serde(default = "default_settlement_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Triggers below this increment are dropped without settling.
    #[serde(default)]
    pub min_settlement_amount: U256,
    /// Maps a peer id to its on-chain counterparty address.
    #[serde(default)]
    pub peer_address_map: BTreeMap<String, Address>,
    /// Identifier of the local node, attached to telemetry.
    pub node_id: String,
    /// Key id passed to the signing backend for balance proofs.
    #[serde(default = "default_signing_key_id")]
    pub signing_key_id: String,
}

fn default_enabled() -> bool {
    true
}
fn default_settlement_timeout_secs() -> u64 {
    86_400
}
fn default_settlement_retry_attempts() -> u32 {
    3
}
fn default_settlement_retry_delay_ms() -> u64 {
    1_000
}
fn default_signing_key_id() -> String {
    "default".to_string()
}

impl SettlementConfig {
    /// Rejects configurations the executor cannot run with.
    pub fn validate(&self) -> Result<(), SettlementError> {
        if self.retry_attempts < 1 {
            return Err(SettlementError::ConfigInvalid(
                "retry_attempts must be at least 1".into(),
            ));
        }
        if self.node_id.is_empty() {
            return Err(SettlementError::ConfigInvalid("node_id is empty".into()));
        }
        Ok(())
    }
}

/// Configuration of the peer-discovery service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Master switch; a disabled service never leaves `Stopped`.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Base URLs of the discovery endpoints to announce to and poll.
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// Seconds between broadcast/cleanup rounds.
    #[serde(default = "default_broadcast_interval_secs")]
    pub broadcast_interval_secs: u64,
}

fn default_broadcast_interval_secs() -> u64 {
    60
}

impl DiscoveryConfig {
    /// Directory entries older than this are evicted.
    pub fn ttl_ms(&self) -> u64 {
        2 * self.broadcast_interval_secs * 1000
    }

    /// Rejects configurations the service cannot run with.
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.broadcast_interval_secs == 0 {
            return Err(DiscoveryError::ConfigInvalid(
                "broadcast_interval_secs must be non-zero".into(),
            ));
        }
        for ep in &self.endpoints {
            if !ep.starts_with("http://") && !ep.starts_with("https://") {
                return Err(DiscoveryError::ConfigInvalid(format!(
                    "endpoint '{}' is not an http(s) URL",
                    ep
                )));
            }
        }
        Ok(())
    }
}

/// Top-level configuration of a connector node, as loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// The node's announced identity.
    pub node: NodeIdentity,
    /// Chain adapter settings.
    pub chain: ChainConfig,
    /// Settlement executor settings.
    pub settlement: SettlementConfig,
    /// Peer discovery settings.
    #[serde(default = "default_discovery")]
    pub discovery: DiscoveryConfig,
}

fn default_discovery() -> DiscoveryConfig {
    DiscoveryConfig {
        enabled: true,
        endpoints: Vec::new(),
        broadcast_interval_secs: default_broadcast_interval_secs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [node]
        node_id = "node-a"
        btp_endpoint = "btp+wss://a.example/btp"
        ilp_address = "g.example.a"
        capabilities = ["settlement"]

        [chain]
        rpc_url = "http://127.0.0.1:8545"
        chain_id = 31337
        registry_address = "0x00000000000000000000000000000000000000aa"

        [settlement]
        settlement_token_address = "0x00000000000000000000000000000000000000bb"
        default_initial_deposit = "1000000"
        node_id = "node-a"
        [settlement.peer_address_map]
        "peer-1" = "0x00000000000000000000000000000000000000cc"

        [discovery]
        endpoints = ["http://disco.example:8474"]
        broadcast_interval_secs = 30
    "#;

    #[test]
    fn sample_config_parses_with_defaults() {
        let cfg: ConnectorConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.node.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(cfg.chain.confirmations, 3);
        assert_eq!(cfg.settlement.retry_attempts, 3);
        assert!(cfg.settlement.enabled);
        assert_eq!(cfg.settlement.min_settlement_amount, U256::ZERO);
        assert_eq!(cfg.discovery.ttl_ms(), 60_000);
        cfg.settlement.validate().unwrap();
        cfg.discovery.validate().unwrap();
    }

    #[test]
    fn zero_retry_budget_is_rejected() {
        let mut cfg: ConnectorConfig = toml::from_str(SAMPLE).unwrap();
        cfg.settlement.retry_attempts = 0;
        assert!(cfg.settlement.validate().is_err());
    }

    #[test]
    fn non_http_endpoint_is_rejected() {
        let mut cfg: ConnectorConfig = toml::from_str(SAMPLE).unwrap();
        cfg.discovery.endpoints.push("ftp://nope".into());
        assert!(cfg.discovery.validate().is_err());
    }
}
