// Path: crates/types/src/peer.rs

//! Peer-directory records exchanged with discovery endpoints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The announce record a node publishes about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    /// Globally unique identifier of the node.
    pub node_id: String,
    /// URL of the node's BTP transport endpoint.
    pub btp_endpoint: String,
    /// The node's ILP routing address.
    pub ilp_address: String,
    /// Capability tags the node advertises (e.g. `"settlement"`, `"routing"`).
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Software version string.
    pub version: String,
}

/// A directory entry for a remote peer, as returned by a discovery endpoint.
///
/// Soft-state: an entry is evicted once `now - last_seen` exceeds the
/// directory TTL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredPeer {
    /// The announced node record.
    #[serde(flatten)]
    pub info: PeerInfo,
    /// Milliseconds since epoch at which the endpoint last heard from the peer.
    pub last_seen: u64,
}

/// Response body of `POST /api/v1/peers/announce`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnounceResponse {
    /// Whether the endpoint accepted the announcement.
    pub success: bool,
    /// TTL in seconds the endpoint will retain the record, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Endpoint-side diagnostic on rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response body of `GET /api/v1/peers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerListResponse {
    /// All peers the endpoint currently knows about.
    pub peers: Vec<DiscoveredPeer>,
}
