// Path: crates/api/src/connector.rs

//! The BTP connector capability consumed by peer discovery.
//!
//! Discovery does not own a transport. When it learns about a new peer it
//! hands the record to an optional [`PeerConnector`] registered after
//! construction; the connector decides whether and how to dial.

use async_trait::async_trait;
use m2m_types::error::DiscoveryError;
use m2m_types::peer::DiscoveredPeer;

/// Establishes transport-level connections to newly discovered peers.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Attempts to connect to `peer` at its announced BTP endpoint.
    async fn connect(&self, peer: &DiscoveredPeer) -> Result<(), DiscoveryError>;
}
