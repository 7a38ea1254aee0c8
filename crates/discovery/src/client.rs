// Path: crates/discovery/src/client.rs

//! HTTP client for the discovery directory API.
//!
//! One client instance talks to every configured endpoint. Announce and
//! fetch carry a 5 second deadline; deregister, fired during shutdown, gets
//! only 2 seconds so a dead endpoint cannot hold up the stop sequence.

use m2m_types::error::DiscoveryError;
use m2m_types::peer::{AnnounceResponse, DiscoveredPeer, PeerInfo, PeerListResponse};
use m2m_types::MAX_PEERS_PER_FETCH;
use reqwest::header::ACCEPT;
use reqwest::Client;
use tokio::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const DEREGISTER_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) struct DirectoryClient {
    client: Client,
}

impl DirectoryClient {
    pub fn new() -> Result<Self, DiscoveryError> {
        let client = Client::builder()
            .build()
            .map_err(|e| DiscoveryError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// POSTs the local node's record to `{endpoint}/api/v1/peers/announce`.
    pub async fn announce(
        &self,
        endpoint: &str,
        info: &PeerInfo,
    ) -> Result<AnnounceResponse, DiscoveryError> {
        let url = join_path(endpoint, &["api", "v1", "peers", "announce"])?;
        let response = self
            .client
            .post(url)
            .timeout(REQUEST_TIMEOUT)
            .header(ACCEPT, "application/json")
            .json(info)
            .send()
            .await
            .map_err(|e| DiscoveryError::Network(format!("announce to {}: {}", endpoint, e)))?
            .error_for_status()
            .map_err(|e| DiscoveryError::Network(format!("announce to {}: {}", endpoint, e)))?;
        response
            .json()
            .await
            .map_err(|e| DiscoveryError::Network(format!("announce body from {}: {}", endpoint, e)))
    }

    /// GETs the endpoint's current peer list.
    pub async fn fetch(&self, endpoint: &str) -> Result<Vec<DiscoveredPeer>, DiscoveryError> {
        let url = join_path(endpoint, &["api", "v1", "peers"])?;
        let response = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| DiscoveryError::Network(format!("fetch from {}: {}", endpoint, e)))?
            .error_for_status()
            .map_err(|e| DiscoveryError::Network(format!("fetch from {}: {}", endpoint, e)))?;
        let mut body: PeerListResponse = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Network(format!("peer list from {}: {}", endpoint, e)))?;
        if body.peers.len() > MAX_PEERS_PER_FETCH {
            tracing::warn!(
                target: "discovery",
                endpoint,
                returned = body.peers.len(),
                "endpoint returned more peers than the cap, truncating"
            );
            body.peers.truncate(MAX_PEERS_PER_FETCH);
        }
        Ok(body.peers)
    }

    /// Best-effort DELETE of the local node's record on shutdown.
    pub async fn deregister(&self, endpoint: &str, node_id: &str) -> Result<(), DiscoveryError> {
        let url = join_path(endpoint, &["api", "v1", "peers", node_id])?;
        self.client
            .delete(url)
            .timeout(DEREGISTER_TIMEOUT)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| DiscoveryError::Network(format!("deregister at {}: {}", endpoint, e)))?
            .error_for_status()
            .map_err(|e| DiscoveryError::Network(format!("deregister at {}: {}", endpoint, e)))?;
        Ok(())
    }
}

/// Appends percent-encoded path segments to an endpoint base URL.
fn join_path(endpoint: &str, segments: &[&str]) -> Result<url::Url, DiscoveryError> {
    let mut url = url::Url::parse(endpoint)
        .map_err(|e| DiscoveryError::ConfigInvalid(format!("endpoint '{}': {}", endpoint, e)))?;
    url.path_segments_mut()
        .map_err(|_| DiscoveryError::ConfigInvalid(format!("endpoint '{}' cannot be a base", endpoint)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_path_encodes_segments() {
        let url = join_path("http://disco.example:8474", &["api", "v1", "peers", "node/a b"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://disco.example:8474/api/v1/peers/node%2Fa%20b"
        );
        // A trailing slash on the base does not double up.
        let url = join_path("http://disco.example/", &["api", "v1", "peers"]).unwrap();
        assert_eq!(url.as_str(), "http://disco.example/api/v1/peers");
    }
}
