// Path: crates/discovery/src/lib.rs
#![forbid(unsafe_code)]

//! # m2m Peer Discovery
//!
//! Periodic announce/poll loop over a set of discovery endpoints. The
//! service broadcasts the local node's record, merges the peers each
//! endpoint returns into a soft-state directory with TTL eviction, and hands
//! newly discovered peers to an optional BTP connector capability with a
//! bounded number of connection attempts per peer.
//!
//! Endpoint failures are isolated: a dead endpoint is logged and skipped
//! while the rest of the round proceeds. Nothing here ever halts the loop.

mod client;
mod directory;

use client::DirectoryClient;
use directory::{MergeOutcome, PeerDirectory};
use futures::future::join_all;
use m2m_api::PeerConnector;
use m2m_telemetry::discovery_metrics;
use m2m_types::config::{DiscoveryConfig, NodeIdentity};
use m2m_types::error::DiscoveryError;
use m2m_types::peer::DiscoveredPeer;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration};

/// Ceiling on connection attempts per peer per directory lifetime.
pub const MAX_CONNECTION_RETRIES: u32 = 3;
/// Spacing between connection attempts towards one peer.
pub const CONNECTION_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Lifecycle of the discovery service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Not running; `start` may be called.
    Stopped,
    /// `start` is bringing the timers up.
    Starting,
    /// Timers are live.
    Running,
    /// `stop` is tearing the timers down and deregistering.
    Stopping,
}

/// The periodic announce / fetch / cleanup service.
pub struct DiscoveryService {
    inner: Arc<Inner>,
}

struct Inner {
    cfg: DiscoveryConfig,
    identity: NodeIdentity,
    client: DirectoryClient,
    directory: Mutex<PeerDirectory>,
    connector: Mutex<Option<Arc<dyn PeerConnector>>>,
    status: Mutex<Status>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    connection_retry_delay: Duration,
}

impl DiscoveryService {
    /// Builds the service. Fails on invalid configuration.
    pub fn new(cfg: DiscoveryConfig, identity: NodeIdentity) -> Result<Self, DiscoveryError> {
        Self::with_retry_delay(cfg, identity, CONNECTION_RETRY_DELAY)
    }

    fn with_retry_delay(
        cfg: DiscoveryConfig,
        identity: NodeIdentity,
        connection_retry_delay: Duration,
    ) -> Result<Self, DiscoveryError> {
        cfg.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                cfg,
                identity,
                client: DirectoryClient::new()?,
                directory: Mutex::new(PeerDirectory::default()),
                connector: Mutex::new(None),
                status: Mutex::new(Status::Stopped),
                tasks: Mutex::new(Vec::new()),
                connection_retry_delay,
            }),
        })
    }

    /// Registers the BTP connector used to dial newly discovered peers.
    /// May be called at any time; discovery works without one.
    pub async fn set_connector(&self, connector: Arc<dyn PeerConnector>) {
        *self.inner.connector.lock().await = Some(connector);
    }

    /// Starts the broadcast and cleanup timers.
    ///
    /// Idempotent: calling `start` while not stopped logs a warning and
    /// returns. With discovery disabled or no endpoints configured, `start`
    /// returns immediately and the service stays stopped.
    pub async fn start(&self) {
        if !self.inner.cfg.enabled || self.inner.cfg.endpoints.is_empty() {
            tracing::info!(
                target: "discovery",
                enabled = self.inner.cfg.enabled,
                endpoints = self.inner.cfg.endpoints.len(),
                "discovery not configured, staying stopped"
            );
            return;
        }
        {
            let mut status = self.inner.status.lock().await;
            if *status != Status::Stopped {
                let current = *status;
                tracing::warn!(target: "discovery", status = ?current, "start ignored: not stopped");
                return;
            }
            *status = Status::Starting;
        }

        let period = Duration::from_secs(self.inner.cfg.broadcast_interval_secs);

        let broadcaster = Arc::clone(&self.inner);
        let broadcast_task = tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                Inner::broadcast_round(&broadcaster).await;
            }
        });

        let cleaner = Arc::clone(&self.inner);
        let cleanup_task = tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                cleaner.cleanup_round().await;
            }
        });

        {
            let mut tasks = self.inner.tasks.lock().await;
            tasks.push(broadcast_task);
            tasks.push(cleanup_task);
        }
        *self.inner.status.lock().await = Status::Running;
        tracing::info!(
            target: "discovery",
            node_id = %self.inner.identity.node_id,
            endpoints = self.inner.cfg.endpoints.len(),
            interval_secs = self.inner.cfg.broadcast_interval_secs,
            "discovery started"
        );
    }

    /// Cancels the timers and deregisters from every endpoint, best-effort.
    pub async fn stop(&self) {
        {
            let mut status = self.inner.status.lock().await;
            if *status != Status::Running && *status != Status::Starting {
                return;
            }
            *status = Status::Stopping;
        }

        let mut tasks = self.inner.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }
        drop(tasks);

        let node_id = self.inner.identity.node_id.clone();
        let deregisters = self.inner.cfg.endpoints.iter().map(|endpoint| {
            let endpoint = endpoint.as_str();
            let client = &self.inner.client;
            let node_id = node_id.clone();
            async move {
                if let Err(err) = client.deregister(endpoint, &node_id).await {
                    tracing::debug!(target: "discovery", endpoint, error = %err, "deregister failed");
                }
            }
        });
        join_all(deregisters).await;

        *self.inner.status.lock().await = Status::Stopped;
        tracing::info!(target: "discovery", "discovery stopped");
    }

    /// The service's current lifecycle state.
    pub async fn status(&self) -> Status {
        *self.inner.status.lock().await
    }

    /// Snapshot of the peer directory.
    pub async fn peers(&self) -> Vec<DiscoveredPeer> {
        self.inner.directory.lock().await.snapshot()
    }

    /// Snapshot of the peers a connector has successfully dialed.
    pub async fn connected_peers(&self) -> HashSet<String> {
        self.inner.directory.lock().await.connected_snapshot()
    }
}

impl Inner {
    /// One broadcast round: announce-then-fetch against every endpoint,
    /// concurrently across endpoints, sequentially per endpoint.
    async fn broadcast_round(inner: &Arc<Inner>) {
        let info = inner.identity.to_peer_info();
        let rounds = inner.cfg.endpoints.iter().map(|endpoint| {
            let endpoint = endpoint.as_str();
            let info = info.clone();
            let inner = Arc::clone(inner);
            async move {
                match inner.client.announce(endpoint, &info).await {
                    Ok(resp) if !resp.success => {
                        tracing::warn!(
                            target: "discovery",
                            endpoint,
                            error = resp.error.as_deref().unwrap_or("unspecified"),
                            "announce rejected"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => {
                        discovery_metrics().inc_announce_failures(endpoint);
                        tracing::warn!(target: "discovery", endpoint, error = %err, "announce failed");
                        // Without a successful announce the fetch would race
                        // our own registration; skip this endpoint for now.
                        return;
                    }
                }
                match inner.client.fetch(endpoint).await {
                    Ok(peers) => Inner::merge_peers(&inner, peers).await,
                    Err(err) => {
                        discovery_metrics().inc_announce_failures(endpoint);
                        tracing::warn!(target: "discovery", endpoint, error = %err, "peer fetch failed");
                    }
                }
            }
        });
        join_all(rounds).await;
    }

    /// Folds fetched records into the directory and dials new peers.
    async fn merge_peers(inner: &Arc<Inner>, peers: Vec<DiscoveredPeer>) {
        let mut fresh = Vec::new();
        {
            let mut directory = inner.directory.lock().await;
            for peer in peers {
                if peer.info.node_id == inner.identity.node_id {
                    continue;
                }
                if directory.merge(peer.clone()) == MergeOutcome::New {
                    tracing::debug!(
                        target: "discovery",
                        node_id = %peer.info.node_id,
                        btp_endpoint = %peer.info.btp_endpoint,
                        "discovered peer"
                    );
                    fresh.push(peer);
                }
            }
            discovery_metrics().set_directory_size(directory.len() as u64);
        }
        for peer in fresh {
            let worker = Arc::clone(inner);
            let handle = tokio::spawn(async move {
                worker.connect_with_retries(peer).await;
            });
            inner.tasks.lock().await.push(handle);
        }
    }

    /// Evicts peers whose `last_seen` fell behind the TTL.
    async fn cleanup_round(&self) {
        let now = now_ms();
        let ttl = self.cfg.ttl_ms();
        let mut directory = self.directory.lock().await;
        let evicted = directory.evict_expired(now, ttl);
        if !evicted.is_empty() {
            discovery_metrics().inc_peers_evicted(evicted.len() as u64);
            discovery_metrics().set_directory_size(directory.len() as u64);
            tracing::debug!(target: "discovery", count = evicted.len(), ?evicted, "evicted stale peers");
        }
    }

    /// Dials a newly discovered peer, retrying a bounded number of times.
    /// Attempts stop early when the peer leaves the directory.
    async fn connect_with_retries(&self, peer: DiscoveredPeer) {
        let node_id = peer.info.node_id.clone();
        loop {
            let Some(connector) = self.connector.lock().await.clone() else {
                return;
            };
            let attempt = {
                let mut directory = self.directory.lock().await;
                if !directory.contains(&node_id) {
                    return;
                }
                directory.record_attempt(&node_id)
            };
            discovery_metrics().inc_connection_attempts();
            match connector.connect(&peer).await {
                Ok(()) => {
                    self.directory.lock().await.mark_connected(&node_id);
                    tracing::info!(target: "discovery", %node_id, "peer connected");
                    return;
                }
                Err(err) => {
                    if attempt >= MAX_CONNECTION_RETRIES {
                        tracing::warn!(
                            target: "discovery",
                            %node_id,
                            attempts = attempt,
                            error = %err,
                            "giving up on peer connection"
                        );
                        return;
                    }
                    tracing::debug!(
                        target: "discovery",
                        %node_id,
                        attempt,
                        error = %err,
                        "peer connection failed, will retry"
                    );
                    sleep(self.connection_retry_delay).await;
                }
            }
        }
    }
}

/// Current wall-clock time in milliseconds since the epoch.
fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use m2m_types::peer::PeerInfo;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn identity() -> NodeIdentity {
        NodeIdentity {
            node_id: "node-self".to_string(),
            btp_endpoint: "btp+wss://self.example/btp".to_string(),
            ilp_address: "g.example.self".to_string(),
            capabilities: Default::default(),
            version: "1.0.0".to_string(),
        }
    }

    fn config() -> DiscoveryConfig {
        DiscoveryConfig {
            enabled: true,
            endpoints: vec!["http://disco.example".to_string()],
            broadcast_interval_secs: 60,
        }
    }

    fn peer(node_id: &str) -> DiscoveredPeer {
        DiscoveredPeer {
            info: PeerInfo {
                node_id: node_id.to_string(),
                btp_endpoint: format!("btp+wss://{}.example/btp", node_id),
                ilp_address: format!("g.example.{}", node_id),
                capabilities: Default::default(),
                version: "1.0.0".to_string(),
            },
            last_seen: now_ms(),
        }
    }

    /// Connector scripted to fail; counts attempts.
    #[derive(Debug, Default)]
    struct FlakyConnector {
        attempts: AtomicU32,
        succeed: AtomicBool,
    }

    #[async_trait]
    impl PeerConnector for FlakyConnector {
        async fn connect(&self, _peer: &DiscoveredPeer) -> Result<(), DiscoveryError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.succeed.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(DiscoveryError::Network("refused".into()))
            }
        }
    }

    #[tokio::test]
    async fn connection_attempts_are_bounded() {
        let service =
            DiscoveryService::with_retry_delay(config(), identity(), Duration::from_millis(5))
                .unwrap();
        let connector = Arc::new(FlakyConnector::default());
        service.set_connector(connector.clone()).await;

        Inner::merge_peers(&service.inner, vec![peer("stubborn")]).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(connector.attempts.load(Ordering::SeqCst), MAX_CONNECTION_RETRIES);
        assert!(service.connected_peers().await.is_empty());
    }

    #[tokio::test]
    async fn successful_connection_marks_the_peer() {
        let service =
            DiscoveryService::with_retry_delay(config(), identity(), Duration::from_millis(5))
                .unwrap();
        let connector = Arc::new(FlakyConnector::default());
        connector.succeed.store(true, Ordering::SeqCst);
        service.set_connector(connector.clone()).await;

        Inner::merge_peers(&service.inner, vec![peer("friendly")]).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert!(service.connected_peers().await.contains("friendly"));
    }

    #[tokio::test]
    async fn eviction_stops_pending_retries() {
        let service =
            DiscoveryService::with_retry_delay(config(), identity(), Duration::from_millis(30))
                .unwrap();
        let connector = Arc::new(FlakyConnector::default());
        service.set_connector(connector.clone()).await;

        Inner::merge_peers(&service.inner, vec![peer("vanishing")]).await;
        // Let the first attempt fail, then evict the peer before the retry.
        tokio::time::sleep(Duration::from_millis(10)).await;
        service
            .inner
            .directory
            .lock()
            .await
            .evict_expired(u64::MAX, 0);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn own_announcements_are_not_merged() {
        let service = DiscoveryService::new(config(), identity()).unwrap();
        Inner::merge_peers(&service.inner, vec![peer("node-self")]).await;
        assert!(service.peers().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_discovery_does_not_redial() {
        let service =
            DiscoveryService::with_retry_delay(config(), identity(), Duration::from_millis(5))
                .unwrap();
        let connector = Arc::new(FlakyConnector::default());
        connector.succeed.store(true, Ordering::SeqCst);
        service.set_connector(connector.clone()).await;

        let mut record = peer("q");
        Inner::merge_peers(&service.inner, vec![record.clone()]).await;
        record.last_seen += 1;
        Inner::merge_peers(&service.inner, vec![record]).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Merging a fresher record for a known peer is an update, not a
        // discovery; only the first merge dialed.
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }
}
