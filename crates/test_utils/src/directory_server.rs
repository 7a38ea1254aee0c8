// Path: crates/test_utils/src/directory_server.rs

//! An in-process implementation of the discovery directory HTTP API, used to
//! test the discovery service end to end without external infrastructure.

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use m2m_types::peer::{AnnounceResponse, DiscoveredPeer, PeerInfo, PeerListResponse};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

#[derive(Default)]
struct Directory {
    peers: HashMap<String, DiscoveredPeer>,
    announces: Vec<PeerInfo>,
    deregistered: Vec<String>,
}

/// Handle to a running in-process directory endpoint.
pub struct DirectoryServer {
    addr: SocketAddr,
    state: Arc<Mutex<Directory>>,
    handle: JoinHandle<()>,
}

impl DirectoryServer {
    /// Binds an ephemeral port and serves the directory API.
    pub async fn spawn() -> Self {
        let state = Arc::new(Mutex::new(Directory::default()));
        let app = Router::new()
            .route("/api/v1/peers/announce", post(announce))
            .route("/api/v1/peers", get(list))
            .route("/api/v1/peers/:node_id", delete(deregister))
            .with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind directory server");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            addr,
            state,
            handle,
        }
    }

    /// Base URL of the endpoint, e.g. `http://127.0.0.1:PORT`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Seeds the directory with a peer record as-is (including `last_seen`).
    pub fn insert_peer(&self, peer: DiscoveredPeer) {
        let mut dir = self.state.lock().unwrap_or_else(|e| e.into_inner());
        dir.peers.insert(peer.info.node_id.clone(), peer);
    }

    /// Drops a peer record, as if its announcements expired server-side.
    pub fn remove_peer(&self, node_id: &str) {
        let mut dir = self.state.lock().unwrap_or_else(|e| e.into_inner());
        dir.peers.remove(node_id);
    }

    /// Every announce body received, in arrival order.
    pub fn announces(&self) -> Vec<PeerInfo> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .announces
            .clone()
    }

    /// Node ids deregistered via DELETE, in arrival order.
    pub fn deregistered(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .deregistered
            .clone()
    }

    /// Current directory contents.
    pub fn peers(&self) -> Vec<DiscoveredPeer> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .peers
            .values()
            .cloned()
            .collect()
    }
}

impl Drop for DirectoryServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn announce(
    State(state): State<Arc<Mutex<Directory>>>,
    Json(info): Json<PeerInfo>,
) -> Json<AnnounceResponse> {
    let mut dir = state.lock().unwrap_or_else(|e| e.into_inner());
    dir.announces.push(info.clone());
    let node_id = info.node_id.clone();
    dir.peers.insert(
        node_id,
        DiscoveredPeer {
            info,
            last_seen: crate::now_ms(),
        },
    );
    Json(AnnounceResponse {
        success: true,
        ttl: Some(120),
        error: None,
    })
}

async fn list(State(state): State<Arc<Mutex<Directory>>>) -> Json<PeerListResponse> {
    let dir = state.lock().unwrap_or_else(|e| e.into_inner());
    Json(PeerListResponse {
        peers: dir.peers.values().cloned().collect(),
    })
}

async fn deregister(
    State(state): State<Arc<Mutex<Directory>>>,
    Path(node_id): Path<String>,
) -> Json<AnnounceResponse> {
    let mut dir = state.lock().unwrap_or_else(|e| e.into_inner());
    dir.peers.remove(&node_id);
    dir.deregistered.push(node_id);
    Json(AnnounceResponse {
        success: true,
        ttl: None,
        error: None,
    })
}
