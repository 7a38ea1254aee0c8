// Path: crates/test_utils/src/lib.rs

//! # m2m Test Utilities
//!
//! Shared mocks for the connector's ports and an in-process discovery
//! directory server. Everything here is test-only plumbing; nothing ships
//! in a production binary.

/// An in-process HTTP implementation of the discovery directory API.
pub mod directory_server;
/// A scriptable in-memory [`m2m_api::ChainClient`].
pub mod mock_chain;
/// A scriptable in-memory [`m2m_api::SignerBackend`].
pub mod mock_signer;

pub use directory_server::DirectoryServer;
pub use mock_chain::MockChainClient;
pub use mock_signer::MockSigner;

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
