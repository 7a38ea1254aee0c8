// Path: crates/api/src/lib.rs
#![forbid(unsafe_code)]

//! # m2m Connector Ports
//!
//! Capability interfaces that separate the connector core from its external
//! collaborators: signing backends, the EVM chain, the accounting store, and
//! the BTP transport. Concrete adapters live in their own crates (or behind
//! remote services); the core only ever sees these traits.

/// The accounting port: records committed settlements and exposes balances.
pub mod accounting;
/// The chain port: payment-channel operations over an EVM RPC.
pub mod chain;
/// The BTP connector capability used by peer discovery.
pub mod connector;
/// The signing port: sign / fetch-public-key / rotate over pluggable backends.
pub mod signer;

pub use accounting::{AccountingStore, Balances, MemoryAccounting};
pub use chain::ChainClient;
pub use connector::PeerConnector;
pub use signer::SignerBackend;
