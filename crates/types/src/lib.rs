// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # m2m Connector Types
//!
//! This crate is the foundational library for the m2m connector, containing
//! all core data structures, error types, and configuration objects.
//!
//! ## Architectural Role
//!
//! As the base crate, `m2m-types` has minimal dependencies and is itself a
//! dependency for almost every other crate in the workspace. This structure
//! prevents circular dependencies and provides a stable, canonical definition
//! for shared types like `BalanceProof`, `ChannelState`, `DiscoveredPeer`,
//! and the various error enums.

/// The maximum length in bytes accepted for a variable-length octet string on the wire.
pub const MAX_OCTET_STRING_BYTES: usize = 32 * 1024; // 32 KiB
/// The maximum number of peers a single directory fetch may return before the rest is ignored.
pub const MAX_PEERS_PER_FETCH: usize = 1024;

/// A top-level, crate-wide `Result` type alias with a default error type.
pub type Result<T, E = crate::error::CoreError> = std::result::Result<T, E>;

/// Payment channel state, balance proofs, and the signed-proof log entry type.
pub mod channel;
/// Shared configuration structures for the connector components.
pub mod config;
/// A unified set of all error types used across the workspace.
pub mod error;
/// Balance-monitor triggers and the telemetry event union emitted by the executor.
pub mod event;
/// Peer-directory records exchanged with discovery endpoints.
pub mod peer;
