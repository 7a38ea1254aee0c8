// Path: crates/types/src/error/mod.rs
//! Core error types for the m2m connector.

use crate::channel::ChannelId;
use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors produced by the OER wire codec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// A read ran past the end of the buffer.
    #[error("Buffer underflow at offset {offset}: needed {needed} bytes, {available} available")]
    Underflow {
        /// The offset the read started from.
        offset: usize,
        /// Bytes required to complete the read.
        needed: usize,
        /// Bytes actually remaining from the offset.
        available: usize,
    },
    /// A value does not fit the requested encoding, or a length prefix is invalid.
    #[error("Value out of range: {0}")]
    OutOfRange(String),
}

impl ErrorCode for CodecError {
    fn code(&self) -> &'static str {
        match self {
            Self::Underflow { .. } => "CODEC_UNDERFLOW",
            Self::OutOfRange(_) => "CODEC_OUT_OF_RANGE",
        }
    }
}

/// Errors surfaced by a signing backend.
#[derive(Debug, Error)]
pub enum SigningError {
    /// The backend could not be reached; the operation may succeed on retry.
    #[error("Signing backend unavailable: {0}")]
    BackendUnavailable(String),
    /// The caller is not allowed to use the requested key.
    #[error("Permission denied for key '{0}'")]
    PermissionDenied(String),
    /// The backend returned an empty signature or key.
    #[error("Signing backend returned an empty result for key '{0}'")]
    EmptyResult(String),
    /// Passthrough of a remote diagnostic the port cannot classify further.
    #[error("Signing backend error: {0}")]
    Backend(String),
}

impl SigningError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

impl ErrorCode for SigningError {
    fn code(&self) -> &'static str {
        match self {
            Self::BackendUnavailable(_) => "SIGNING_BACKEND_UNAVAILABLE",
            Self::PermissionDenied(_) => "SIGNING_PERMISSION_DENIED",
            Self::EmptyResult(_) => "SIGNING_EMPTY_RESULT",
            Self::Backend(_) => "SIGNING_BACKEND_ERROR",
        }
    }
}

/// Errors surfaced by the chain adapter.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport or RPC-level failure; the operation may succeed on retry.
    #[error("Chain RPC error: {0}")]
    Rpc(String),
    /// The RPC did not answer within the adapter's deadline.
    #[error("Chain RPC timed out: {0}")]
    Timeout(String),
    /// The transaction was mined but reverted.
    #[error("Transaction reverted: {0}")]
    Reverted(String),
    /// The funding account cannot cover the deposit plus gas.
    #[error("Insufficient funds for deposit")]
    InsufficientFunds,
    /// The submitted nonce collides with a proof already on-chain.
    #[error("Proof nonce conflict: chain already holds nonce {on_chain}")]
    NonceConflict {
        /// The highest nonce the chain has accepted for this channel and party.
        on_chain: u64,
    },
}

impl ChainError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::Timeout(_))
    }
}

impl ErrorCode for ChainError {
    fn code(&self) -> &'static str {
        match self {
            Self::Rpc(_) => "CHAIN_RPC_ERROR",
            Self::Timeout(_) => "CHAIN_TIMEOUT",
            Self::Reverted(_) => "CHAIN_REVERTED",
            Self::InsufficientFunds => "CHAIN_INSUFFICIENT_FUNDS",
            Self::NonceConflict { .. } => "CHAIN_NONCE_CONFLICT",
        }
    }
}

/// Errors surfaced by the accounting store.
#[derive(Debug, Error)]
pub enum AccountingError {
    /// The store could not be reached; the operation may succeed on retry.
    #[error("Accounting store unavailable: {0}")]
    Unavailable(String),
    /// The store rejected the record.
    #[error("Accounting store error: {0}")]
    Store(String),
}

impl AccountingError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl ErrorCode for AccountingError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "ACCOUNTING_UNAVAILABLE",
            Self::Store(_) => "ACCOUNTING_STORE_ERROR",
        }
    }
}

/// Errors surfaced by the settlement executor.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// The peer has no entry in the on-chain address map.
    #[error("No on-chain address configured for peer '{0}'")]
    UnknownPeer(String),
    /// Settlement is disabled by configuration.
    #[error("Settlement is disabled")]
    Disabled,
    /// The executor configuration is invalid.
    #[error("Invalid settlement configuration: {0}")]
    ConfigInvalid(String),
    /// A signing-port failure.
    #[error("Signing failed: {0}")]
    Signing(#[from] SigningError),
    /// A chain-port failure.
    #[error("Chain operation failed: {0}")]
    Chain(#[from] ChainError),
    /// An accounting-port failure.
    #[error("Accounting failed: {0}")]
    Accounting(#[from] AccountingError),
}

impl SettlementError {
    /// Whether the executor's retry policy applies to this error.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Signing(e) => e.is_transient(),
            Self::Chain(e) => e.is_transient() || matches!(e, ChainError::NonceConflict { .. }),
            Self::Accounting(e) => e.is_transient(),
            Self::UnknownPeer(_) | Self::Disabled | Self::ConfigInvalid(_) => false,
        }
    }
}

impl ErrorCode for SettlementError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownPeer(_) => "SETTLEMENT_UNKNOWN_PEER",
            Self::Disabled => "SETTLEMENT_DISABLED",
            Self::ConfigInvalid(_) => "SETTLEMENT_CONFIG_INVALID",
            Self::Signing(e) => e.code(),
            Self::Chain(e) => e.code(),
            Self::Accounting(e) => e.code(),
        }
    }
}

/// Errors surfaced by the peer-discovery service.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Discovery is disabled by configuration.
    #[error("Discovery is disabled")]
    Disabled,
    /// The discovery configuration is invalid.
    #[error("Invalid discovery configuration: {0}")]
    ConfigInvalid(String),
    /// An HTTP request to a discovery endpoint failed.
    #[error("Discovery network error: {0}")]
    Network(String),
}

impl ErrorCode for DiscoveryError {
    fn code(&self) -> &'static str {
        match self {
            Self::Disabled => "DISCOVERY_DISABLED",
            Self::ConfigInvalid(_) => "DISCOVERY_CONFIG_INVALID",
            Self::Network(_) => "DISCOVERY_NETWORK_ERROR",
        }
    }
}

/// The umbrella error for callers that compose several subsystems.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A wire-codec failure.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A signing-port failure.
    #[error(transparent)]
    Signing(#[from] SigningError),
    /// A chain-port failure.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// An accounting-port failure.
    #[error(transparent)]
    Accounting(#[from] AccountingError),
    /// A settlement-executor failure.
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    /// A discovery-service failure.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

impl ErrorCode for CoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Codec(e) => e.code(),
            Self::Signing(e) => e.code(),
            Self::Chain(e) => e.code(),
            Self::Accounting(e) => e.code(),
            Self::Settlement(e) => e.code(),
            Self::Discovery(e) => e.code(),
        }
    }
}

/// Structured context attached to errors that cross a task boundary, so logs
/// and telemetry can attribute a failure without parsing message strings.
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    /// The owning component (e.g. `"settlement"`, `"discovery"`).
    pub component: &'static str,
    /// The operation that failed (e.g. `"open_channel"`).
    pub operation: &'static str,
    /// The peer involved, when applicable.
    pub peer_id: Option<String>,
    /// The channel involved, when applicable.
    pub channel_id: Option<ChannelId>,
    /// The attempt number on which the failure occurred (1-based).
    pub attempt: Option<u32>,
}

impl TaskContext {
    /// Context for a component-level operation with no peer in scope.
    pub fn new(component: &'static str, operation: &'static str) -> Self {
        Self {
            component,
            operation,
            ..Default::default()
        }
    }

    /// Attaches the peer the operation was acting for.
    pub fn peer(mut self, peer_id: &str) -> Self {
        self.peer_id = Some(peer_id.to_string());
        self
    }

    /// Attaches the channel the operation was acting on.
    pub fn channel(mut self, channel_id: ChannelId) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    /// Attaches the 1-based attempt number.
    pub fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }
}

impl std::fmt::Display for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.component, self.operation)?;
        if let Some(peer) = &self.peer_id {
            write!(f, " peer={}", peer)?;
        }
        if let Some(ch) = &self.channel_id {
            write!(f, " channel={}", ch)?;
        }
        if let Some(attempt) = self.attempt {
            write!(f, " attempt={}", attempt)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(SigningError::BackendUnavailable("down".into()).is_transient());
        assert!(!SigningError::PermissionDenied("k".into()).is_transient());

        assert!(ChainError::Rpc("blip".into()).is_transient());
        assert!(ChainError::Timeout("slow".into()).is_transient());
        assert!(!ChainError::Reverted("bad proof".into()).is_transient());

        let wrapped = SettlementError::from(ChainError::Reverted("x".into()));
        assert!(!wrapped.is_transient());
        let wrapped = SettlementError::from(ChainError::NonceConflict { on_chain: 4 });
        assert!(wrapped.is_transient());
        assert!(!SettlementError::UnknownPeer("p".into()).is_transient());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            CodecError::OutOfRange("x".into()).code(),
            "CODEC_OUT_OF_RANGE"
        );
        assert_eq!(
            SettlementError::UnknownPeer("p".into()).code(),
            "SETTLEMENT_UNKNOWN_PEER"
        );
        // Wrapped errors keep their leaf code so observers see the real cause.
        assert_eq!(
            SettlementError::from(ChainError::InsufficientFunds).code(),
            "CHAIN_INSUFFICIENT_FUNDS"
        );
    }

    #[test]
    fn task_context_display() {
        let ctx = TaskContext::new("settlement", "open_channel")
            .peer("peer-1")
            .attempt(2);
        let s = ctx.to_string();
        assert!(s.contains("settlement/open_channel"));
        assert!(s.contains("peer=peer-1"));
        assert!(s.contains("attempt=2"));
    }
}
