// Path: crates/telemetry/src/sinks.rs
//! Defines abstract traits for metrics reporting, decoupling core logic from the backend.

use once_cell::sync::OnceCell;

// --- Static Sink Access ---

/// A no-op sink for use in tests or when telemetry is disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// A lazily-initialized static reference to the global `MetricsSink` implementation.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Installs the global metrics sink. Later calls are ignored; the first
/// installation wins for the lifetime of the process.
pub fn install(sink: &'static dyn MetricsSink) {
    let _ = SINK.set(sink);
}

/// Returns a static reference to the configured settlement metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn settlement_metrics() -> &'static dyn SettlementMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured discovery metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn discovery_metrics() -> &'static dyn DiscoveryMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured error metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn error_metrics() -> &'static dyn ErrorMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

// --- Trait Definitions ---

/// A sink for metrics related to the settlement executor.
pub trait SettlementMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter for settlements that committed successfully.
    fn inc_settlements_completed(&self);
    /// Increments the counter for settlements that failed terminally, labeled by error code.
    fn inc_settlements_failed(&self, code: &'static str);
    /// Increments the counter for payment channels opened (or adopted) by this node.
    fn inc_channels_opened(&self);
    /// Observes the wall-clock duration of one settlement, trigger to commit.
    fn observe_settlement_duration(&self, duration_secs: f64);
    /// Sets the gauge for triggers queued behind an in-flight settlement.
    fn set_queued_triggers(&self, count: u64);
}
impl SettlementMetricsSink for NopSink {
    fn inc_settlements_completed(&self) {}
    fn inc_settlements_failed(&self, _code: &'static str) {}
    fn inc_channels_opened(&self) {}
    fn observe_settlement_duration(&self, _duration_secs: f64) {}
    fn set_queued_triggers(&self, _count: u64) {}
}

/// A sink for metrics related to the peer-discovery service.
pub trait DiscoveryMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter for announce rounds that failed, labeled by endpoint.
    fn inc_announce_failures(&self, endpoint: &str);
    /// Sets the gauge for the current number of peers in the directory.
    fn set_directory_size(&self, size: u64);
    /// Increments the counter for peers evicted by TTL cleanup.
    fn inc_peers_evicted(&self, count: u64);
    /// Increments the counter for connection attempts towards discovered peers.
    fn inc_connection_attempts(&self);
}
impl DiscoveryMetricsSink for NopSink {
    fn inc_announce_failures(&self, _endpoint: &str) {}
    fn set_directory_size(&self, _size: u64) {}
    fn inc_peers_evicted(&self, _count: u64) {}
    fn inc_connection_attempts(&self) {}
}

/// A sink for recording structured error metrics.
pub trait ErrorMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter for a specific error, categorized by its kind and variant.
    fn inc_error(&self, kind: &'static str, variant: &'static str);
}
impl ErrorMetricsSink for NopSink {
    fn inc_error(&self, _kind: &'static str, _variant: &'static str) {}
}

/// A unified sink that implements all domain-specific traits, providing a single
/// point of implementation for metrics backends like Prometheus.
pub trait MetricsSink:
    SettlementMetricsSink + DiscoveryMetricsSink + ErrorMetricsSink + Send + Sync
{
}

impl MetricsSink for NopSink {}
