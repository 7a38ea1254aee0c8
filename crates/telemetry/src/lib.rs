// Path: crates/telemetry/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # m2m Connector Telemetry
//!
//! This crate provides the observability infrastructure for the connector,
//! including structured logging initialization and abstract sinks for
//! decoupling metric instrumentation from the backend. A Prometheus or
//! dashboard exporter plugs in behind the sink traits; none ships here.

/// The initialization routine for global structured logging.
pub mod init;
/// Abstract traits (`*MetricsSink`) that define the contract for metrics reporting.
pub mod sinks;
/// A simple RAII timer for measuring the duration of a scope.
pub mod time;

// Re-export the public helper functions for easy access to the global sinks.
pub use sinks::{discovery_metrics, error_metrics, settlement_metrics};
