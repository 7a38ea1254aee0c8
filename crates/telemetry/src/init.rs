// Path: crates/telemetry/src/init.rs

//! Global structured-logging setup for connector processes.

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Default directives when `RUST_LOG` is unset. The HTTP stack's
/// per-connection chatter would drown settlement and discovery logs at
/// `info`, so it is capped at `warn`.
const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn";

/// Installs the global `tracing` subscriber for a connector process.
///
/// Events are written to stderr as one flattened JSON object per line,
/// tagged with the emitting target (`settlement`, `discovery`, `chain`,
/// `node`) so log shippers can route per subsystem. `log`-based
/// dependencies are bridged into the same stream.
pub fn init_tracing() -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json_layer = fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_target(true)
        .with_writer(std::io::stderr);
    let subscriber = Registry::default().with(filter).with(json_layer);
    tracing_log::LogTracer::init()?;
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
