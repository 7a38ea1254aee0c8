// Path: crates/node/src/bin/m2md.rs

//! The connector daemon: loads configuration, wires the core, and runs
//! until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use m2m_api::{MemoryAccounting, SignerBackend};
use m2m_chain::EvmChannelClient;
use m2m_node::ConnectorNode;
use m2m_signer::LocalKeySigner;
use m2m_types::config::ConnectorConfig;
use m2m_types::error::SigningError;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "m2m connector node", long_about = None)]
struct Opts {
    /// Path to the connector's TOML configuration file.
    #[arg(long, default_value = "connector.toml")]
    config: PathBuf,

    /// Directory holding hex-encoded signing keys, one `<key_id>.key` file each.
    /// Created (with a fresh settlement key) if missing.
    #[arg(long, default_value = "keys")]
    key_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    m2m_telemetry::init::init_tracing()?;
    let opts = Opts::parse();

    let raw = std::fs::read_to_string(&opts.config)
        .with_context(|| format!("reading config {:?}", opts.config))?;
    let cfg: ConnectorConfig = toml::from_str(&raw).context("parsing config")?;

    std::fs::create_dir_all(&opts.key_dir)
        .with_context(|| format!("creating key dir {:?}", opts.key_dir))?;
    let signer = LocalKeySigner::from_dir(&opts.key_dir).context("loading signing keys")?;
    ensure_settlement_key(&signer, &cfg.settlement.signing_key_id).await?;

    let chain = EvmChannelClient::new(cfg.chain.clone()).context("building chain adapter")?;
    // Development accounting store; a production deployment points the port
    // at the remote ledger service instead.
    let accounting = Arc::new(MemoryAccounting::new());

    let node = Arc::new(ConnectorNode::build(
        cfg,
        Arc::new(chain),
        Arc::new(signer),
        accounting,
    )?);
    tracing::info!(target: "node", "connector node starting");

    let runner = {
        let node = Arc::clone(&node);
        tokio::spawn(async move { node.run().await })
    };

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!(target: "node", "shutdown requested");
    node.stop().await;
    runner.abort();
    let _ = runner.await;
    Ok(())
}

/// Generates the settlement signing key on first start.
async fn ensure_settlement_key(signer: &LocalKeySigner, key_id: &str) -> Result<()> {
    match signer.public_key(key_id).await {
        Ok(_) => Ok(()),
        Err(SigningError::EmptyResult(_)) => {
            tracing::info!(target: "node", key_id, "generating settlement signing key");
            signer.generate(key_id)?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
