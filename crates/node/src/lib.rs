// Path: crates/node/src/lib.rs
#![forbid(unsafe_code)]

//! # m2m Connector Node
//!
//! Assembles the connector core: the settlement executor fed by an external
//! balance monitor, and the peer-discovery service. Transport (BTP), the
//! balance monitor itself, and observation layers attach through the ports;
//! this crate only wires and supervises the core.

use m2m_api::{AccountingStore, ChainClient, SignerBackend};
use m2m_discovery::DiscoveryService;
use m2m_settlement::SettlementExecutor;
use m2m_types::config::ConnectorConfig;
use m2m_types::error::CoreError;
use m2m_types::event::SettlementTrigger;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Depth of the balance-monitor trigger queue feeding the executor.
const TRIGGER_QUEUE_DEPTH: usize = 64;

/// A wired connector core, ready to run.
pub struct ConnectorNode {
    executor: Arc<SettlementExecutor>,
    discovery: Arc<DiscoveryService>,
    trigger_tx: mpsc::Sender<SettlementTrigger>,
    trigger_rx: Mutex<Option<mpsc::Receiver<SettlementTrigger>>>,
}

impl ConnectorNode {
    /// Builds the core from configuration and the three port implementations.
    pub fn build(
        cfg: ConnectorConfig,
        chain: Arc<dyn ChainClient>,
        signer: Arc<dyn SignerBackend>,
        accounting: Arc<dyn AccountingStore>,
    ) -> Result<Self, CoreError> {
        let executor = SettlementExecutor::new(cfg.settlement, chain, signer, accounting)?;
        let discovery = DiscoveryService::new(cfg.discovery, cfg.node)?;
        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE_DEPTH);
        Ok(Self {
            executor: Arc::new(executor),
            discovery: Arc::new(discovery),
            trigger_tx,
            trigger_rx: Mutex::new(Some(trigger_rx)),
        })
    }

    /// The settlement executor, e.g. for telemetry subscriptions.
    pub fn executor(&self) -> &Arc<SettlementExecutor> {
        &self.executor
    }

    /// The discovery service, e.g. for registering a BTP connector.
    pub fn discovery(&self) -> &Arc<DiscoveryService> {
        &self.discovery
    }

    /// Where the balance monitor sends its threshold-crossing triggers.
    pub fn trigger_sender(&self) -> mpsc::Sender<SettlementTrigger> {
        self.trigger_tx.clone()
    }

    /// Starts discovery and begins draining the trigger queue into the
    /// executor. Returns once the queue closes (every sender dropped).
    pub async fn run(&self) {
        self.discovery.start().await;
        let Some(mut triggers) = self.trigger_rx.lock().await.take() else {
            tracing::warn!(target: "node", "run called twice, ignoring");
            return;
        };
        while let Some(trigger) = triggers.recv().await {
            if let Err(err) = self.executor.submit(trigger).await {
                tracing::warn!(target: "node", error = %err, "trigger rejected");
            }
        }
    }

    /// Graceful shutdown: deregister from discovery first, then let in-flight
    /// settlements finish.
    pub async fn stop(&self) {
        self.discovery.stop().await;
        self.executor.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use m2m_api::MemoryAccounting;
    use m2m_test_utils::{MockChainClient, MockSigner};
    use m2m_types::config::ConnectorConfig;

    fn sample_config() -> ConnectorConfig {
        toml::from_str(
            r#"
            [node]
            node_id = "node-a"
            btp_endpoint = "btp+wss://a.example/btp"
            ilp_address = "g.example.a"

            [chain]
            rpc_url = "http://127.0.0.1:8545"
            chain_id = 31337
            registry_address = "0x00000000000000000000000000000000000000aa"

            [settlement]
            settlement_token_address = "0x00000000000000000000000000000000000000bb"
            default_initial_deposit = "1000000"
            retry_delay_ms = 10
            node_id = "node-a"
            [settlement.peer_address_map]
            "peer-1" = "0x0202020202020202020202020202020202020202"

            [discovery]
            endpoints = []
            "#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn triggers_flow_from_monitor_to_accounting() {
        let accounting = Arc::new(MemoryAccounting::new());
        let node = ConnectorNode::build(
            sample_config(),
            Arc::new(MockChainClient::new()),
            Arc::new(MockSigner::new()),
            accounting.clone(),
        )
        .unwrap();

        let sender = node.trigger_sender();
        let node = Arc::new(node);
        let runner = {
            let node = Arc::clone(&node);
            tokio::spawn(async move { node.run().await })
        };

        sender
            .send(SettlementTrigger {
                peer_id: "peer-1".to_string(),
                token_id: "ILP".to_string(),
                current_balance: U256::from(1000u64),
                threshold: U256::from(800u64),
                timestamp_ms: 1,
            })
            .await
            .unwrap();
        drop(sender);
        runner.await.unwrap();
        node.stop().await;

        let records = accounting.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, U256::from(1000u64));
        let channel = node.executor().channel_for("peer-1").await.unwrap();
        let snapshot = node.executor().channel_snapshot(channel).await.unwrap();
        assert_eq!(snapshot.proofs.len(), 1);
        assert_eq!(
            snapshot.state.participants.1,
            Address::repeat_byte(0x02)
        );
    }
}
