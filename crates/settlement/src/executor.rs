// Path: crates/settlement/src/executor.rs

//! The settlement executor: per-peer workers, staged settlement pipeline,
//! and bounded retries around the signing, chain, and accounting ports.

use crate::state::{ChannelSnapshot, ExecutorState};
use alloy_primitives::Address;
use m2m_api::{AccountingStore, ChainClient, SignerBackend};
use m2m_telemetry::settlement_metrics;
use m2m_telemetry::time::Timer;
use m2m_types::channel::{BalanceProof, ChannelId, ChannelStatus, TxHash};
use m2m_types::config::SettlementConfig;
use m2m_types::error::{ChainError, ErrorCode, SettlementError, SigningError, TaskContext};
use m2m_types::event::{SettlementTrigger, TelemetryEvent};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

/// Capacity of the telemetry broadcast channel; slow observers miss events
/// rather than back-pressuring settlements.
const EVENT_CAPACITY: usize = 256;

/// Drives the settlement protocol for many peers concurrently, one channel
/// per peer, with at most one in-flight settlement per channel.
pub struct SettlementExecutor {
    inner: Arc<Inner>,
}

struct Inner {
    cfg: SettlementConfig,
    chain: Arc<dyn ChainClient>,
    signer: Arc<dyn SignerBackend>,
    accounting: Arc<dyn AccountingStore>,
    state: Mutex<ExecutorState>,
    workers: Mutex<HashMap<String, mpsc::UnboundedSender<SettlementTrigger>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    events: broadcast::Sender<TelemetryEvent>,
    queued: AtomicU64,
    stopped: AtomicBool,
}

impl SettlementExecutor {
    /// Builds an executor over the given ports. Fails on invalid configuration.
    pub fn new(
        cfg: SettlementConfig,
        chain: Arc<dyn ChainClient>,
        signer: Arc<dyn SignerBackend>,
        accounting: Arc<dyn AccountingStore>,
    ) -> Result<Self, SettlementError> {
        cfg.validate()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                cfg,
                chain,
                signer,
                accounting,
                state: Mutex::new(ExecutorState::default()),
                workers: Mutex::new(HashMap::new()),
                tasks: Mutex::new(Vec::new()),
                events,
                queued: AtomicU64::new(0),
                stopped: AtomicBool::new(false),
            }),
        })
    }

    /// Subscribes to the executor's telemetry stream.
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.inner.events.subscribe()
    }

    /// Accepts a trigger from the balance monitor.
    ///
    /// Triggers below the configured minimum are dropped silently. A trigger
    /// for a peer whose settlement is in flight queues behind it; queued
    /// triggers are processed FIFO and never coalesced.
    pub async fn submit(&self, trigger: SettlementTrigger) -> Result<(), SettlementError> {
        if !self.inner.cfg.enabled || self.inner.stopped.load(Ordering::SeqCst) {
            return Err(SettlementError::Disabled);
        }
        if trigger.current_balance.is_zero()
            || trigger.current_balance < self.inner.cfg.min_settlement_amount
        {
            tracing::debug!(
                target: "settlement",
                peer_id = %trigger.peer_id,
                balance = %trigger.current_balance,
                "trigger below settlement minimum, dropping"
            );
            return Ok(());
        }

        let channel_id = {
            let state = self.inner.state.lock().await;
            state.channels.get(&trigger.peer_id).copied()
        };
        self.inner.emit(TelemetryEvent::SettlementTriggered {
            node_id: self.inner.cfg.node_id.clone(),
            peer_id: trigger.peer_id.clone(),
            channel_id,
            token_id: trigger.token_id.clone(),
            amount: trigger.current_balance,
        });

        let peer_id = trigger.peer_id.clone();
        // Counted before the send so the worker's decrement can never race
        // the gauge below zero.
        let queued = self.inner.queued.fetch_add(1, Ordering::SeqCst) + 1;
        settlement_metrics().set_queued_triggers(queued);
        let mut workers = self.inner.workers.lock().await;
        match workers.get(&peer_id) {
            Some(tx) if tx.send(trigger.clone()).is_ok() => {}
            _ => {
                // First trigger for this peer (or its worker is gone):
                // spawn a dedicated worker that serializes its settlements.
                let (tx, rx) = mpsc::unbounded_channel();
                // Send cannot fail: we hold the only receiver.
                let _ = tx.send(trigger);
                workers.insert(peer_id.clone(), tx);
                let inner = Arc::clone(&self.inner);
                let handle = tokio::spawn(async move {
                    inner.worker(peer_id, rx).await;
                });
                self.inner.tasks.lock().await.push(handle);
            }
        }
        Ok(())
    }

    /// Stops accepting triggers and waits for every worker to drain.
    ///
    /// In-flight and already-queued settlements complete (or fail) naturally;
    /// nothing is aborted mid-signature.
    pub async fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.workers.lock().await.clear();
        let mut tasks = self.inner.tasks.lock().await;
        for handle in tasks.drain(..) {
            let _ = handle.await;
        }
        tracing::info!(target: "settlement", "executor stopped");
    }

    /// Posts the channel's latest signed proof on-chain.
    ///
    /// This is the non-cooperative path, taken when the counterparty stops
    /// cooperating and the escrow must be claimed unilaterally; routine
    /// settlements stay off-chain. The channel moves to `Settling` and a
    /// `PAYMENT_CHANNEL_SETTLED` event is emitted.
    pub async fn force_settle(&self, channel_id: ChannelId) -> Result<TxHash, SettlementError> {
        let proof = {
            let state = self.inner.state.lock().await;
            state
                .proof_log
                .get(&channel_id)
                .and_then(|log| log.last())
                .cloned()
        }
        .ok_or_else(|| {
            SettlementError::ConfigInvalid(format!(
                "no signed proof recorded for channel {}",
                channel_id
            ))
        })?;

        let tx_hash = self.inner.chain.submit_settlement(channel_id, &proof).await?;
        {
            let mut state = self.inner.state.lock().await;
            if let Some(cached) = state.channel_states.get_mut(&channel_id) {
                cached.status = ChannelStatus::Settling;
            }
        }
        self.inner.emit(TelemetryEvent::PaymentChannelSettled {
            node_id: self.inner.cfg.node_id.clone(),
            channel_id,
            tx_hash,
        });
        tracing::info!(
            target: "settlement",
            %channel_id,
            %tx_hash,
            nonce = proof.nonce,
            "proof submitted on-chain"
        );
        Ok(tx_hash)
    }

    /// The channel currently mapped to `peer_id`, if any.
    pub async fn channel_for(&self, peer_id: &str) -> Option<ChannelId> {
        self.inner.state.lock().await.channels.get(peer_id).copied()
    }

    /// Snapshot of the full peer-to-channel map.
    pub async fn peer_channels(&self) -> HashMap<String, ChannelId> {
        self.inner.state.lock().await.channels.clone()
    }

    /// Snapshot of one channel's cached state and signed-proof log.
    pub async fn channel_snapshot(&self, channel_id: ChannelId) -> Option<ChannelSnapshot> {
        let state = self.inner.state.lock().await;
        let cached = state.channel_states.get(&channel_id)?.clone();
        let proofs = state.proof_log.get(&channel_id).cloned().unwrap_or_default();
        Some(ChannelSnapshot {
            state: cached,
            proofs,
        })
    }
}

impl Inner {
    fn emit(&self, event: TelemetryEvent) {
        // No subscribers is fine; the stream is best-effort.
        let _ = self.events.send(event);
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.cfg.retry_delay_ms)
    }

    async fn worker(
        self: Arc<Self>,
        peer_id: String,
        mut rx: mpsc::UnboundedReceiver<SettlementTrigger>,
    ) {
        tracing::debug!(target: "settlement", %peer_id, "worker started");
        while let Some(trigger) = rx.recv().await {
            let queued = self.queued.fetch_sub(1, Ordering::SeqCst) - 1;
            settlement_metrics().set_queued_triggers(queued);
            self.process(&peer_id, trigger).await;
        }
        tracing::debug!(target: "settlement", %peer_id, "worker drained");
    }

    /// Runs the full pipeline for one trigger, reporting the outcome through
    /// telemetry. Never propagates an error: the executor stays live.
    async fn process(&self, peer_id: &str, trigger: SettlementTrigger) {
        let _timer = Timer::new(settlement_metrics());

        let Some(peer_addr) = self.cfg.peer_address_map.get(peer_id).copied() else {
            self.fail(
                peer_id,
                None,
                SettlementError::UnknownPeer(peer_id.to_string()),
                1,
                "resolve_peer",
            );
            return;
        };

        let channel_id = match self
            .run_stage("resolve_channel", peer_id, None, |_| {
                self.resolve_channel(peer_id, peer_addr)
            })
            .await
        {
            Ok(id) => id,
            Err((err, attempts)) => {
                self.fail(peer_id, None, err, attempts, "resolve_channel");
                return;
            }
        };

        let proof = match self
            .run_stage("sign_proof", peer_id, Some(channel_id), |_| {
                self.prove(channel_id, &trigger)
            })
            .await
        {
            Ok(proof) => proof,
            Err((err, attempts)) => {
                self.fail(peer_id, Some(channel_id), err, attempts, "sign_proof");
                return;
            }
        };

        // Commit locally before telling accounting: the proof log is the
        // source of truth for what this node has signed.
        {
            let mut state = self.state.lock().await;
            state.commit_proof(proof.clone());
        }
        self.emit(TelemetryEvent::PaymentChannelBalanceUpdate {
            node_id: self.cfg.node_id.clone(),
            channel_id,
            nonce: proof.nonce,
            transferred: proof.transferred_amount,
        });

        match self
            .run_stage("record_settlement", peer_id, Some(channel_id), |_| {
                self.record(peer_id, &trigger, proof.nonce)
            })
            .await
        {
            Ok(()) => {
                settlement_metrics().inc_settlements_completed();
                self.emit(TelemetryEvent::SettlementCompleted {
                    node_id: self.cfg.node_id.clone(),
                    peer_id: peer_id.to_string(),
                    channel_id,
                    nonce: proof.nonce,
                    transferred: proof.transferred_amount,
                    amount: trigger.current_balance,
                });
                tracing::info!(
                    target: "settlement",
                    peer_id,
                    %channel_id,
                    nonce = proof.nonce,
                    amount = %trigger.current_balance,
                    "settlement committed"
                );
            }
            Err((err, attempts)) => {
                self.fail(peer_id, Some(channel_id), err, attempts, "record_settlement");
            }
        }
    }

    /// Runs one pipeline stage under the transient-retry budget.
    ///
    /// A nonce conflict gets one free retry after refreshing the channel
    /// cache from chain; a second conflict is surfaced as terminal.
    async fn run_stage<T, F, Fut>(
        &self,
        stage: &'static str,
        peer_id: &str,
        channel: Option<ChannelId>,
        mut op: F,
    ) -> Result<T, (SettlementError, u32)>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SettlementError>>,
    {
        let budget = self.cfg.retry_attempts.max(1);
        let mut conflict_refreshed = false;
        let mut attempt = 1u32;
        loop {
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let conflict = matches!(
                err,
                SettlementError::Chain(ChainError::NonceConflict { .. })
            );
            if conflict && !conflict_refreshed {
                conflict_refreshed = true;
                if let Some(channel_id) = channel {
                    if let Err(refresh_err) = self.refresh_channel(channel_id).await {
                        tracing::warn!(
                            target: "settlement",
                            %channel_id,
                            error = %refresh_err,
                            "channel refresh after nonce conflict failed"
                        );
                    }
                }
                tracing::warn!(target: "settlement", peer_id, stage, "nonce conflict, retrying once");
                continue;
            }

            if err.is_transient() && !conflict && attempt < budget {
                let ctx = TaskContext::new("settlement", stage)
                    .peer(peer_id)
                    .attempt(attempt);
                tracing::warn!(
                    target: "settlement",
                    context = %ctx,
                    error = %err,
                    "transient failure, retrying"
                );
                sleep(self.retry_delay()).await;
                attempt += 1;
                continue;
            }

            return Err((err, attempt));
        }
    }

    /// Looks up the peer's channel, opening one on first settlement. Always
    /// leaves a cached channel state behind on success.
    async fn resolve_channel(
        &self,
        peer_id: &str,
        peer_addr: Address,
    ) -> Result<ChannelId, SettlementError> {
        let cached = {
            let state = self.state.lock().await;
            state.channels.get(peer_id).copied().map(|id| {
                (id, state.channel_states.contains_key(&id))
            })
        };
        if let Some((channel_id, has_state)) = cached {
            if !has_state {
                // Known channel, cold cache (e.g. after restart).
                self.refresh_channel(channel_id).await?;
            }
            return Ok(channel_id);
        }

        let channel_id = self
            .chain
            .open_channel(
                peer_addr,
                self.cfg.settlement_token_address,
                self.cfg.default_initial_deposit,
                self.cfg.default_settlement_timeout_secs,
            )
            .await?;
        // Fetch the authoritative state: for an adopted channel the nonces
        // and transferred amounts are not zero.
        let onchain = self.chain.channel_state(channel_id).await?;
        let deposit = onchain.my_deposit;
        let token_address = onchain.token_address;
        {
            let mut state = self.state.lock().await;
            state.channels.insert(peer_id.to_string(), channel_id);
            state.channel_states.insert(channel_id, onchain);
        }
        settlement_metrics().inc_channels_opened();
        self.emit(TelemetryEvent::PaymentChannelOpened {
            node_id: self.cfg.node_id.clone(),
            peer_id: peer_id.to_string(),
            channel_id,
            token_address,
            deposit,
        });
        tracing::info!(target: "settlement", peer_id, %channel_id, "payment channel ready");
        Ok(channel_id)
    }

    /// Overwrites the cached view of `channel_id` with fresh on-chain state.
    async fn refresh_channel(&self, channel_id: ChannelId) -> Result<(), SettlementError> {
        let onchain = self.chain.channel_state(channel_id).await?;
        let mut state = self.state.lock().await;
        state.channel_states.insert(channel_id, onchain);
        Ok(())
    }

    /// Computes and signs the next balance proof from the cached state.
    async fn prove(
        &self,
        channel_id: ChannelId,
        trigger: &SettlementTrigger,
    ) -> Result<BalanceProof, SettlementError> {
        let (nonce, transferred_amount, token_address) = {
            let state = self.state.lock().await;
            let cached = state.channel_states.get(&channel_id).ok_or_else(|| {
                SettlementError::ConfigInvalid(format!("no cached state for channel {}", channel_id))
            })?;
            (
                cached.my_nonce + 1,
                cached.my_transferred.saturating_add(trigger.current_balance),
                cached.token_address,
            )
        };
        let digest = self
            .chain
            .proof_digest(channel_id, nonce, transferred_amount, token_address);
        let signature = self
            .signer
            .sign(digest.as_slice(), &self.cfg.signing_key_id)
            .await?;
        if signature.is_empty() {
            return Err(SigningError::EmptyResult(self.cfg.signing_key_id.clone()).into());
        }
        Ok(BalanceProof {
            channel_id,
            nonce,
            transferred_amount,
            token_address,
            signature,
        })
    }

    /// Reports the settled increment to accounting, keyed by proof nonce so
    /// replays after a partial failure stay idempotent.
    async fn record(
        &self,
        peer_id: &str,
        trigger: &SettlementTrigger,
        nonce: u64,
    ) -> Result<(), SettlementError> {
        self.accounting
            .record_settlement(
                peer_id,
                &trigger.token_id,
                trigger.current_balance,
                Some(nonce),
            )
            .await?;
        Ok(())
    }

    fn fail(
        &self,
        peer_id: &str,
        channel_id: Option<ChannelId>,
        err: SettlementError,
        attempts: u32,
        stage: &'static str,
    ) {
        let code = err.code();
        settlement_metrics().inc_settlements_failed(code);
        m2m_telemetry::error_metrics().inc_error("settlement", code);
        let mut ctx = TaskContext::new("settlement", stage)
            .peer(peer_id)
            .attempt(attempts);
        if let Some(id) = channel_id {
            ctx = ctx.channel(id);
        }
        tracing::error!(
            target: "settlement",
            context = %ctx,
            error = %err,
            "settlement failed"
        );
        self.emit(TelemetryEvent::SettlementFailed {
            node_id: self.cfg.node_id.clone(),
            peer_id: peer_id.to_string(),
            channel_id,
            code: code.to_string(),
            reason: err.to_string(),
            attempts,
        });
    }
}
