//! Process structure & supervision (§10).
//!
//! Owns one `ChainPipeline` per configured chain: discovery, the streaming
//! subscriber, decode-apply-detect on each incoming log, and periodic
//! housekeeping. Chains run independently — one chain reconnecting or
//! failing permanently never blocks another (§4.1, §5).
//!
//! Grounded on `main.rs`'s placeholder top-level loop (replaced here with a
//! real per-chain `tokio::spawn` fan-out) and `mempool/monitor.rs`'s
//! reconnect-loop/`tokio::select!` idiom, lifted one level up to coordinate
//! multiple chains instead of one.
//!
//! Author: AI-Generated
//! Created: 2026-07-28

use crate::chain::decode::decode_sync_log;
use crate::chain::subscriber::ChainSubscriber;
use crate::config::{ChainConfig, EngineConfig, PairConfig, TokenConfig};
use crate::detector::state::DetectorStateMachine;
use crate::detector::{cycles, pairwise};
use crate::error::{EngineError, Result};
use crate::registry::PoolRegistry;
use crate::sink::{OpportunitySink, PublishOutcome};
use crate::types::{ArbitragePath, Chain};
use alloy::primitives::Address;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::{error, info, info_span, warn, Instrument};

/// A chain pipeline's status, as surfaced by `Supervisor::health` (§10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStatus {
    Running,
    Down { reason: String },
}

/// The engine's only externally-visible status surface (§10): one
/// `ChainStatus` per configured chain.
#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    pub chains: HashMap<Chain, ChainStatus>,
}

struct ChainPipeline {
    chain: Chain,
    chain_config: ChainConfig,
    tokens: Vec<TokenConfig>,
    pairs: Vec<PairConfig>,
    registry: Arc<PoolRegistry>,
    state: Arc<Mutex<DetectorStateMachine>>,
    status: Arc<Mutex<ChainStatus>>,
}

impl ChainPipeline {
    async fn run(self, config: Arc<EngineConfig>, sink: Arc<OpportunitySink>) {
        let chain = self.chain;
        let venues: Vec<_> = config.venues.iter().filter(|v| v.chain == chain).cloned().collect();

        let mut subscriber = ChainSubscriber::new(chain, self.chain_config.clone());
        if let Err(e) = subscriber.discover(&venues, &self.tokens, &self.pairs, &self.registry).await {
            warn!(%chain, error = %e, "initial pool discovery failed");
            *self.status.lock().await = ChainStatus::Down { reason: e.to_string() };
        }
        if self.registry.is_empty() {
            warn!(%chain, "no pools discovered, pipeline has nothing to monitor");
            *self.status.lock().await = ChainStatus::Down { reason: "no pools discovered".to_string() };
            return;
        }

        let pool_addresses = self.registry.addresses(chain);
        let (log_tx, mut log_rx) = mpsc::channel(256);

        let subscriber_chain = chain;
        let subscriber_status = Arc::clone(&self.status);
        let subscriber_handle = tokio::spawn(async move {
            if let Err(e) = subscriber.run(pool_addresses, log_tx).await {
                error!(chain = %subscriber_chain, error = %e, "chain subscriber terminated");
                *subscriber_status.lock().await = ChainStatus::Down { reason: e.to_string() };
            }
        });

        let anchor_tokens: Vec<Address> = self
            .tokens
            .iter()
            .filter(|t| self.chain_config.anchor_symbols.contains(&t.symbol))
            .map(|t| t.address)
            .collect();

        let usd_prices: HashMap<String, f64> = self
            .tokens
            .iter()
            .filter_map(|t| t.usd_price.map(|p| (t.symbol.clone(), p)))
            .collect();
        let price_lookup = move |symbol: &str| usd_prices.get(symbol).copied();

        let mut housekeeping = tokio::time::interval(std::time::Duration::from_secs(30));

        loop {
            tokio::select! {
                maybe_log = log_rx.recv() => {
                    let Some(log) = maybe_log else {
                        warn!(%chain, "log channel closed, pipeline stopping");
                        break;
                    };
                    self.state.lock().await.on_update_enqueued();
                    self.handle_log(&log, chain, &anchor_tokens, &config, &sink, &price_lookup).await;
                    self.state.lock().await.on_update_processed();
                }
                _ = housekeeping.tick() => {
                    sink.sweep();
                }
            }
        }

        subscriber_handle.abort();
    }

    async fn handle_log(
        &self,
        log: &crate::chain::decode::RawLog,
        chain: Chain,
        anchor_tokens: &[Address],
        config: &EngineConfig,
        sink: &OpportunitySink,
        price_lookup: &dyn Fn(&str) -> Option<f64>,
    ) {
        let Some(pool_id) = self.registry.pool_id_for_address(chain, log.address) else {
            return;
        };
        let update = match decode_sync_log(log, pool_id) {
            Ok(u) => u,
            Err(e) => {
                warn!(%chain, error = %e, "dropping malformed log");
                return;
            }
        };
        if !self.registry.apply(&update) {
            return;
        }

        let gas_cost_native = self.chain_config.gas_per_hop * self.chain_config.gas_price_gwei * 1e-9;
        let mut paths: Vec<ArbitragePath> = Vec::new();

        for pair in self.pairs.iter().filter(|p| p.chain == chain) {
            let (Some(token_a), Some(token_b)) = (
                self.tokens.iter().find(|t| t.chain == chain && t.symbol == pair.symbol_a),
                self.tokens.iter().find(|t| t.chain == chain && t.symbol == pair.symbol_b),
            ) else {
                continue;
            };
            paths.extend(pairwise::scan_pair(
                &self.registry,
                chain,
                token_a.address,
                token_b.address,
                &config.detector,
                gas_cost_native,
                self.chain_config.native_usd_price,
                price_lookup,
            ));
        }

        paths.extend(cycles::detect_cycles(
            &self.registry,
            chain,
            anchor_tokens,
            &config.detector,
            gas_cost_native,
            self.chain_config.native_usd_price,
            price_lookup,
        ));

        for path in paths {
            match sink.publish(path) {
                PublishOutcome::Backpressured => {
                    self.state.lock().await.on_backpressure();
                    *self.status.lock().await = ChainStatus::Down { reason: "opportunity sink backpressured".to_string() };
                }
                PublishOutcome::Published(_) => {
                    self.state.lock().await.on_sink_resumed();
                    *self.status.lock().await = ChainStatus::Running;
                }
                PublishOutcome::Deduplicated => {}
            }
        }
    }
}

/// Owns every chain's pipeline and the shared opportunity sink. `run`
/// completes when a Ctrl+C signal is observed or every chain pipeline exits.
/// `health` is safe to call at any point, including concurrently with a
/// running `run` call, via a retained `Arc<Supervisor>` handle.
pub struct Supervisor {
    config: Arc<EngineConfig>,
    pipelines: Mutex<Option<Vec<ChainPipeline>>>,
    chains: Vec<Chain>,
    statuses: Vec<Arc<Mutex<ChainStatus>>>,
}

impl Supervisor {
    pub fn new(config: EngineConfig) -> Self {
        let config = Arc::new(config);
        let mut pipelines = Vec::new();
        let mut chains = Vec::new();
        let mut statuses = Vec::new();

        for chain_config in &config.chains {
            let registry = Arc::new(PoolRegistry::new());
            let state = Arc::new(Mutex::new(DetectorStateMachine::new()));
            let status = Arc::new(Mutex::new(ChainStatus::Running));

            chains.push(chain_config.chain);
            statuses.push(Arc::clone(&status));

            pipelines.push(ChainPipeline {
                chain: chain_config.chain,
                chain_config: chain_config.clone(),
                tokens: config.tokens.iter().filter(|t| t.chain == chain_config.chain).cloned().collect(),
                pairs: config.pairs.iter().filter(|p| p.chain == chain_config.chain).cloned().collect(),
                registry,
                state,
                status,
            });
        }

        Self { config, pipelines: Mutex::new(Some(pipelines)), chains, statuses }
    }

    /// Run every chain pipeline until Ctrl+C is received, then report final
    /// health and return. Consumes no more than one in-flight run: a second
    /// overlapping call fails with `EngineError::Config`.
    pub async fn run(self: Arc<Self>, sink: Arc<OpportunitySink>) -> Result<()> {
        let pipelines = self
            .pipelines
            .lock()
            .await
            .take()
            .ok_or_else(|| EngineError::Config { detail: "supervisor is already running".to_string() })?;

        if pipelines.is_empty() {
            return Err(EngineError::Config { detail: "no chains configured".to_string() });
        }

        let mut tasks = tokio::task::JoinSet::new();
        for pipeline in pipelines {
            let chain = pipeline.chain;
            let config = Arc::clone(&self.config);
            let sink = Arc::clone(&sink);
            let span = info_span!("chain", chain = %chain);
            tasks.spawn(pipeline.run(config, sink).instrument(span));
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received, stopping all chain pipelines");
            }
            _ = async { while tasks.join_next().await.is_some() {} } => {
                warn!("every chain pipeline exited on its own");
            }
        }

        tasks.abort_all();
        for (chain, status) in self.health().await.chains {
            info!(%chain, ?status, "final chain health");
        }
        Ok(())
    }

    /// The engine's only externally-visible status surface (§10). Safe to
    /// call at any point, including concurrently with `run`.
    pub async fn health(&self) -> HealthReport {
        let mut chains = HashMap::new();
        for (chain, status) in self.chains.iter().zip(self.statuses.iter()) {
            chains.insert(*chain, status.lock().await.clone());
        }
        HealthReport { chains }
    }
}
