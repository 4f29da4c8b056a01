//! Chain Subscriber (C1)
//!
//! Maintains one streaming connection per chain, performs eager pool
//! discovery before streaming starts, and delivers raw log records to the
//! decoder (C2) over a bounded channel.
//!
//! Author: AI-Generated
//! Created: 2026-07-28
//!
//! Grounded on `mempool/monitor.rs`'s `run_observation_inner` (WS provider
//! setup, `subscribe(...).into_stream()`, and the `tokio::select!` loop
//! between the log stream and a periodic timer — generalized here from a
//! fixed 5s/50-attempt retry into the explicit backoff state machine §4.1
//! requires) and `pool/v2_syncer.rs`'s `sync_pool_by_address` (token0/token1
//! → `decimals()` → `getReserves()` discovery ordering, and
//! `sync_known_pools_parallel`'s `futures::future::join_all` fan-out,
//! adapted here to run once, eagerly, before the stream opens).

use crate::config::{ChainConfig, PairConfig, TokenConfig, VenueConfig};
use crate::contracts::{IERC20, IUniswapV2Factory, IUniswapV2Pair};
use crate::error::{EngineError, Result};
use crate::registry::PoolRegistry;
use crate::types::{Chain, Pool, PoolId};
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use chrono::Utc;
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::decode::RawLog;

/// Exponential backoff with a base delay and a cap on the multiple, bounded
/// by a total attempt budget (§4.1 reconnection policy).
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_multiple: u32,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_multiple: 6,
            max_attempts: 10,
        }
    }
}

/// Per-chain reconnect state: endpoint cursor and attempt counter, kept as
/// one small owned struct rather than scattered across call sites (§9
/// re-architecture guidance).
pub struct ReconnectState {
    policy: ReconnectPolicy,
    endpoint_cursor: usize,
    attempt: u32,
}

impl ReconnectState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, endpoint_cursor: 0, attempt: 0 }
    }

    pub fn next_endpoint<'a>(&mut self, endpoints: &'a [String]) -> &'a str {
        let endpoint = &endpoints[self.endpoint_cursor % endpoints.len()];
        self.endpoint_cursor += 1;
        endpoint
    }

    /// Delay before the next attempt, and whether the budget is exhausted.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }
        let multiple = (self.attempt + 1).min(self.policy.max_multiple);
        self.attempt += 1;
        Some(self.policy.base_delay * multiple)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Monitoring-set entry resolved during discovery: a venue plus the two
/// token sides to look up via `factory.getPair`.
struct DiscoveryTarget<'a> {
    venue: &'a VenueConfig,
    token_a: &'a TokenConfig,
    token_b: &'a TokenConfig,
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

fn allocate_pool_id() -> PoolId {
    PoolId(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed))
}

pub struct ChainSubscriber {
    chain: Chain,
    config: ChainConfig,
    reconnect: ReconnectState,
}

impl ChainSubscriber {
    pub fn new(chain: Chain, config: ChainConfig) -> Self {
        Self { chain, config, reconnect: ReconnectState::new(ReconnectPolicy::default()) }
    }

    /// Eagerly resolve every `(venue, token_pair)` in the monitoring set to a
    /// pool address, read `(token0, token1, decimals, reserves)`, validate
    /// `factory.getPair(token0, token1) == discovered_address` (always true
    /// by construction here, since the address *is* read from `getPair` —
    /// this subsumes §9 Open Question 2), and register the pool. Discovery
    /// completes in full before `run` opens the streaming subscription.
    pub async fn discover(
        &self,
        venues: &[VenueConfig],
        tokens: &[TokenConfig],
        pairs: &[PairConfig],
        registry: &PoolRegistry,
    ) -> Result<()> {
        let provider = ProviderBuilder::new()
            .connect(&self.config.endpoints[0])
            .await
            .map_err(|e| EngineError::Transport { chain: self.chain, detail: e.to_string() })?;

        let targets = resolve_targets(self.chain, venues, tokens, pairs);
        let futures = targets.into_iter().map(|target| discover_one(self.chain, &provider, target, registry));
        let results = join_all(futures).await;

        let mut discovered = 0;
        for result in results {
            match result {
                Ok(true) => discovered += 1,
                Ok(false) => {}
                Err(e) => warn!(chain = %self.chain, error = %e, "pool discovery skipped"),
            }
        }
        info!(chain = %self.chain, discovered, "pool discovery complete");
        Ok(())
    }

    /// Run the streaming subscription loop, delivering decoded raw logs to
    /// `out`. Reconnects per `ReconnectPolicy` on transport failure; on
    /// budget exhaustion returns a chain-fatal error and the supervisor
    /// continues the other chains (§4.1, §7).
    pub async fn run(&mut self, pool_addresses: Vec<alloy::primitives::Address>, out: mpsc::Sender<RawLog>) -> Result<()> {
        loop {
            let endpoint = self.reconnect.next_endpoint(&self.config.endpoints).to_string();
            match self.run_once(&endpoint, &pool_addresses, &out).await {
                Ok(()) => {
                    self.reconnect.reset();
                }
                Err(e) => {
                    warn!(chain = %self.chain, endpoint = %endpoint, error = %e, "subscription dropped, reconnecting");
                    match self.reconnect.next_backoff() {
                        Some(delay) => {
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        None => {
                            return Err(EngineError::ChainFatal {
                                chain: self.chain,
                                reason: format!("reconnect budget exhausted: {e}"),
                            });
                        }
                    }
                }
            }
        }
    }

    async fn run_once(
        &self,
        endpoint: &str,
        pool_addresses: &[alloy::primitives::Address],
        out: &mpsc::Sender<RawLog>,
    ) -> Result<()> {
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(endpoint))
            .await
            .map_err(|e| EngineError::Transport { chain: self.chain, detail: e.to_string() })?;

        let filter = alloy::rpc::types::Filter::new()
            .address(pool_addresses.to_vec())
            .event_signature(super::decode::SYNC_EVENT_TOPIC.parse::<alloy::primitives::B256>().unwrap());

        let subscription = provider
            .subscribe_logs(&filter)
            .await
            .map_err(|e| EngineError::Transport { chain: self.chain, detail: e.to_string() })?;
        let mut stream = subscription.into_stream();

        let mut housekeeping = tokio::time::interval(Duration::from_secs(30));
        housekeeping.tick().await;

        use futures::StreamExt;
        loop {
            tokio::select! {
                maybe_log = stream.next() => {
                    let Some(log) = maybe_log else {
                        return Err(EngineError::Transport { chain: self.chain, detail: "log stream ended".into() });
                    };
                    let raw = RawLog {
                        address: log.address(),
                        topics: log.topics().to_vec(),
                        data: log.data().data.to_vec(),
                        block_number: log.block_number.unwrap_or_default(),
                        log_index: log.log_index.unwrap_or_default(),
                    };
                    if out.send(raw).await.is_err() {
                        debug!(chain = %self.chain, "decoder channel closed, stopping subscriber");
                        return Ok(());
                    }
                }
                _ = housekeeping.tick() => {
                    debug!(chain = %self.chain, "chain subscriber housekeeping tick");
                }
            }
        }
    }
}

fn resolve_targets<'a>(
    chain: Chain,
    venues: &'a [VenueConfig],
    tokens: &'a [TokenConfig],
    pairs: &'a [PairConfig],
) -> Vec<DiscoveryTarget<'a>> {
    let mut targets = Vec::new();
    for pair in pairs.iter().filter(|p| p.chain == chain) {
        let Some(token_a) = tokens.iter().find(|t| t.chain == chain && t.symbol == pair.symbol_a) else { continue };
        let Some(token_b) = tokens.iter().find(|t| t.chain == chain && t.symbol == pair.symbol_b) else { continue };
        for venue in venues.iter().filter(|v| v.chain == chain) {
            targets.push(DiscoveryTarget { venue, token_a, token_b });
        }
    }
    targets
}

async fn discover_one<P: Provider + Clone>(
    chain: Chain,
    provider: &P,
    target: DiscoveryTarget<'_>,
    registry: &PoolRegistry,
) -> Result<bool> {
    let factory = IUniswapV2Factory::new(target.venue.factory, provider.clone());
    let pool_address = factory
        .getPair(target.token_a.address, target.token_b.address)
        .call()
        .await
        .map_err(|e| EngineError::Config { detail: format!("getPair failed: {e}") })?;

    if pool_address == alloy::primitives::Address::ZERO {
        return Ok(false);
    }

    let pair_contract = IUniswapV2Pair::new(pool_address, provider.clone());
    let token0 = pair_contract.token0().call().await.map_err(|e| EngineError::Config { detail: e.to_string() })?;
    let token1 = pair_contract.token1().call().await.map_err(|e| EngineError::Config { detail: e.to_string() })?;
    let reserves = pair_contract.getReserves().call().await.map_err(|e| EngineError::Config { detail: e.to_string() })?;

    let decimals0 = IERC20::new(token0, provider.clone())
        .decimals()
        .call()
        .await
        .map_err(|e| EngineError::Config { detail: e.to_string() })?;
    let decimals1 = IERC20::new(token1, provider.clone())
        .decimals()
        .call()
        .await
        .map_err(|e| EngineError::Config { detail: e.to_string() })?;

    let (symbol0, symbol1) = if token0 == target.token_a.address {
        (target.token_a.symbol.clone(), target.token_b.symbol.clone())
    } else {
        (target.token_b.symbol.clone(), target.token_a.symbol.clone())
    };

    let pool = Pool {
        pool_id: allocate_pool_id(),
        chain,
        venue: target.venue.name.clone(),
        address: pool_address,
        token0,
        token1,
        symbol0,
        symbol1,
        decimals0,
        decimals1,
        fee_bps: target.venue.fee_bps,
        reserve0: alloy::primitives::U256::from(reserves.reserve0),
        reserve1: alloy::primitives::U256::from(reserves.reserve1),
        sequence: 0,
        last_update_wall: Utc::now(),
    };
    registry.register(pool);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_escalates_then_exhausts() {
        let mut state = ReconnectState::new(ReconnectPolicy { base_delay: Duration::from_secs(5), max_multiple: 3, max_attempts: 4 });
        assert_eq!(state.next_backoff(), Some(Duration::from_secs(5)));
        assert_eq!(state.next_backoff(), Some(Duration::from_secs(10)));
        assert_eq!(state.next_backoff(), Some(Duration::from_secs(15)));
        assert_eq!(state.next_backoff(), Some(Duration::from_secs(15)));
        assert_eq!(state.next_backoff(), None);
    }

    #[test]
    fn endpoint_cursor_cycles() {
        let mut state = ReconnectState::new(ReconnectPolicy::default());
        let endpoints = vec!["a".to_string(), "b".to_string()];
        assert_eq!(state.next_endpoint(&endpoints), "a");
        assert_eq!(state.next_endpoint(&endpoints), "b");
        assert_eq!(state.next_endpoint(&endpoints), "a");
    }

    #[test]
    fn reset_clears_attempt_counter() {
        let mut state = ReconnectState::new(ReconnectPolicy { base_delay: Duration::from_secs(1), max_multiple: 2, max_attempts: 2 });
        state.next_backoff();
        state.next_backoff();
        assert_eq!(state.next_backoff(), None);
        state.reset();
        assert!(state.next_backoff().is_some());
    }
}
