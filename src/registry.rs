//! Pool Registry (C3)
//!
//! Authoritative snapshot of every monitored pool, held in a `DashMap` for
//! concurrent single-writer/multi-reader access. Each entry is itself an
//! `Arc<Pool>` so a reader's `get` returns a consistent snapshot that can
//! never observe a half-applied update: `apply` builds the new `Pool` value
//! off to the side and only then swaps the map entry, which DashMap performs
//! under its internal per-shard lock — a reader either sees the old `Arc` or
//! the new one, never a partially mutated `Pool`.
//!
//! Author: AI-Generated
//! Created: 2026-01-27
//! Modified: 2026-07-28 — re-keyed from (DexType, pair_symbol) to a stable
//! `PoolId`; added sequence/atomicity invariants, `liquidity_usd`, and
//! `edges_touching` needed by the detector (see DESIGN.md).

use crate::types::{Chain, Edge, Pool, PoolId, Price};
use alloy::primitives::{Address, U256};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// A decoded reserve update, as produced by the event decoder (C2).
#[derive(Debug, Clone)]
pub struct ReserveUpdate {
    pub pool_id: PoolId,
    pub reserve0: U256,
    pub reserve1: U256,
    pub sequence: u128,
}

/// Thread-safe pool registry.
///
/// Uses `DashMap` for concurrent read/write access, keyed by `PoolId` so
/// pools can span multiple chains and venues.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: DashMap<PoolId, Arc<Pool>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self { pools: DashMap::new() }
    }

    /// Register a newly discovered pool. Called once per pool by the chain
    /// subscriber's discovery phase (§4.1); never called again for the same
    /// `pool_id` afterwards — subsequent mutation only happens via `apply`.
    pub fn register(&self, pool: Pool) {
        self.pools.insert(pool.pool_id, Arc::new(pool));
    }

    /// Apply a reserve update. Idempotent on `(pool_id, sequence)`: updates
    /// with `sequence <= current` are discarded silently (§4.2, §4.3).
    /// Returns `true` if the update was applied.
    pub fn apply(&self, update: &ReserveUpdate) -> bool {
        let Some(mut entry) = self.pools.get_mut(&update.pool_id) else {
            return false;
        };
        if update.sequence <= entry.sequence {
            debug!(pool_id = %update.pool_id, sequence = update.sequence, current = entry.sequence, "discarding stale update");
            return false;
        }

        let mut next = (**entry).clone();
        next.reserve0 = update.reserve0;
        next.reserve1 = update.reserve1;
        next.sequence = update.sequence;
        next.last_update_wall = Utc::now();
        *entry = Arc::new(next);
        true
    }

    /// A consistent snapshot of a pool's current state, or `None` if unknown.
    pub fn get(&self, pool_id: PoolId) -> Option<Arc<Pool>> {
        self.pools.get(&pool_id).map(|entry| Arc::clone(&entry))
    }

    pub fn price(&self, pool_id: PoolId) -> Option<Price> {
        self.get(pool_id).and_then(|pool| pool.price())
    }

    /// All active pools sharing an unordered token pair on a chain, used by
    /// the pairwise-spread path (§4.4.1).
    pub fn pools_by_pair(&self, chain: Chain, token_a: Address, token_b: Address) -> Vec<Arc<Pool>> {
        self.pools
            .iter()
            .filter(|entry| {
                let p = entry.value();
                p.chain == chain
                    && p.is_active()
                    && ((p.token0 == token_a && p.token1 == token_b) || (p.token0 == token_b && p.token1 == token_a))
            })
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// All directed edges whose in-token or out-token is `token`, used by
    /// the multi-hop cycle detector (§4.4.2).
    pub fn edges_touching(&self, chain: Chain, token: Address) -> Vec<Edge> {
        let mut edges = Vec::new();
        for entry in self.pools.iter() {
            let pool = entry.value();
            if pool.chain != chain || !pool.is_active() {
                continue;
            }
            if pool.token0 == token {
                edges.push(make_edge(pool, pool.token0, pool.token1, &pool.symbol0, pool.reserve0, pool.reserve1));
            }
            if pool.token1 == token {
                edges.push(make_edge(pool, pool.token1, pool.token0, &pool.symbol1, pool.reserve1, pool.reserve0));
            }
        }
        edges
    }

    /// All directed edges on a chain, used to build the full token multigraph
    /// for a detection pass.
    pub fn all_edges(&self, chain: Chain) -> Vec<Edge> {
        let mut edges = Vec::new();
        for entry in self.pools.iter() {
            let pool = entry.value();
            if pool.chain != chain || !pool.is_active() {
                continue;
            }
            edges.push(make_edge(pool, pool.token0, pool.token1, &pool.symbol0, pool.reserve0, pool.reserve1));
            edges.push(make_edge(pool, pool.token1, pool.token0, &pool.symbol1, pool.reserve1, pool.reserve0));
        }
        edges
    }

    pub fn liquidity_usd(&self, pool_id: PoolId, usd_price: impl Fn(&str) -> Option<f64>) -> f64 {
        self.get(pool_id).map(|p| p.liquidity_usd(usd_price)).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Pool addresses to subscribe to on a chain, built once after discovery
    /// completes and handed to the chain subscriber's log filter (§4.1).
    pub fn addresses(&self, chain: Chain) -> Vec<Address> {
        self.pools
            .iter()
            .filter(|entry| entry.value().chain == chain)
            .map(|entry| entry.value().address)
            .collect()
    }

    /// Maps a pool's on-chain address back to its `PoolId`, used by the
    /// event decoder to resolve an incoming `Sync` log to a registry key.
    pub fn pool_id_for_address(&self, chain: Chain, address: Address) -> Option<PoolId> {
        self.pools
            .iter()
            .find(|entry| entry.value().chain == chain && entry.value().address == address)
            .map(|entry| *entry.key())
    }
}

fn make_edge(pool: &Pool, token_in: Address, token_out: Address, symbol_in: &str, reserve_in: U256, reserve_out: U256) -> Edge {
    Edge {
        pool_id: pool.pool_id,
        venue: pool.venue.clone(),
        token_in,
        token_out,
        symbol_in: symbol_in.to_string(),
        reserve_in,
        reserve_out,
        fee_bps: pool.fee_bps,
        rate_out_per_in: Edge::rate_after_fee(reserve_in, reserve_out, pool.fee_bps),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_pool(id: u64, reserve0: u64, reserve1: u64, sequence: u128) -> Pool {
        Pool {
            pool_id: PoolId(id),
            chain: Chain::Bsc,
            venue: "testvenue".into(),
            address: Address::ZERO,
            token0: Address::with_last_byte(1),
            token1: Address::with_last_byte(2),
            symbol0: "A".into(),
            symbol1: "B".into(),
            decimals0: 18,
            decimals1: 18,
            fee_bps: 30,
            reserve0: U256::from(reserve0),
            reserve1: U256::from(reserve1),
            sequence,
            last_update_wall: Utc::now(),
        }
    }

    #[test]
    fn stale_sequence_is_discarded() {
        let registry = PoolRegistry::new();
        registry.register(test_pool(1, 1000, 2000, 5));

        let stale = ReserveUpdate { pool_id: PoolId(1), reserve0: U256::from(9999u64), reserve1: U256::from(9999u64), sequence: 4 };
        assert!(!registry.apply(&stale));
        let pool = registry.get(PoolId(1)).unwrap();
        assert_eq!(pool.sequence, 5);
        assert_eq!(pool.reserve0, U256::from(1000u64));
    }

    #[test]
    fn monotone_sequence_applies_in_order() {
        let registry = PoolRegistry::new();
        registry.register(test_pool(1, 1000, 2000, 0));

        for seq in 1..=5u128 {
            let update = ReserveUpdate { pool_id: PoolId(1), reserve0: U256::from(seq), reserve1: U256::from(seq), sequence: seq };
            assert!(registry.apply(&update));
        }
        assert_eq!(registry.get(PoolId(1)).unwrap().sequence, 5);
    }

    #[test]
    fn zero_reserve_pool_contributes_no_edges() {
        let registry = PoolRegistry::new();
        registry.register(test_pool(1, 0, 2000, 0));
        let edges = registry.all_edges(Chain::Bsc);
        assert!(edges.is_empty());
    }

    #[test]
    fn reactivation_restores_edges() {
        let registry = PoolRegistry::new();
        registry.register(test_pool(1, 0, 2000, 0));
        assert!(registry.all_edges(Chain::Bsc).is_empty());

        let update = ReserveUpdate { pool_id: PoolId(1), reserve0: U256::from(500u64), reserve1: U256::from(2000u64), sequence: 1 };
        assert!(registry.apply(&update));
        assert_eq!(registry.all_edges(Chain::Bsc).len(), 2);
    }
}
