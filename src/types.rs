//! Core data model: chains, venues, tokens, pools, prices, edges and the
//! detector's output unit.
//!
//! Author: AI-Generated
//! Created: 2026-01-27
//! Modified: 2026-07-28 — generalized from a single-chain/hardcoded-DEX-enum
//! model to a closed-set multi-chain model; V3/Algebra fields dropped
//! (constant-product AMMs only).

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of supported chains. Unknown identifiers are rejected by the
/// config loader at startup rather than accepted as free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Bsc,
    Ethereum,
    Arbitrum,
    Base,
}

impl Chain {
    /// Minimum pool liquidity (USD) below which a pool is ignored for
    /// arbitrage purposes on this chain.
    pub fn min_liquidity_usd(&self) -> f64 {
        match self {
            Chain::Bsc => 50_000.0,
            Chain::Ethereum => 100_000.0,
            Chain::Arbitrum | Chain::Base => 25_000.0,
        }
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Bsc => "BNB",
            Chain::Ethereum => "ETH",
            Chain::Arbitrum => "ETH",
            Chain::Base => "ETH",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Chain::Bsc => "bsc",
            Chain::Ethereum => "ethereum",
            Chain::Arbitrum => "arbitrum",
            Chain::Base => "base",
        };
        write!(f, "{s}")
    }
}

/// A DEX instance on a chain, identified by its factory/router pair.
/// Immutable for the engine's lifetime once loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    pub chain: Chain,
    pub name: String,
    pub factory: Address,
    pub router: Address,
    /// Swap fee in basis points (10_000 = 100%).
    pub fee_bps: u32,
}

/// Per-chain token record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub chain: Chain,
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub is_stable: bool,
    /// Reference USD price used for liquidity sizing, if known.
    #[serde(default)]
    pub usd_price: Option<f64>,
}

/// Stable, opaque identifier for a pool: derived from (chain, venue, address)
/// at discovery time and never reused once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolId(pub u64);

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool#{}", self.0)
    }
}

/// The core entity: a constant-product pool's authoritative snapshot.
///
/// Invariants (enforced by `crate::registry::PoolRegistry`, not by this
/// struct alone):
/// - `token0`/`token1` order matches the on-chain order reported once at
///   registration and never changes.
/// - Either reserve being zero marks the pool inactive.
/// - `sequence` never decreases across successive `apply` calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub pool_id: PoolId,
    pub chain: Chain,
    pub venue: String,
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub symbol0: String,
    pub symbol1: String,
    pub decimals0: u8,
    pub decimals1: u8,
    pub fee_bps: u32,
    pub reserve0: U256,
    pub reserve1: U256,
    /// Monotonic per-pool ordinal derived from (block_number, log_index).
    pub sequence: u128,
    pub last_update_wall: DateTime<Utc>,
}

impl Pool {
    /// A pool with either reserve at zero contributes neither prices nor
    /// edges until a subsequent non-zero update (§3 invariant).
    pub fn is_active(&self) -> bool {
        !self.reserve0.is_zero() && !self.reserve1.is_zero()
    }

    /// `price0 = reserve1 * 10^decimals0 / (reserve0 * 10^decimals1)`,
    /// the price of token0 in units of token1, decimal-adjusted.
    ///
    /// Returns `None` when the pool is inactive. Uses integer-scaled
    /// arithmetic (`PRICE_SCALE`) rather than floating point so the result
    /// is exact enough to satisfy the price round-trip invariant
    /// (`price0 * price1 == 1`).
    pub fn price(&self) -> Option<Price> {
        if !self.is_active() {
            return None;
        }
        Some(Price::from_reserves(
            self.reserve0,
            self.reserve1,
            self.decimals0,
            self.decimals1,
        ))
    }

    /// USD liquidity estimate for this pool, given a lookup from symbol to
    /// reference USD price. Falls back to doubling the known stable side,
    /// else zero, per §4.3.
    pub fn liquidity_usd(&self, usd_price: impl Fn(&str) -> Option<f64>) -> f64 {
        let side0 = usd_price(&self.symbol0).map(|p| reserve_to_decimal(self.reserve0, self.decimals0) * p);
        let side1 = usd_price(&self.symbol1).map(|p| reserve_to_decimal(self.reserve1, self.decimals1) * p);

        match (side0, side1) {
            (Some(a), Some(b)) => a + b,
            (Some(a), None) => a * 2.0,
            (None, Some(b)) => b * 2.0,
            (None, None) => 0.0,
        }
    }
}

fn reserve_to_decimal(reserve: U256, decimals: u8) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    reserve_to_f64(reserve) / scale
}

fn reserve_to_f64(value: U256) -> f64 {
    // U256 -> f64 via string round trip keeps this correct for values well
    // beyond u128, at the cost of being a non-hot-path conversion; only used
    // for USD-facing heuristics, never for profitability decisions (§9).
    value.to_string().parse().unwrap_or(0.0)
}

/// Fixed-point decimal scale used for `Price`: 18 fractional digits.
pub const PRICE_SCALE: u128 = 1_000_000_000_000_000_000;

/// A pool's mid-price in both directions, integer-scaled to `PRICE_SCALE`
/// fractional digits. Never persisted; always recomputed from reserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Price {
    /// price0 * PRICE_SCALE, i.e. price of token0 in units of token1.
    pub price0_scaled: u128,
    /// price1 * PRICE_SCALE, i.e. price of token1 in units of token0.
    pub price1_scaled: u128,
}

impl Price {
    pub fn from_reserves(reserve0: U256, reserve1: U256, decimals0: u8, decimals1: u8) -> Self {
        let r0 = u256_to_u128_saturating(reserve0);
        let r1 = u256_to_u128_saturating(reserve1);

        let price0_scaled = scale_ratio(r1, r0, decimals0, decimals1);
        let price1_scaled = scale_ratio(r0, r1, decimals1, decimals0);

        Price { price0_scaled, price1_scaled }
    }

    pub fn price0_f64(&self) -> f64 {
        self.price0_scaled as f64 / PRICE_SCALE as f64
    }

    pub fn price1_f64(&self) -> f64 {
        self.price1_scaled as f64 / PRICE_SCALE as f64
    }
}

/// `numerator * 10^dec_num * PRICE_SCALE / (denominator * 10^dec_den)`,
/// computed with 256-bit intermediates to avoid overflow ahead of the final
/// downcast, per §9's "at least 128-bit intermediates" guidance.
fn scale_ratio(numerator: u128, denominator: u128, dec_num_adj: u8, dec_den_adj: u8) -> u128 {
    if denominator == 0 {
        return 0;
    }
    let num = U256::from(numerator) * pow10(dec_num_adj) * U256::from(PRICE_SCALE);
    let den = U256::from(denominator) * pow10(dec_den_adj);
    let result = num / den;
    u256_to_u128_saturating(result)
}

fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

fn u256_to_u128_saturating(value: U256) -> u128 {
    value.try_into().unwrap_or(u128::MAX)
}

/// A directed edge in the token multigraph, derived from one side of a pool.
#[derive(Debug, Clone)]
pub struct Edge {
    pub pool_id: PoolId,
    pub venue: String,
    pub token_in: Address,
    pub token_out: Address,
    pub symbol_in: String,
    pub reserve_in: U256,
    pub reserve_out: U256,
    pub fee_bps: u32,
    /// `(1 - fee_bps/10000) * reserve_out / reserve_in`, as f64 — used only
    /// for Bellman-Ford relaxation weight (`-ln(rate)`), never for the final
    /// profit calculation, which re-simulates with discrete integer reserves.
    pub rate_out_per_in: f64,
}

impl Edge {
    pub fn rate_after_fee(reserve_in: U256, reserve_out: U256, fee_bps: u32) -> f64 {
        let r_in = reserve_to_f64(reserve_in);
        let r_out = reserve_to_f64(reserve_out);
        if r_in <= 0.0 {
            return 0.0;
        }
        let fee_mult = (10_000 - fee_bps.min(10_000)) as f64 / 10_000.0;
        fee_mult * r_out / r_in
    }
}

/// Categorical confidence label surfaced to downstream filters; the
/// continuous score (§4.4.3) is retained on `ArbitragePath` for ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLabel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLabel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.85 {
            ConfidenceLabel::VeryHigh
        } else if score >= 0.65 {
            ConfidenceLabel::High
        } else if score >= 0.4 {
            ConfidenceLabel::Medium
        } else {
            ConfidenceLabel::Low
        }
    }
}

/// One hop of a detected arbitrage path: crossing a single pool.
#[derive(Debug, Clone)]
pub struct PathHop {
    pub pool_id: PoolId,
    pub venue: String,
    pub token_in: Address,
    pub token_out: Address,
}

/// The detector's output unit: a cycle of 2..=8 hops starting and ending at
/// the same token, with its profitability and confidence already computed.
#[derive(Debug, Clone)]
pub struct ArbitragePath {
    pub chain: Chain,
    pub hops: Vec<PathHop>,
    pub gross_profit_bps: i64,
    pub estimated_gas_native: f64,
    pub net_profit_bps: i64,
    pub estimated_profit_usd: f64,
    pub confidence_score: f64,
    pub confidence_label: ConfidenceLabel,
    pub detected_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

impl ArbitragePath {
    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// Canonical cycle identity: the cyclic rotation of the pool-id sequence
    /// with the lexicographically smallest ordering, used by C5 to
    /// deduplicate cycles that differ only by starting point (§4.4.2, §9
    /// Open Question 3 — this same id subsumes the pairwise 2-hop case).
    pub fn canonical_cycle_id(&self) -> String {
        let ids: Vec<u64> = self.hops.iter().map(|h| h.pool_id.0).collect();
        if ids.is_empty() {
            return String::new();
        }
        let n = ids.len();
        let best = (0..n)
            .map(|start| {
                (0..n)
                    .map(|i| ids[(start + i) % n])
                    .collect::<Vec<_>>()
            })
            .min()
            .expect("non-empty rotation set");
        best.iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_round_trip_is_exact_reciprocal_under_integer_scaling() {
        let price = Price::from_reserves(U256::from(1_000_000u64), U256::from(2_000_000u64), 18, 18);
        let product = (price.price0_scaled as u128) * (price.price1_scaled as u128) / (PRICE_SCALE * PRICE_SCALE / PRICE_SCALE);
        // price0 * price1 should equal 1 scaled by PRICE_SCALE (within integer rounding).
        let expected = PRICE_SCALE;
        let diff = if product > expected { product - expected } else { expected - product };
        assert!(diff < 10, "round trip drifted by {diff}");
    }

    #[test]
    fn zero_reserve_pool_is_inactive() {
        let pool = make_pool(U256::ZERO, U256::from(1000u64));
        assert!(!pool.is_active());
        assert!(pool.price().is_none());
    }

    #[test]
    fn canonical_cycle_id_is_rotation_invariant() {
        let hops_a = vec![hop(1), hop(2), hop(3)];
        let hops_b = vec![hop(2), hop(3), hop(1)];
        let path_a = make_path(hops_a);
        let path_b = make_path(hops_b);
        assert_eq!(path_a.canonical_cycle_id(), path_b.canonical_cycle_id());
    }

    fn hop(id: u64) -> PathHop {
        PathHop {
            pool_id: PoolId(id),
            venue: "v".into(),
            token_in: Address::ZERO,
            token_out: Address::ZERO,
        }
    }

    fn make_path(hops: Vec<PathHop>) -> ArbitragePath {
        ArbitragePath {
            chain: Chain::Bsc,
            hops,
            gross_profit_bps: 0,
            estimated_gas_native: 0.0,
            net_profit_bps: 0,
            estimated_profit_usd: 0.0,
            confidence_score: 0.0,
            confidence_label: ConfidenceLabel::Low,
            detected_at: Utc::now(),
            valid_until: Utc::now(),
        }
    }

    fn make_pool(reserve0: U256, reserve1: U256) -> Pool {
        Pool {
            pool_id: PoolId(1),
            chain: Chain::Bsc,
            venue: "test".into(),
            address: Address::ZERO,
            token0: Address::ZERO,
            token1: Address::ZERO,
            symbol0: "A".into(),
            symbol1: "B".into(),
            decimals0: 18,
            decimals1: 18,
            fee_bps: 30,
            reserve0,
            reserve1,
            sequence: 0,
            last_update_wall: Utc::now(),
        }
    }
}
