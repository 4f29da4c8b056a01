//! Pairwise cross-venue spread detection (§4.4.1).
//!
//! Grounded on `arbitrage/detector.rs`'s `check_pair`/`find_best_pools`/
//! `calculate_spread`/`calculate_profit` — generalized here from a
//! hardcoded two-DEX, percent-scaled, USD-hardcoded-price comparison to an
//! N-venue, N-chain, basis-point-scaled scan driven by the pool registry and
//! detector configuration.
//!
//! Author: AI-Generated
//! Created: 2026-07-28

use crate::config::DetectorConfig;
use crate::registry::PoolRegistry;
use crate::types::{ArbitragePath, Chain, ConfidenceLabel, Pool, PathHop};
use alloy::primitives::{Address, U256};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::debug;

/// Scan every active pool pair sharing `(token_a, token_b)` on `chain` and
/// return every opportunity whose spread clears `min_spread_bps` once fees
/// and gas are accounted for (§4.4.1). `usd_price` looks up a token's
/// reference USD price by symbol for liquidity filtering and profit sizing.
pub fn scan_pair(
    registry: &PoolRegistry,
    chain: Chain,
    token_a: Address,
    token_b: Address,
    config: &DetectorConfig,
    gas_cost_native: f64,
    native_usd_price: f64,
    usd_price: &dyn Fn(&str) -> Option<f64>,
) -> Vec<ArbitragePath> {
    let pools = registry.pools_by_pair(chain, token_a, token_b);
    if pools.len() < 2 {
        return Vec::new();
    }

    let mut out = Vec::new();
    for i in 0..pools.len() {
        for j in (i + 1)..pools.len() {
            let a = &pools[i];
            let b = &pools[j];
            if a.venue == b.venue {
                continue;
            }
            if let Some(path) = evaluate_pair(a, b, chain, config, gas_cost_native, native_usd_price, usd_price) {
                out.push(path);
            }
        }
    }
    out
}

/// Compare two pools quoting the same token pair and build an
/// `ArbitragePath` if buying on the cheaper venue and selling on the richer
/// one clears the configured spread and profit thresholds.
fn evaluate_pair(
    a: &Arc<Pool>,
    b: &Arc<Pool>,
    chain: Chain,
    config: &DetectorConfig,
    gas_cost_native: f64,
    native_usd_price: f64,
    usd_price: &dyn Fn(&str) -> Option<f64>,
) -> Option<ArbitragePath> {
    let price_a = a.price()?;
    let price_b = b.price()?;

    // Price of token0 in units of token1 on each venue; buy where token0 is
    // cheap, sell where it's dear.
    let (buy, sell, buy_price, sell_price) = if price_a.price0_f64() < price_b.price0_f64() {
        (a, b, price_a.price0_f64(), price_b.price0_f64())
    } else {
        (b, a, price_b.price0_f64(), price_a.price0_f64())
    };

    if buy_price <= 0.0 {
        return None;
    }
    let spread_bps = (((sell_price - buy_price) / buy_price) * 10_000.0) as i64;
    if spread_bps < config.min_spread_bps as i64 || spread_bps > config.max_spread_bps as i64 {
        debug!(spread_bps, "pairwise spread out of configured band");
        return None;
    }

    let min_liquidity = chain.min_liquidity_usd();
    let liquidity_buy = buy.liquidity_usd(usd_price);
    let liquidity_sell = sell.liquidity_usd(usd_price);
    let min_liquidity_usd = liquidity_buy.min(liquidity_sell);
    if min_liquidity_usd < min_liquidity {
        debug!(min_liquidity_usd, "pairwise candidate below liquidity floor");
        return None;
    }

    let bottleneck = buy.reserve1.min(sell.reserve1);
    let position_in = scale_u256(bottleneck, config.position_fraction);
    if position_in.is_zero() {
        return None;
    }

    // Buy leg spends token1 for token0 on the cheap venue; sell leg spends
    // that token0 for token1 back on the dear venue, matching `hops` below.
    let out_from_buy = swap_out(position_in, buy.reserve1, buy.reserve0, buy.fee_bps);
    let out_from_sell = swap_out(out_from_buy, sell.reserve0, sell.reserve1, sell.fee_bps);
    if out_from_sell <= position_in {
        return None;
    }
    let gross_profit_units = out_from_sell - position_in;

    let position_usd = u256_to_f64(position_in, buy.decimals1) * usd_price(&buy.symbol1).unwrap_or(0.0);
    let gross_profit_usd = u256_to_f64(gross_profit_units, buy.decimals1) * usd_price(&buy.symbol1).unwrap_or(0.0);
    let gas_cost_usd = gas_cost_native * native_usd_price;
    let net_profit_usd = gross_profit_usd - gas_cost_usd;

    let net_profit_bps = if position_usd > 0.0 {
        ((net_profit_usd / position_usd) * 10_000.0) as i64
    } else {
        0
    };
    if net_profit_bps <= 0 {
        debug!(net_profit_bps, "pairwise candidate unprofitable after gas");
        return None;
    }

    let score = super::confidence_score(spread_bps, min_liquidity_usd, 2);
    let label = ConfidenceLabel::from_score(score);
    let now = Utc::now();

    Some(ArbitragePath {
        chain,
        hops: vec![
            PathHop { pool_id: buy.pool_id, venue: buy.venue.clone(), token_in: buy.token1, token_out: buy.token0 },
            PathHop { pool_id: sell.pool_id, venue: sell.venue.clone(), token_in: sell.token0, token_out: sell.token1 },
        ],
        gross_profit_bps: spread_bps,
        estimated_gas_native: gas_cost_native,
        net_profit_bps,
        estimated_profit_usd: net_profit_usd,
        confidence_score: score,
        confidence_label: label,
        detected_at: now,
        valid_until: now + Duration::seconds(config.pairwise_validity_secs),
    })
}

/// Constant-product swap output: `out = reserve_out * in_with_fee / (reserve_in + in_with_fee)`,
/// `in_with_fee = amount_in * (10000 - fee_bps)`.
pub(crate) fn swap_out(amount_in: U256, reserve_in: U256, reserve_out: U256, fee_bps: u32) -> U256 {
    if amount_in.is_zero() || reserve_in.is_zero() {
        return U256::ZERO;
    }
    let in_with_fee = amount_in * U256::from(10_000u32 - fee_bps.min(10_000));
    let numerator = reserve_out * in_with_fee;
    let denominator = reserve_in * U256::from(10_000u32) + in_with_fee;
    if denominator.is_zero() {
        U256::ZERO
    } else {
        numerator / denominator
    }
}

fn scale_u256(value: U256, fraction: f64) -> U256 {
    let bps = (fraction.clamp(0.0, 1.0) * 10_000.0) as u64;
    value * U256::from(bps) / U256::from(10_000u64)
}

fn u256_to_f64(value: U256, decimals: u8) -> f64 {
    let raw: f64 = value.to_string().parse().unwrap_or(0.0);
    raw / 10f64.powi(decimals as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PoolId;
    use chrono::Utc as ChronoUtc;

    fn pool(id: u64, venue: &str, reserve0: u128, reserve1: u128, fee_bps: u32) -> Pool {
        Pool {
            pool_id: PoolId(id),
            chain: Chain::Bsc,
            venue: venue.into(),
            address: Address::ZERO,
            token0: Address::with_last_byte(1),
            token1: Address::with_last_byte(2),
            symbol0: "TOK".into(),
            symbol1: "USDT".into(),
            decimals0: 18,
            decimals1: 18,
            fee_bps,
            reserve0: U256::from(reserve0),
            reserve1: U256::from(reserve1),
            sequence: 0,
            last_update_wall: ChronoUtc::now(),
        }
    }

    fn price_fn(symbol: &str) -> Option<f64> {
        match symbol {
            "USDT" => Some(1.0),
            "TOK" => Some(10.0),
            _ => None,
        }
    }

    #[test]
    fn wider_priced_pool_yields_spread_above_threshold() {
        let registry = PoolRegistry::new();
        registry.register(pool(1, "venue-a", 1_000_000_000_000_000_000_000, 10_000_000_000_000_000_000_000, 30));
        registry.register(pool(2, "venue-b", 1_000_000_000_000_000_000_000, 10_500_000_000_000_000_000_000, 30));

        let config = DetectorConfig::default();
        let paths = scan_pair(
            &registry,
            Chain::Bsc,
            Address::with_last_byte(1),
            Address::with_last_byte(2),
            &config,
            0.001,
            600.0,
            &price_fn,
        );
        assert!(!paths.is_empty());
        assert!(paths[0].net_profit_bps > 0);
        assert_eq!(paths[0].hop_count(), 2);
    }

    #[test]
    fn identical_prices_yield_no_opportunity() {
        let registry = PoolRegistry::new();
        registry.register(pool(1, "venue-a", 1_000_000_000_000_000_000_000, 10_000_000_000_000_000_000_000, 30));
        registry.register(pool(2, "venue-b", 1_000_000_000_000_000_000_000, 10_000_000_000_000_000_000_000, 30));

        let config = DetectorConfig::default();
        let paths = scan_pair(
            &registry,
            Chain::Bsc,
            Address::with_last_byte(1),
            Address::with_last_byte(2),
            &config,
            0.001,
            600.0,
            &price_fn,
        );
        assert!(paths.is_empty());
    }

    #[test]
    fn same_venue_pools_are_never_compared() {
        let registry = PoolRegistry::new();
        registry.register(pool(1, "venue-a", 1_000_000_000_000_000_000_000, 10_000_000_000_000_000_000_000, 30));
        registry.register(pool(2, "venue-a", 1_000_000_000_000_000_000_000, 12_000_000_000_000_000_000_000, 30));

        let config = DetectorConfig::default();
        let paths = scan_pair(
            &registry,
            Chain::Bsc,
            Address::with_last_byte(1),
            Address::with_last_byte(2),
            &config,
            0.001,
            600.0,
            &price_fn,
        );
        assert!(paths.is_empty());
    }
}
