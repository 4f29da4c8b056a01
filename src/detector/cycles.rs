//! Bounded multi-hop arbitrage cycle detection (§4.4.2).
//!
//! Grounded on the `other_examples` saros-sdk-docs multi-hop routing
//! example's `find_cycles_from_node`/`deduplicate_cycles`/
//! `analyze_cycle_profitability` shape — its DFS bounded-length cycle search
//! is replaced here with a modified Bellman-Ford relaxation over
//! `-ln(rate_after_fee)` edge weights (a negative cycle is a profitable
//! loop), but the downstream re-simulation-with-discrete-reserves,
//! liquidity-floor rejection and canonical-rotation dedup follow the same
//! structure that example uses.
//!
//! Author: AI-Generated
//! Created: 2026-07-28

use crate::config::DetectorConfig;
use crate::detector::pairwise::swap_out;
use crate::registry::PoolRegistry;
use crate::types::{ArbitragePath, Chain, ConfidenceLabel, Edge, PathHop};
use alloy::primitives::{Address, U256};
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};

/// Run one bounded Bellman-Ford pass per configured anchor token and return
/// every profitable cycle found, deduplicated by canonical rotation and
/// truncated to `top_k_per_pass` by net profit (§4.4.2).
pub fn detect_cycles(
    registry: &PoolRegistry,
    chain: Chain,
    anchor_tokens: &[Address],
    config: &DetectorConfig,
    gas_cost_native: f64,
    native_usd_price: f64,
    usd_price: &dyn Fn(&str) -> Option<f64>,
) -> Vec<ArbitragePath> {
    let edges = registry.all_edges(chain);
    if edges.len() < 2 {
        return Vec::new();
    }

    let mut by_token: HashMap<Address, Vec<Edge>> = HashMap::new();
    let mut nodes: HashSet<Address> = HashSet::new();
    for edge in &edges {
        nodes.insert(edge.token_in);
        nodes.insert(edge.token_out);
        by_token.entry(edge.token_in).or_default().push(edge.clone());
    }

    let mut seen_cycles: HashSet<String> = HashSet::new();
    let mut found: Vec<ArbitragePath> = Vec::new();

    for &anchor in anchor_tokens {
        if !nodes.contains(&anchor) {
            continue;
        }
        if let Some(cycle_edges) = bellman_ford_negative_cycle(&nodes, &by_token, anchor, config.max_hops as usize) {
            if let Some(path) = evaluate_cycle(
                &cycle_edges,
                chain,
                config,
                gas_cost_native,
                native_usd_price,
                usd_price,
            ) {
                let id = path.canonical_cycle_id();
                if seen_cycles.insert(id) {
                    found.push(path);
                }
            }
        }
    }

    found.sort_by(|a, b| b.net_profit_bps.cmp(&a.net_profit_bps));
    found.truncate(config.top_k_per_pass);
    found
}

/// Bellman-Ford relaxation from `source` over edge weight `-ln(rate)`.
/// A negative cycle (sum of weights < 0, i.e. product of rates > 1) is a
/// profitable loop. Returns the edges of the first such cycle reachable
/// within `max_hops`, or `None` if the graph relaxed to a fixed point.
fn bellman_ford_negative_cycle(
    nodes: &HashSet<Address>,
    by_token: &HashMap<Address, Vec<Edge>>,
    source: Address,
    max_hops: usize,
) -> Option<Vec<Edge>> {
    let mut dist: HashMap<Address, f64> = nodes.iter().map(|&n| (n, f64::INFINITY)).collect();
    let mut pred: HashMap<Address, Edge> = HashMap::new();
    dist.insert(source, 0.0);

    let relax_rounds = nodes.len().saturating_sub(1).min(max_hops);
    let mut last_relaxed: Option<Address> = None;

    for _ in 0..relax_rounds {
        last_relaxed = None;
        for (&from, edges) in by_token {
            let d_from = *dist.get(&from).unwrap_or(&f64::INFINITY);
            if !d_from.is_finite() {
                continue;
            }
            for edge in edges {
                if edge.rate_out_per_in <= 0.0 {
                    continue;
                }
                let weight = -edge.rate_out_per_in.ln();
                let candidate = d_from + weight;
                let d_to = *dist.get(&edge.token_out).unwrap_or(&f64::INFINITY);
                if candidate < d_to - 1e-12 {
                    dist.insert(edge.token_out, candidate);
                    pred.insert(edge.token_out, edge.clone());
                    last_relaxed = Some(edge.token_out);
                }
            }
        }
    }

    // One extra relaxation pass: any edge that still relaxes sits on (or
    // reaches) a negative cycle.
    let mut cycle_node = None;
    for (&from, edges) in by_token {
        let d_from = *dist.get(&from).unwrap_or(&f64::INFINITY);
        if !d_from.is_finite() {
            continue;
        }
        for edge in edges {
            if edge.rate_out_per_in <= 0.0 {
                continue;
            }
            let weight = -edge.rate_out_per_in.ln();
            let candidate = d_from + weight;
            let d_to = *dist.get(&edge.token_out).unwrap_or(&f64::INFINITY);
            if candidate < d_to - 1e-12 {
                cycle_node = Some(edge.token_out);
                break;
            }
        }
        if cycle_node.is_some() {
            break;
        }
    }
    let cycle_node = cycle_node.or(last_relaxed)?;

    // Walk predecessors max_hops steps to guarantee landing inside the cycle.
    let mut walker = cycle_node;
    for _ in 0..nodes.len().min(max_hops) {
        walker = pred.get(&walker)?.token_in;
    }

    let start = walker;
    let mut edges_out = Vec::new();
    let mut current = start;
    let mut visited_in_walk = HashSet::new();
    loop {
        let edge = pred.get(&current)?.clone();
        let prev = edge.token_in;
        edges_out.push(edge);
        if !visited_in_walk.insert(current) {
            break;
        }
        current = prev;
        if current == start {
            break;
        }
        if edges_out.len() > max_hops {
            return None;
        }
    }
    edges_out.reverse();
    if edges_out.len() < 2 {
        return None;
    }
    Some(edges_out)
}

/// Re-simulate the cycle with discrete integer reserves, rejecting it unless
/// every hop's liquidity clears the chain floor and the net profit (after
/// gas) is positive.
fn evaluate_cycle(
    edges: &[Edge],
    chain: Chain,
    config: &DetectorConfig,
    gas_cost_native: f64,
    native_usd_price: f64,
    usd_price: &dyn Fn(&str) -> Option<f64>,
) -> Option<ArbitragePath> {
    let min_liquidity = chain.min_liquidity_usd();
    let bottleneck_reserve = edges.iter().map(|e| e.reserve_in).min()?;
    let position_in = scale_u256(bottleneck_reserve, config.position_fraction);
    if position_in.is_zero() {
        return None;
    }

    let mut amount = position_in;
    for edge in edges {
        amount = swap_out(amount, edge.reserve_in, edge.reserve_out, edge.fee_bps);
        if amount.is_zero() {
            return None;
        }
    }
    if amount <= position_in {
        return None;
    }

    let gross_units = amount - position_in;
    let gross_bps = ratio_to_bps(gross_units, position_in);
    if gross_bps < config.min_spread_bps as i64 || gross_bps > config.max_spread_bps as i64 {
        return None;
    }

    let mut min_liquidity_usd = f64::INFINITY;
    for edge in edges {
        let reserve_usd = u256_to_f64_scaled(edge.reserve_in) * usd_price(edge.symbol_in.as_str()).unwrap_or(0.0);
        min_liquidity_usd = min_liquidity_usd.min(reserve_usd);
    }
    if !min_liquidity_usd.is_finite() || min_liquidity_usd < min_liquidity {
        return None;
    }

    let unit_price = usd_price(edges[0].symbol_in.as_str()).unwrap_or(0.0);
    let position_usd = u256_to_f64_scaled(position_in) * unit_price;
    let gross_profit_usd = u256_to_f64_scaled(gross_units) * unit_price;
    let gas_cost_usd = gas_cost_native * native_usd_price * edges.len() as f64;
    let net_profit_usd = gross_profit_usd - gas_cost_usd;
    let net_profit_bps = if position_usd > 0.0 {
        ((net_profit_usd / position_usd) * 10_000.0) as i64
    } else {
        0
    };
    if net_profit_bps <= 0 {
        return None;
    }

    let hops: Vec<PathHop> = edges
        .iter()
        .map(|e| PathHop {
            pool_id: e.pool_id,
            venue: e.venue.clone(),
            token_in: e.token_in,
            token_out: e.token_out,
        })
        .collect();

    let score = super::confidence_score(gross_bps, min_liquidity_usd, hops.len());
    let label = ConfidenceLabel::from_score(score);
    let now = Utc::now();

    Some(ArbitragePath {
        chain,
        hops,
        gross_profit_bps: gross_bps,
        estimated_gas_native: gas_cost_native * edges.len() as f64,
        net_profit_bps,
        estimated_profit_usd: net_profit_usd,
        confidence_score: score,
        confidence_label: label,
        detected_at: now,
        valid_until: now + Duration::seconds(config.multihop_validity_secs),
    })
}

fn scale_u256(value: U256, fraction: f64) -> U256 {
    let bps = (fraction.clamp(0.0, 1.0) * 10_000.0) as u64;
    value * U256::from(bps) / U256::from(10_000u64)
}

fn ratio_to_bps(numerator: U256, denominator: U256) -> i64 {
    if denominator.is_zero() {
        return 0;
    }
    let scaled = numerator * U256::from(10_000u64) / denominator;
    let as_u128: u128 = scaled.try_into().unwrap_or(u128::MAX);
    as_u128.min(i64::MAX as u128) as i64
}

fn u256_to_f64_scaled(value: U256) -> f64 {
    value.to_string().parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Pool, PoolId};
    use chrono::Utc as ChronoUtc;

    fn addr(n: u8) -> Address {
        Address::with_last_byte(n)
    }

    fn triangular_pool(id: u64, venue: &str, token0: Address, token1: Address, reserve0: u128, reserve1: u128) -> Pool {
        Pool {
            pool_id: PoolId(id),
            chain: Chain::Bsc,
            venue: venue.into(),
            address: Address::ZERO,
            token0,
            token1,
            symbol0: "A".into(),
            symbol1: "B".into(),
            decimals0: 18,
            decimals1: 18,
            fee_bps: 30,
            reserve0: U256::from(reserve0),
            reserve1: U256::from(reserve1),
            sequence: 0,
            last_update_wall: ChronoUtc::now(),
        }
    }

    #[test]
    fn no_cycle_found_when_graph_has_no_profitable_loop() {
        let registry = PoolRegistry::new();
        let a = addr(1);
        let b = addr(2);
        let c = addr(3);
        // Balanced triangle: every rate after fee is slightly below 1, no
        // negative cycle should exist.
        registry.register(triangular_pool(1, "v1", a, b, 1_000_000_000_000_000_000_000, 1_000_000_000_000_000_000_000));
        registry.register(triangular_pool(2, "v1", b, c, 1_000_000_000_000_000_000_000, 1_000_000_000_000_000_000_000));
        registry.register(triangular_pool(3, "v1", c, a, 1_000_000_000_000_000_000_000, 1_000_000_000_000_000_000_000));

        let config = DetectorConfig::default();
        let paths = detect_cycles(&registry, Chain::Bsc, &[a], &config, 0.0005, 600.0, &|_| Some(1.0));
        assert!(paths.is_empty());
    }

    #[test]
    fn mispriced_triangle_yields_a_cycle() {
        let registry = PoolRegistry::new();
        let a = addr(1);
        let b = addr(2);
        let c = addr(3);
        registry.register(triangular_pool(1, "v1", a, b, 1_000_000_000_000_000_000_000, 1_000_000_000_000_000_000_000));
        registry.register(triangular_pool(2, "v1", b, c, 1_000_000_000_000_000_000_000, 1_000_000_000_000_000_000_000));
        // Mispriced leg: 1 C buys 1.2 A back, creating a profitable loop.
        registry.register(triangular_pool(3, "v1", c, a, 1_000_000_000_000_000_000_000, 1_200_000_000_000_000_000_000));

        let config = DetectorConfig { min_spread_bps: 1, ..DetectorConfig::default() };
        let paths = detect_cycles(&registry, Chain::Bsc, &[a, b, c], &config, 0.0005, 600.0, &|_| Some(1.0));
        assert!(!paths.is_empty());
        assert!(paths[0].hop_count() >= 2);
    }
}
