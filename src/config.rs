//! Configuration management
//!
//! Loads the engine's configuration from a validated TOML file. Unknown
//! chain identifiers, dangling token/venue references, and unrecognized
//! keys are all rejected (or, for a handful of non-fatal cases, logged and
//! the affected record omitted) at startup, not discovered at runtime.
//!
//! Author: AI-Generated
//! Created: 2026-01-27
//! Modified: 2026-07-28 — replaced with a TOML/serde config tree over a
//! chain/venue/token/pair/detector model.

use crate::error::{EngineError, Result};
use crate::types::Chain;
use alloy::primitives::Address;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    pub chain: Chain,
    /// Streaming/HTTP endpoints in priority order.
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub native_usd_price: f64,
    #[serde(default = "default_gas_per_hop")]
    pub gas_per_hop: f64,
    #[serde(default)]
    pub gas_price_gwei: f64,
    /// Symbols of anchor tokens (native-wrapped asset, major stablecoins)
    /// to start multi-hop cycle search from.
    pub anchor_symbols: Vec<String>,
}

fn default_gas_per_hop() -> f64 {
    120_000.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VenueConfig {
    pub chain: Chain,
    pub name: String,
    pub factory: Address,
    pub router: Address,
    pub fee_bps: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    pub chain: Chain,
    pub address: Address,
    pub symbol: String,
    /// Best-effort hint; canonical decimals are re-fetched live from the
    /// token contract during discovery (§9 Open Question 1) and override
    /// this value once known.
    #[serde(default)]
    pub decimals_hint: Option<u8>,
    #[serde(default)]
    pub is_stable: bool,
    #[serde(default)]
    pub usd_price: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PairConfig {
    pub chain: Chain,
    pub symbol_a: String,
    pub symbol_b: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectorConfig {
    #[serde(default = "default_min_spread_bps")]
    pub min_spread_bps: u32,
    #[serde(default = "default_max_spread_bps")]
    pub max_spread_bps: u32,
    #[serde(default = "default_max_hops")]
    pub max_hops: u8,
    #[serde(default = "default_top_k")]
    pub top_k_per_pass: usize,
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: i64,
    #[serde(default = "default_pairwise_validity_secs")]
    pub pairwise_validity_secs: i64,
    #[serde(default = "default_multihop_validity_secs")]
    pub multihop_validity_secs: i64,
    /// Fraction of the bottleneck pool's reserve used to size a cycle's
    /// simulated input trade.
    #[serde(default = "default_position_fraction")]
    pub position_fraction: f64,
    #[serde(default = "default_max_position_usd")]
    pub max_position_usd: f64,
}

fn default_min_spread_bps() -> u32 { 5 }
fn default_max_spread_bps() -> u32 { 500 }
fn default_max_hops() -> u8 { 8 }
fn default_top_k() -> usize { 16 }
fn default_dedup_window_secs() -> i64 { 15 }
fn default_pairwise_validity_secs() -> i64 { 30 }
fn default_multihop_validity_secs() -> i64 { 15 }
fn default_position_fraction() -> f64 { 0.01 }
fn default_max_position_usd() -> f64 { 10_000.0 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_spread_bps: default_min_spread_bps(),
            max_spread_bps: default_max_spread_bps(),
            max_hops: default_max_hops(),
            top_k_per_pass: default_top_k(),
            dedup_window_secs: default_dedup_window_secs(),
            pairwise_validity_secs: default_pairwise_validity_secs(),
            multihop_validity_secs: default_multihop_validity_secs(),
            position_fraction: default_position_fraction(),
            max_position_usd: default_max_position_usd(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub chains: Vec<ChainConfig>,
    pub venues: Vec<VenueConfig>,
    pub tokens: Vec<TokenConfig>,
    pub pairs: Vec<PairConfig>,
    #[serde(default)]
    pub detector: DetectorConfig,
}

impl EngineConfig {
    /// Load and validate configuration from a TOML file.
    ///
    /// Dangling venue/token references on a pair are a configuration error
    /// per §7: logged, the pair omitted, loading continues. A `Chain` value
    /// that fails to deserialize is caught earlier by serde against the
    /// closed-set enum, which is the intended "unrecognized chain aborts
    /// startup" behavior — there's no recovery path for a chain identifier
    /// serde cannot even parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| EngineError::Config {
            detail: format!("failed to read {}: {e}", path.as_ref().display()),
        })?;
        let mut config: EngineConfig = toml::from_str(&raw).map_err(|e| EngineError::Config {
            detail: format!("failed to parse config: {e}"),
        })?;
        config.validate_and_prune();
        Ok(config)
    }

    fn validate_and_prune(&mut self) {
        let known_tokens: HashSet<(Chain, String)> = self
            .tokens
            .iter()
            .map(|t| (t.chain, t.symbol.clone()))
            .collect();

        self.pairs.retain(|pair| {
            let has_a = known_tokens.contains(&(pair.chain, pair.symbol_a.clone()));
            let has_b = known_tokens.contains(&(pair.chain, pair.symbol_b.clone()));
            if !has_a || !has_b {
                warn!(
                    chain = %pair.chain,
                    symbol_a = %pair.symbol_a,
                    symbol_b = %pair.symbol_b,
                    "omitting pair: referenced token not configured",
                );
                return false;
            }
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_chain_identifier() {
        let toml_src = r#"
            [[chains]]
            chain = "moonbeam"
            endpoints = ["wss://example"]
            anchor_symbols = ["WETH"]

            venues = []
            tokens = []
            pairs = []
        "#;
        let result: std::result::Result<EngineConfig, _> = toml::from_str(toml_src);
        assert!(result.is_err());
    }

    #[test]
    fn omits_pair_with_dangling_token_reference() {
        let mut config = EngineConfig {
            chains: vec![],
            venues: vec![],
            tokens: vec![TokenConfig {
                chain: Chain::Bsc,
                address: Address::ZERO,
                symbol: "WBNB".into(),
                decimals_hint: Some(18),
                is_stable: false,
                usd_price: None,
            }],
            pairs: vec![PairConfig {
                chain: Chain::Bsc,
                symbol_a: "WBNB".into(),
                symbol_b: "GHOST".into(),
            }],
            detector: DetectorConfig::default(),
        };
        config.validate_and_prune();
        assert!(config.pairs.is_empty());
    }
}
